//! Shared type definitions
//!
//! Data types passed between the engine, the session and the script.

pub mod config;
pub mod message;
