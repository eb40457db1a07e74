//! GGUF model file checks
//!
//! Reads just enough of a GGUF header to reject files llama.cpp would fail on
//! with a less helpful message.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Magic bytes at the start of every GGUF file
pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";

const SUPPORTED_VERSIONS: [u32; 3] = [1, 2, 3];

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a GGUF file (magic {0:02x?})")]
    BadMagic([u8; 4]),

    #[error("Unsupported GGUF version {0}")]
    UnsupportedVersion(u32),

    #[error("GGUF header is truncated")]
    Truncated,
}

/// Header fields of a GGUF file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GgufMetadata {
    pub version: u32,
    pub tensor_count: u64,
    pub metadata_kv_count: u64,
}

/// Validate the GGUF header of the file at `path`
pub fn validate_gguf(path: &Path) -> Result<GgufMetadata, ModelError> {
    let mut file = File::open(path)?;
    // magic + version + two u64 counts
    let mut header = Vec::with_capacity(24);
    file.by_ref().take(24).read_to_end(&mut header)?;
    parse_header(&header)
}

fn parse_header(bytes: &[u8]) -> Result<GgufMetadata, ModelError> {
    let magic: [u8; 4] = bytes
        .get(0..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(ModelError::Truncated)?;
    if magic != GGUF_MAGIC {
        return Err(ModelError::BadMagic(magic));
    }

    let version = read_u32(bytes, 4)?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(ModelError::UnsupportedVersion(version));
    }

    // Version 1 stored the counts as u32
    let (tensor_count, metadata_kv_count) = if version == 1 {
        (read_u32(bytes, 8)? as u64, read_u32(bytes, 12)? as u64)
    } else {
        (read_u64(bytes, 8)?, read_u64(bytes, 16)?)
    };

    Ok(GgufMetadata {
        version,
        tensor_count,
        metadata_kv_count,
    })
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, ModelError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(ModelError::Truncated)
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64, ModelError> {
    bytes
        .get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or(ModelError::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(version: u32, tensors: u64, kvs: u64) -> Vec<u8> {
        let mut bytes = GGUF_MAGIC.to_vec();
        bytes.extend_from_slice(&version.to_le_bytes());
        bytes.extend_from_slice(&tensors.to_le_bytes());
        bytes.extend_from_slice(&kvs.to_le_bytes());
        bytes
    }

    #[test]
    fn test_parse_v3_header() {
        let meta = parse_header(&header(3, 508, 42)).unwrap();
        assert_eq!(
            meta,
            GgufMetadata {
                version: 3,
                tensor_count: 508,
                metadata_kv_count: 42
            }
        );
    }

    #[test]
    fn test_parse_v1_header_uses_u32_counts() {
        let mut bytes = GGUF_MAGIC.to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());

        let meta = parse_header(&bytes).unwrap();
        assert_eq!(meta.tensor_count, 7);
        assert_eq!(meta.metadata_kv_count, 3);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = header(3, 1, 1);
        bytes[..4].copy_from_slice(b"GGML");
        assert!(matches!(parse_header(&bytes), Err(ModelError::BadMagic(m)) if &m == b"GGML"));
    }

    #[test]
    fn test_unsupported_version() {
        assert!(matches!(
            parse_header(&header(9, 1, 1)),
            Err(ModelError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(parse_header(b"GG"), Err(ModelError::Truncated)));
        let bytes = header(3, 1, 1);
        assert!(matches!(parse_header(&bytes[..12]), Err(ModelError::Truncated)));
    }

    #[test]
    fn test_validate_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.gguf");
        let mut bytes = header(2, 3, 5);
        bytes.extend_from_slice(&[0u8; 64]);
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(validate_gguf(&path).unwrap().metadata_kv_count, 5);
    }

    #[test]
    fn test_validate_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_gguf(&dir.path().join("missing.gguf")),
            Err(ModelError::Io(_))
        ));
    }
}
