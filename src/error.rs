//! Crate-level error
//!
//! Every failure the binaries can hit. None of them is retried.

use crate::inference::EngineError;
use crate::storage::StorageError;
use std::process::ExitCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Log a failed run once and turn the outcome into the process exit status
pub fn exit_status(result: Result<(), AppError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_model_message_is_readable() {
        let err = AppError::from(EngineError::ModelNotFound(PathBuf::from(
            "models/gemma.gguf",
        )));
        assert_eq!(err.to_string(), "Model file not found: models/gemma.gguf");
    }

    #[test]
    fn test_failure_maps_to_failure_status() {
        let failed = exit_status(Err(AppError::from(EngineError::NotInitialized)));
        assert_eq!(format!("{failed:?}"), format!("{:?}", ExitCode::FAILURE));

        let succeeded = exit_status(Ok(()));
        assert_eq!(format!("{succeeded:?}"), format!("{:?}", ExitCode::SUCCESS));
    }
}
