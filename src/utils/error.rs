//! Error Handling Module
//!
//! Defines the error type shared by the architecture engine, the Burn model
//! and the CLI. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for Tiramisu operations
#[derive(Error, Debug)]
pub enum TiramisuError {
    /// Architecture configuration is structurally invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input resolution cannot be halved by every transition down
    #[error("Input {dimension} of {size} is not divisible by {factor} ({pools} max-pool stages)")]
    Resolution {
        dimension: &'static str,
        size: usize,
        factor: usize,
        pools: usize,
    },

    /// An upsampled feature map does not line up with its skip connection
    #[error(
        "Skip connection mismatch at up block {block}: upsampled {upsampled_height}x{upsampled_width}, skip {skip_height}x{skip_width}"
    )]
    SkipShapeMismatch {
        block: usize,
        upsampled_height: usize,
        upsampled_width: usize,
        skip_height: usize,
        skip_width: usize,
    },

    /// Error persisting or restoring model weights
    #[error("Recorder error: {0}")]
    Recorder(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for TiramisuError {
    fn from(err: serde_json::Error) -> Self {
        TiramisuError::Serialization(err.to_string())
    }
}

/// Convenience Result type for Tiramisu operations
pub type Result<T> = std::result::Result<T, TiramisuError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| TiramisuError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TiramisuError::Config("growth_rate must be greater than 0".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: growth_rate must be greater than 0"
        );
    }

    #[test]
    fn test_resolution_error_mentions_factor() {
        let err = TiramisuError::Resolution {
            dimension: "height",
            size: 100,
            factor: 32,
            pools: 5,
        };
        let message = format!("{}", err);
        assert!(message.contains("height of 100"));
        assert!(message.contains("divisible by 32"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let parsed: std::result::Result<u32, serde_json::Error> = serde_json::from_str("not json");
        let err: TiramisuError = parsed.unwrap_err().into();
        assert!(matches!(err, TiramisuError::Serialization(_)));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        match result.with_context(|| "Failed to read config.json".to_string()) {
            Err(TiramisuError::InvalidInput(message)) => {
                assert_eq!(message, "Failed to read config.json: file not found");
            }
            other => panic!("expected invalid input, got {:?}", other),
        }
    }
}
