//! Error handling for the plux node framework
//!
//! One error type covers configuration, device, network and queue failures
//! so that every node can propagate with `?` up to the runner.

use thiserror::Error;

/// Result type alias for node operations
pub type PluxResult<T> = Result<T, PluxError>;

/// Error type for all node operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PluxError {
    /// Node settings failed validation
    #[error("Invalid node configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error
        reason: String,
    },

    /// Channel count outside what the hardware supports
    #[error("Invalid channel count: {count}, supported range 1-{max}")]
    InvalidChannelCount {
        /// Requested channel count
        count: usize,
        /// Maximum supported channels
        max: usize,
    },

    /// Sampling frequency not supported for the requested channels
    #[error("Invalid sampling rate: {rate}Hz, valid range: {valid_range}")]
    InvalidSamplingRate {
        /// Requested frequency
        rate: u32,
        /// Valid range description
        valid_range: String,
    },

    /// Failure reported by the device SDK
    #[error("Device error ({address}): {reason}")]
    Device {
        /// Device address the session was opened with
        address: String,
        /// Device-related error description
        reason: String,
    },

    /// Buffered frames could not be stacked into a batch
    #[error("Batch shape error: {reason}")]
    Shape {
        /// Description of the mismatch
        reason: String,
    },

    /// No entry point registered under this name
    #[error("Unknown node '{name}'")]
    UnknownNode {
        /// Requested entry-point name
        name: String,
    },

    /// Socket level failure
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// OSC packet could not be decoded
    #[error("OSC decode error: {reason}")]
    Osc {
        /// Decoder message
        reason: String,
    },

    /// Settings (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The blocking node thread panicked or was cancelled
    #[error("Node task failed: {reason}")]
    Task {
        /// Join error description
        reason: String,
    },
}

impl PluxError {
    /// Shorthand for device errors
    pub fn device(address: impl Into<String>, reason: impl Into<String>) -> Self {
        PluxError::Device {
            address: address.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::PluxError::InvalidConfig {
            reason: format!($($arg)*),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PluxError::InvalidChannelCount { count: 12, max: 8 };
        let display = format!("{}", error);
        assert!(display.contains("Invalid channel count"));
        assert!(display.contains("12"));
        assert!(display.contains("8"));
    }

    #[test]
    fn test_config_error_macro() {
        let error = config_error!("emit_at_once must be at least {}", 1);
        match error {
            PluxError::InvalidConfig { reason } => {
                assert_eq!(reason, "emit_at_once must be at least 1")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_device_error_shorthand() {
        let error = PluxError::device("00:07:80:4D:2E:76", "port does not exist");
        assert_eq!(
            error.to_string(),
            "Device error (00:07:80:4D:2E:76): port does not exist"
        );
    }
}
