use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// PM QOS error types covering device access, configuration, and guard misuse.
#[derive(Debug, Error)]
pub enum QosError {
    /// The latency-control device could not be opened.
    ///
    /// Usually means the process lacks privileges or the kernel does not
    /// expose the device.
    #[error("failed to open PM QOS file {}", path.display())]
    DeviceUnavailable {
        /// Device path that was opened.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The latency target could not be written to an open device.
    #[error("failed to write latency target to {}", path.display())]
    WriteFailed {
        /// Device path that was written.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Requested latency target is outside the accepted range.
    #[error("invalid latency target: {0}us (must be >= 0)")]
    InvalidTarget(i32),

    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid state transition attempted.
    #[error("invalid guard state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl QosError {
    /// Raw OS error number behind a device failure, if any.
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::DeviceUnavailable { source, .. } | Self::WriteFailed { source, .. } => {
                source.raw_os_error()
            }
            _ => None,
        }
    }

    /// Process exit status for this error.
    ///
    /// Device failures report their errno; values outside `1..=255` (and
    /// errors with no errno at all) collapse to `1`.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.errno() {
            Some(code @ 1..=255) => code,
            _ => 1,
        }
    }
}

/// Convenience type alias for PM QOS operations.
pub type QosResult<T> = Result<T, QosError>;
