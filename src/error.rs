use crate::types::StreamHeader;

/// Error reported by a camera backend, naming the call that failed.
#[derive(Debug, thiserror::Error)]
#[error("{function}: {message}")]
pub struct DeviceError {
    pub function: String,
    pub message: String,
}

impl DeviceError {
    pub fn new(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            message: message.into(),
        }
    }
}

/// Capture-side failures. All of them end the session.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("No device detected. Is it plugged in?")]
    DeviceUnavailable,

    #[error("device {device}: stream configuration rejected: {source}")]
    Configuration {
        device: usize,
        #[source]
        source: DeviceError,
    },

    #[error("device {device}: frame fetch failed: {source}")]
    Fetch {
        device: usize,
        #[source]
        source: DeviceError,
    },

    #[error("payload is {actual} bytes, header expects {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("cannot record {channels} channel(s) of {bytes_per_channel} byte(s)")]
    UnsupportedFormat {
        channels: i32,
        bytes_per_channel: i32,
    },

    #[error("invalid capture configuration: {0}")]
    InvalidConfig(String),

    #[error("metadata serialization error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Playback-side failures. End of stream is not one of them.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated header: read {read} of {expected} bytes")]
    TruncatedHeader { expected: usize, read: usize },

    #[error(
        "unsupported format: {}x{} with {} channel(s) of {} byte(s)",
        header.width,
        header.height,
        header.channels,
        header.bytes_per_channel
    )]
    UnsupportedFormat { header: StreamHeader },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
