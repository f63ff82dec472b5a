//! Synchronized multi-camera color/depth recording and raw playback.
//!
//! Each device of a session writes two `.rec` files (depth and color): a
//! 16-byte geometry header followed by `{u32 timestamp, payload}` records.
//! Calibration metadata goes next to them as JSON.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod capture;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod logio;
pub mod metadata;
pub mod playback;
pub mod session;
pub mod sink;
pub mod synthetic;
pub mod types;

pub use capture::{record, CaptureLoop, CaptureSummary, DeviceBinding};
pub use config::{CaptureConfig, FetchMode};
pub use device::{CameraContext, CameraDevice};
pub use error::{CaptureError, DecodeError, DeviceError};
pub use logio::{Frame, FrameImage, PixelLayout, Recording, RecordingWriter};
pub use session::{RecordingFile, RecordingSession, StreamRole};
pub use types::{PixelFormat, Resolution, Stream, StreamHeader};

/// Filter used when `RUST_LOG` is unset: the library and both tools.
pub const DEFAULT_LOG_FILTER: &str =
    "d435i_multicam_recorder=info,multicam_capture=info,multicam_play=info";

/// Log to stderr, filtered by `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
