use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, CaptureResult};
use crate::types::{PixelFormat, Resolution, StreamConfig};

pub const DEFAULT_RECORDING_NAME: &str = "recording";
pub const DEFAULT_MAX_CAMERAS: usize = 3;
pub const DEFAULT_RECTIFIED: bool = true;
pub const DEFAULT_COLOR: Resolution = Resolution {
    width: 640,
    height: 480,
};
pub const DEFAULT_DEPTH: Resolution = Resolution {
    width: 480,
    height: 360,
};
/// Recording always runs at this rate.
pub const CAPTURE_FPS: u32 = 30;

/// How the capture loop gets frames out of a device. One mode per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Wait for a new frame set on every device, every tick.
    #[default]
    Blocking,
    /// Take whatever frame set is most recent, possibly the same as last tick.
    Latest,
}

/// Everything a capture session needs before touching a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub recording_name: String,
    pub max_cameras: usize,
    /// Record rectified color and depth aligned to it (depth becomes color sized).
    pub rectified: bool,
    pub color: Resolution,
    pub depth: Resolution,
    #[serde(default)]
    pub fetch_mode: FetchMode,
    /// Stop after this many ticks; run until signalled when `None`.
    #[serde(default)]
    pub max_frames: Option<u64>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            recording_name: DEFAULT_RECORDING_NAME.to_string(),
            max_cameras: DEFAULT_MAX_CAMERAS,
            rectified: DEFAULT_RECTIFIED,
            color: DEFAULT_COLOR,
            depth: DEFAULT_DEPTH,
            fetch_mode: FetchMode::default(),
            max_frames: None,
            output_dir: default_output_dir(),
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> CaptureResult<()> {
        if self.recording_name.is_empty() {
            return Err(CaptureError::InvalidConfig(
                "recording name must not be empty".into(),
            ));
        }
        if self.max_cameras == 0 {
            return Err(CaptureError::InvalidConfig(
                "max cameras must be at least 1".into(),
            ));
        }
        for (label, res) in [("rgb", self.color), ("depth", self.depth)] {
            if res.width == 0 || res.height == 0 {
                return Err(CaptureError::InvalidConfig(format!(
                    "{label} resolution {}x{} is empty",
                    res.width, res.height
                )));
            }
        }
        Ok(())
    }

    pub fn depth_stream_config(&self) -> StreamConfig {
        StreamConfig {
            resolution: self.depth,
            format: PixelFormat::Z16,
            fps: CAPTURE_FPS,
        }
    }

    pub fn color_stream_config(&self) -> StreamConfig {
        StreamConfig {
            resolution: self.color,
            format: PixelFormat::Rgb8,
            fps: CAPTURE_FPS,
        }
    }
}
