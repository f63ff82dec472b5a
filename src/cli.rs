use clap::Parser;
use std::path::PathBuf;

use crate::config::{
    CaptureConfig, FetchMode, CAPTURE_FPS, DEFAULT_COLOR, DEFAULT_DEPTH, DEFAULT_MAX_CAMERAS,
    DEFAULT_RECORDING_NAME, DEFAULT_RECTIFIED,
};
use crate::types::Resolution;

/// Record synchronized color and depth from every attached camera
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
pub struct CaptureArgs {
    /// Prefix of every file the session writes
    #[arg(default_value = DEFAULT_RECORDING_NAME)]
    pub recording_name: String,

    /// Use at most this many of the enumerated cameras
    #[arg(default_value_t = DEFAULT_MAX_CAMERAS)]
    pub max_cameras: usize,

    /// 1 records rectified color and depth aligned to it, 0 the native streams
    #[arg(default_value_t = DEFAULT_RECTIFIED as u8, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub rectification: u8,

    #[arg(default_value_t = DEFAULT_COLOR.width)]
    pub rgb_w: u32,

    #[arg(default_value_t = DEFAULT_COLOR.height)]
    pub rgb_h: u32,

    #[arg(default_value_t = DEFAULT_DEPTH.width)]
    pub depth_w: u32,

    #[arg(default_value_t = DEFAULT_DEPTH.height)]
    pub depth_h: u32,

    /// Stop after this many capture cycles instead of waiting for Ctrl-C
    #[arg(long)]
    pub frames: Option<u64>,

    /// Take the most recent frame set instead of waiting for a new one
    #[arg(long)]
    pub latest: bool,

    /// Directory the recording files are written to
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Number of synthetic cameras to record from
    #[arg(long, default_value_t = 0)]
    pub synthetic_devices: usize,
}

impl CaptureArgs {
    pub fn config(&self) -> CaptureConfig {
        CaptureConfig {
            recording_name: self.recording_name.clone(),
            max_cameras: self.max_cameras,
            rectified: self.rectification == 1,
            color: Resolution::new(self.rgb_w, self.rgb_h),
            depth: Resolution::new(self.depth_w, self.depth_h),
            fetch_mode: if self.latest {
                FetchMode::Latest
            } else {
                FetchMode::Blocking
            },
            max_frames: self.frames,
            output_dir: self.output_dir.clone(),
        }
    }
}

/// `help` as the first argument prints usage without touching a device.
pub fn is_help_request<I, S>(args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    args.into_iter().nth(1).is_some_and(|a| a.as_ref() == "help")
}

pub fn usage(program: &str) -> String {
    let d = CaptureConfig::default();
    format!(
        "Usage: {program} <recording_name> <max # of cameras> <0/1 to enable rectification> <rgb_w> <rgb_h> <depth_w> <depth_h>\n\
         Default: {program} {} {} {} {} {} {} {}\n\
         Note: if using rectification, recorded depth will be RGB sized\n\
         Note: Recording is always {CAPTURE_FPS}Hz\n",
        d.recording_name,
        d.max_cameras,
        d.rectified as u8,
        d.color.width,
        d.color.height,
        d.depth.width,
        d.depth.height,
    )
}

/// Step through one recording, printing the header and every timestamp
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct PlaybackArgs {
    /// Recording file (`.rec`); nothing happens without one
    pub path: Option<PathBuf>,

    /// Do not wait for Enter between frames
    #[arg(long)]
    pub no_wait: bool,

    /// Also write every frame as a PGM/PPM image into this directory
    #[arg(long)]
    pub dump_dir: Option<PathBuf>,
}
