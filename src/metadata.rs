//! Per-device calibration metadata, written once before recording starts.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::device::CameraDevice;
use crate::error::{CaptureError, CaptureResult};
use crate::session::{RecordingSession, StreamRole};
use crate::types::Stream;

/// Paths of the three metadata files written for one device.
#[derive(Debug, Clone)]
pub struct MetadataFiles {
    pub intrin_depth: PathBuf,
    pub intrin_color: PathBuf,
    pub extrin: PathBuf,
}

/// Write depth/color intrinsics and depth→color extrinsics for `device`.
pub fn write_device_metadata<D: CameraDevice>(
    session: &RecordingSession,
    device_index: usize,
    device: &D,
    depth_stream: Stream,
    color_stream: Stream,
) -> CaptureResult<MetadataFiles> {
    let config_err = |source| CaptureError::Configuration {
        device: device_index,
        source,
    };

    let files = MetadataFiles {
        intrin_depth: session.path(StreamRole::IntrinDepth, device_index),
        intrin_color: session.path(StreamRole::IntrinColor, device_index),
        extrin: session.path(StreamRole::Extrin, device_index),
    };

    let intrin_depth = device.intrinsics(depth_stream).map_err(config_err)?;
    write_json(&files.intrin_depth, &intrin_depth)?;

    let intrin_color = device.intrinsics(color_stream).map_err(config_err)?;
    write_json(&files.intrin_color, &intrin_color)?;

    let extrin = device
        .extrinsics(depth_stream, color_stream)
        .map_err(config_err)?;
    write_json(&files.extrin, &extrin)?;

    Ok(files)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> CaptureResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, value)?;
    out.flush()?;
    Ok(())
}
