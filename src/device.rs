//! Camera capability interface.
//!
//! The capture loop only talks to cameras through these traits. A hardware
//! SDK binding implements them for real devices; [`crate::synthetic`]
//! implements them for tests and dry runs.

use crate::error::DeviceError;
use crate::types::{Extrinsics, Intrinsics, Resolution, Stream, StreamConfig};

/// Enumerates attached cameras.
pub trait CameraContext {
    type Device: CameraDevice;

    fn device_count(&self) -> usize;

    /// Open the device at `index`, `0..device_count()`.
    fn open_device(&mut self, index: usize) -> Result<Self::Device, DeviceError>;
}

/// One attached camera.
pub trait CameraDevice {
    fn name(&self) -> &str;

    fn serial(&self) -> &str;

    /// Request a native stream (`Depth` or `Color`). Must be called before `start`.
    fn enable_stream(&mut self, stream: Stream, config: StreamConfig) -> Result<(), DeviceError>;

    fn start(&mut self) -> Result<(), DeviceError>;

    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Resolution the device actually delivers for `stream` once started.
    fn stream_resolution(&self, stream: Stream) -> Result<Resolution, DeviceError>;

    fn intrinsics(&self, stream: Stream) -> Result<Intrinsics, DeviceError>;

    fn extrinsics(&self, from: Stream, to: Stream) -> Result<Extrinsics, DeviceError>;

    /// Block until a new frame set is available.
    fn wait_for_frames(&mut self) -> Result<(), DeviceError>;

    /// Return immediately; `true` when a new frame set arrived since the last call.
    fn poll_for_frames(&mut self) -> Result<bool, DeviceError>;

    /// Most recent buffer for `stream`.
    fn frame_data(&self, stream: Stream) -> Result<&[u8], DeviceError>;
}
