//! Deterministic in-process cameras.
//!
//! Every frame set is a pure function of (device seed, frame number), so a
//! recording made from these devices can be checked byte for byte.

use std::collections::HashMap;

use crate::device::{CameraContext, CameraDevice};
use crate::error::DeviceError;
use crate::types::{
    DistortionModel, Extrinsics, Intrinsics, PixelFormat, Resolution, Stream, StreamConfig,
};

const MAX_DIMENSION: u32 = 4096;

pub struct SyntheticContext {
    devices: Vec<Option<SyntheticDevice>>,
}

impl SyntheticContext {
    /// `count` identical-looking cameras with distinct seeds.
    pub fn new(count: usize) -> Self {
        Self::from_devices((0..count).map(SyntheticDevice::new).collect())
    }

    pub fn from_devices(devices: Vec<SyntheticDevice>) -> Self {
        Self {
            devices: devices.into_iter().map(Some).collect(),
        }
    }
}

impl CameraContext for SyntheticContext {
    type Device = SyntheticDevice;

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn open_device(&mut self, index: usize) -> Result<SyntheticDevice, DeviceError> {
        let count = self.devices.len();
        self.devices
            .get_mut(index)
            .ok_or_else(|| {
                DeviceError::new(
                    "open_device",
                    format!("index {index} out of range ({count} devices)"),
                )
            })?
            .take()
            .ok_or_else(|| DeviceError::new("open_device", format!("device {index} already open")))
    }
}

pub struct SyntheticDevice {
    name: String,
    serial: String,
    seed: u8,
    configs: HashMap<Stream, StreamConfig>,
    buffers: HashMap<Stream, Vec<u8>>,
    started: bool,
    frame_number: u64,
    polls: u64,
    poll_stride: u64,
    empty_polls: u64,
    fail_after: Option<u64>,
}

impl SyntheticDevice {
    pub fn new(index: usize) -> Self {
        Self {
            name: "Synthetic RGB-D Camera".to_string(),
            serial: format!("SYN{index:05}"),
            seed: (index as u8).wrapping_mul(31),
            configs: HashMap::new(),
            buffers: HashMap::new(),
            started: false,
            frame_number: 0,
            polls: 0,
            poll_stride: 1,
            empty_polls: 0,
            fail_after: None,
        }
    }

    /// Fail `wait_for_frames`/`poll_for_frames` once `frames` frame sets were delivered.
    pub fn with_fetch_failure_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Deliver a new frame set only every `stride` polls.
    pub fn with_poll_stride(mut self, stride: u64) -> Self {
        self.poll_stride = stride.max(1);
        self
    }

    /// Report nothing new for the first `polls` polls after start, like a
    /// sensor still warming up.
    pub fn with_empty_first_polls(mut self, polls: u64) -> Self {
        self.empty_polls = polls;
        self
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Color payload for frame `frame_number` at `resolution`.
    pub fn color_pattern(seed: u8, frame_number: u64, resolution: Resolution) -> Vec<u8> {
        let len = resolution.width as usize * resolution.height as usize * 3;
        (0..len)
            .map(|i| (i as u64 + frame_number * 3 + seed as u64) as u8)
            .collect()
    }

    /// Depth payload (native-endian `u16`) for frame `frame_number`.
    pub fn depth_pattern(seed: u8, frame_number: u64, resolution: Resolution) -> Vec<u8> {
        let len = resolution.width as usize * resolution.height as usize;
        let depth: Vec<u16> = (0..len)
            .map(|i| (i as u64 * 7 + frame_number + seed as u64) as u16)
            .collect();
        bytemuck::cast_slice(&depth).to_vec()
    }

    pub fn seed(&self) -> u8 {
        self.seed
    }

    fn native_resolution(&self, stream: Stream) -> Result<Resolution, DeviceError> {
        self.configs
            .get(&stream)
            .map(|c| c.resolution)
            .ok_or_else(|| DeviceError::new("get_stream_width", format!("{stream:?} not enabled")))
    }

    fn ensure_running(&self, function: &str) -> Result<(), DeviceError> {
        if self.started {
            Ok(())
        } else {
            Err(DeviceError::new(function, "device not started"))
        }
    }

    fn advance(&mut self, function: &str) -> Result<(), DeviceError> {
        if let Some(limit) = self.fail_after {
            if self.frame_number >= limit {
                return Err(DeviceError::new(function, "device disconnected"));
            }
        }
        self.frame_number += 1;

        let color = self.native_resolution(Stream::Color)?;
        let depth = self.native_resolution(Stream::Depth)?;
        let n = self.frame_number;
        self.buffers.insert(Stream::Color, Self::color_pattern(self.seed, n, color));
        self.buffers
            .insert(Stream::RectifiedColor, Self::color_pattern(self.seed, n, color));
        self.buffers.insert(Stream::Depth, Self::depth_pattern(self.seed, n, depth));
        self.buffers.insert(
            Stream::DepthAlignedToRectifiedColor,
            Self::depth_pattern(self.seed, n, color),
        );
        Ok(())
    }
}

impl CameraDevice for SyntheticDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn serial(&self) -> &str {
        &self.serial
    }

    fn enable_stream(&mut self, stream: Stream, config: StreamConfig) -> Result<(), DeviceError> {
        let expected = match stream {
            Stream::Depth => PixelFormat::Z16,
            Stream::Color => PixelFormat::Rgb8,
            other => {
                return Err(DeviceError::new(
                    "enable_stream",
                    format!("{other:?} is not a native stream"),
                ))
            }
        };
        if config.format != expected {
            return Err(DeviceError::new(
                "enable_stream",
                format!("{stream:?} does not support {:?}", config.format),
            ));
        }
        let Resolution { width, height } = config.resolution;
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(DeviceError::new(
                "enable_stream",
                format!("{stream:?} does not support {width}x{height}"),
            ));
        }
        if self.started {
            return Err(DeviceError::new("enable_stream", "device already streaming"));
        }
        self.configs.insert(stream, config);
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.native_resolution(Stream::Depth)?;
        self.native_resolution(Stream::Color)?;
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.ensure_running("stop")?;
        self.started = false;
        Ok(())
    }

    fn stream_resolution(&self, stream: Stream) -> Result<Resolution, DeviceError> {
        match stream {
            Stream::Depth => self.native_resolution(Stream::Depth),
            Stream::Color | Stream::RectifiedColor | Stream::DepthAlignedToRectifiedColor => {
                self.native_resolution(Stream::Color)
            }
        }
    }

    fn intrinsics(&self, stream: Stream) -> Result<Intrinsics, DeviceError> {
        let Resolution { width, height } = self.stream_resolution(stream)?;
        let (model, coeffs) = match stream {
            Stream::Color => (DistortionModel::ModifiedBrownConrady, [0.1, -0.25, 0.0, 0.0, 0.1]),
            Stream::Depth => (DistortionModel::InverseBrownConrady, [0.05, 0.0, 0.0, 0.0, 0.0]),
            _ => (DistortionModel::None, [0.0; 5]),
        };
        Ok(Intrinsics {
            width,
            height,
            ppx: width as f32 / 2.0,
            ppy: height as f32 / 2.0,
            fx: width as f32 * 0.9,
            fy: width as f32 * 0.9,
            model,
            coeffs,
        })
    }

    fn extrinsics(&self, from: Stream, to: Stream) -> Result<Extrinsics, DeviceError> {
        self.stream_resolution(from)?;
        self.stream_resolution(to)?;
        let mut extrinsics = Extrinsics::identity();
        if from == Stream::Depth && to != Stream::Depth {
            // 58 mm baseline between the depth imager and the color sensor
            extrinsics.translation.x = -0.058;
        }
        Ok(extrinsics)
    }

    fn wait_for_frames(&mut self) -> Result<(), DeviceError> {
        self.ensure_running("wait_for_frames")?;
        self.advance("wait_for_frames")
    }

    fn poll_for_frames(&mut self) -> Result<bool, DeviceError> {
        self.ensure_running("poll_for_frames")?;
        if self.empty_polls > 0 {
            self.empty_polls -= 1;
            return Ok(false);
        }
        self.polls += 1;
        if (self.polls - 1) % self.poll_stride != 0 {
            return Ok(false);
        }
        self.advance("poll_for_frames")?;
        Ok(true)
    }

    fn frame_data(&self, stream: Stream) -> Result<&[u8], DeviceError> {
        self.ensure_running("get_frame_data")?;
        self.buffers
            .get(&stream)
            .map(Vec::as_slice)
            .ok_or_else(|| DeviceError::new("get_frame_data", format!("no {stream:?} frame yet")))
    }
}
