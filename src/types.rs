use std::io::{self, Read, Write};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Pixel encodings the capture pipeline asks the cameras for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 16-bit depth, one channel.
    Z16,
    /// 8-bit interleaved red/green/blue.
    Rgb8,
}

impl PixelFormat {
    pub fn channels(self) -> i32 {
        match self {
            PixelFormat::Z16 => 1,
            PixelFormat::Rgb8 => 3,
        }
    }

    pub fn bytes_per_channel(self) -> i32 {
        match self {
            PixelFormat::Z16 => 2,
            PixelFormat::Rgb8 => 1,
        }
    }
}

/// Logical streams a device can hand out frame buffers for.
///
/// `Depth` and `Color` are the native sensor streams; the other two are
/// derived by the device from the native ones.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Depth,
    Color,
    RectifiedColor,
    DepthAlignedToRectifiedColor,
}

impl Stream {
    pub fn format(self) -> PixelFormat {
        match self {
            Stream::Depth | Stream::DepthAlignedToRectifiedColor => PixelFormat::Z16,
            Stream::Color | Stream::RectifiedColor => PixelFormat::Rgb8,
        }
    }

    /// The (depth, color) pair that gets recorded.
    pub fn recorded_pair(rectified: bool) -> (Stream, Stream) {
        if rectified {
            (Stream::DepthAlignedToRectifiedColor, Stream::RectifiedColor)
        } else {
            (Stream::Depth, Stream::Color)
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Requested configuration for one native stream.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub resolution: Resolution,
    pub format: PixelFormat,
    pub fps: u32,
}

/// Fixed 16-byte record at the start of every `.rec` file.
///
/// All four fields are `int32` in native byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHeader {
    pub width: i32,
    pub height: i32,
    pub channels: i32,
    pub bytes_per_channel: i32,
}

impl StreamHeader {
    pub const SIZE: usize = 16;

    pub fn new(resolution: Resolution, format: PixelFormat) -> Self {
        Self {
            width: resolution.width as i32,
            height: resolution.height as i32,
            channels: format.channels(),
            bytes_per_channel: format.bytes_per_channel(),
        }
    }

    /// True when the geometry is one the recording format allows and a
    /// frame of it fits in memory.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && matches!(self.channels, 1 | 3)
            && matches!(self.bytes_per_channel, 1 | 2)
            && self.frame_bytes().is_some()
    }

    /// Bytes of pixel data in every frame record. Zero for invalid headers.
    pub fn payload_size(&self) -> usize {
        if !self.is_valid() {
            return 0;
        }
        self.frame_bytes().unwrap_or(0)
    }

    fn frame_bytes(&self) -> Option<usize> {
        let dims = [self.width, self.height, self.channels, self.bytes_per_channel];
        let size = dims.iter().try_fold(1usize, |acc, &d| {
            acc.checked_mul(usize::try_from(d).ok()?)
        })?;
        (size <= isize::MAX as usize).then_some(size)
    }

    /// Size of one frame record: timestamp plus payload.
    pub fn record_size(&self) -> usize {
        4 + self.payload_size()
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<NativeEndian>(self.width)?;
        writer.write_i32::<NativeEndian>(self.height)?;
        writer.write_i32::<NativeEndian>(self.channels)?;
        writer.write_i32::<NativeEndian>(self.bytes_per_channel)
    }

    pub fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            width: reader.read_i32::<NativeEndian>()?,
            height: reader.read_i32::<NativeEndian>()?,
            channels: reader.read_i32::<NativeEndian>()?,
            bytes_per_channel: reader.read_i32::<NativeEndian>()?,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistortionModel {
    None,
    ModifiedBrownConrady,
    InverseBrownConrady,
}

/// Pinhole intrinsics as reported by the device for one stream.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub width: u32,
    pub height: u32,
    pub ppx: f32,
    pub ppy: f32,
    pub fx: f32,
    pub fy: f32,
    pub model: DistortionModel,
    pub coeffs: [f32; 5],
}

/// Rigid transform between two streams of the same device.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Extrinsics {
    pub rotation: Matrix3<f32>,
    pub translation: Vector3<f32>,
}

impl Extrinsics {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }
}
