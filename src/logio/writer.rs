use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{NativeEndian, WriteBytesExt};

use crate::error::{CaptureError, CaptureResult};
use crate::types::StreamHeader;

/// Append-only sink for one `.rec` file.
///
/// The header goes out first and is never rewritten; every frame after it
/// is a native `u32` timestamp followed by exactly `payload_size` bytes.
pub struct RecordingWriter<W: Write = BufWriter<File>> {
    out: W,
    header: StreamHeader,
    payload_size: usize,
    frames: u64,
}

impl RecordingWriter {
    /// Create or truncate `path` and write `header` to it.
    pub fn open(path: &Path, header: StreamHeader) -> CaptureResult<Self> {
        Self::validate(&header)?;
        Self::new(BufWriter::new(File::create(path)?), header)
    }
}

impl<W: Write> RecordingWriter<W> {
    pub fn new(mut out: W, header: StreamHeader) -> CaptureResult<Self> {
        Self::validate(&header)?;
        header.write(&mut out)?;
        Ok(Self {
            out,
            payload_size: header.payload_size(),
            header,
            frames: 0,
        })
    }

    fn validate(header: &StreamHeader) -> CaptureResult<()> {
        if header.is_valid() {
            Ok(())
        } else {
            Err(CaptureError::UnsupportedFormat {
                channels: header.channels,
                bytes_per_channel: header.bytes_per_channel,
            })
        }
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// `SizeMismatch` unless `payload` is exactly one frame of this recording.
    pub fn check_payload(&self, payload: &[u8]) -> CaptureResult<()> {
        if payload.len() != self.payload_size {
            return Err(CaptureError::SizeMismatch {
                expected: self.payload_size,
                actual: payload.len(),
            });
        }
        Ok(())
    }

    /// Append one frame record. Nothing is written on a size mismatch.
    pub fn append(&mut self, timestamp: u32, payload: &[u8]) -> CaptureResult<()> {
        self.check_payload(payload)?;
        self.out.write_u32::<NativeEndian>(timestamp)?;
        self.out.write_all(payload)?;
        self.frames += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> CaptureResult<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying sink.
    pub fn close(mut self) -> CaptureResult<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}
