use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use byteorder::{ByteOrder, NativeEndian};
use ndarray::{Array2, Array3};

use crate::error::{DecodeError, DecodeResult};
use crate::types::StreamHeader;

/// How the payload bytes of a recording are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// One `u16` per pixel (depth).
    Wide,
    /// Three `u8` per pixel (color).
    ByteTriple,
}

impl PixelLayout {
    pub fn for_header(header: &StreamHeader) -> DecodeResult<Self> {
        if !header.is_valid() {
            return Err(DecodeError::UnsupportedFormat { header: *header });
        }
        match (header.channels, header.bytes_per_channel) {
            (1, 2) => Ok(PixelLayout::Wide),
            (3, 1) => Ok(PixelLayout::ByteTriple),
            _ => Err(DecodeError::UnsupportedFormat { header: *header }),
        }
    }
}

/// Pixel buffer of one decoded frame, row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameImage {
    /// `height × width`
    Depth(Array2<u16>),
    /// `height × width × 3`
    Color(Array3<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub timestamp: u32,
    pub image: FrameImage,
}

/// Forward-only decoder over one recording.
///
/// A short final record (capture killed mid-write) ends the sequence the
/// same way a clean end of file does.
pub struct Recording<R: Read = BufReader<File>> {
    reader: R,
    header: StreamHeader,
    layout: PixelLayout,
    payload: Vec<u8>,
    truncated_tail: bool,
    finished: bool,
}

impl Recording {
    pub fn open(path: &Path) -> DecodeResult<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }
}

impl<R: Read> Recording<R> {
    pub fn from_reader(mut reader: R) -> DecodeResult<Self> {
        let header = read_header(&mut reader)?;
        let layout = PixelLayout::for_header(&header)?;
        Ok(Self {
            reader,
            payload: Vec::new(),
            header,
            layout,
            truncated_tail: false,
            finished: false,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// True once the sequence ended on a partial record.
    pub fn truncated_tail(&self) -> bool {
        self.truncated_tail
    }

    /// Next frame, or `None` when fewer than a full record remains.
    pub fn next_frame(&mut self) -> DecodeResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let mut stamp = [0u8; 4];
        let read = read_full(&mut self.reader, &mut stamp)?;
        if read < stamp.len() {
            self.finished = true;
            if read > 0 {
                self.truncated_tail = true;
                tracing::warn!("recording ends mid-frame: {read} of 4 timestamp bytes");
            }
            return Ok(None);
        }
        let timestamp = NativeEndian::read_u32(&stamp);

        // Grows with the bytes actually present; the header alone is not trusted.
        let expected = self.header.payload_size();
        self.payload.clear();
        let read = (&mut self.reader)
            .take(expected as u64)
            .read_to_end(&mut self.payload)?;
        if read < expected {
            self.finished = true;
            self.truncated_tail = true;
            tracing::warn!(
                "recording ends mid-frame: {read} of {expected} payload bytes after timestamp {timestamp}"
            );
            return Ok(None);
        }

        Ok(Some(Frame {
            timestamp,
            image: self.image()?,
        }))
    }

    fn image(&self) -> DecodeResult<FrameImage> {
        let (w, h) = (self.header.width as usize, self.header.height as usize);
        let image = match self.layout {
            PixelLayout::Wide => {
                let pixels: Vec<u16> = bytemuck::pod_collect_to_vec(&self.payload);
                FrameImage::Depth(Array2::from_shape_vec((h, w), pixels).map_err(shape_err)?)
            }
            PixelLayout::ByteTriple => FrameImage::Color(
                Array3::from_shape_vec((h, w, 3), self.payload.clone()).map_err(shape_err)?,
            ),
        };
        Ok(image)
    }
}

impl<R: Read> Iterator for Recording<R> {
    type Item = DecodeResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn read_header<R: Read>(reader: &mut R) -> DecodeResult<StreamHeader> {
    let mut buf = [0u8; StreamHeader::SIZE];
    let read = read_full(reader, &mut buf)?;
    if read < buf.len() {
        return Err(DecodeError::TruncatedHeader {
            expected: StreamHeader::SIZE,
            read,
        });
    }
    Ok(StreamHeader::read(&mut &buf[..])?)
}

/// Like `read_exact`, but reports how much was read before end of file.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn shape_err(e: ndarray::ShapeError) -> DecodeError {
    DecodeError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
}
