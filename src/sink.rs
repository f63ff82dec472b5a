//! Where decoded frames go for inspection.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, WriteBytesExt};

use crate::logio::{Frame, FrameImage};

pub trait FrameSink {
    /// Show frame number `index` (0-based) of the recording.
    fn show(&mut self, index: u64, frame: &Frame) -> io::Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn show(&mut self, index: u64, frame: &Frame) -> io::Result<()> {
        (**self).show(index, frame)
    }
}

/// Fan a frame out to several sinks in order.
impl<S: FrameSink> FrameSink for Vec<S> {
    fn show(&mut self, index: u64, frame: &Frame) -> io::Result<()> {
        for sink in self.iter_mut() {
            sink.show(index, frame)?;
        }
        Ok(())
    }
}

/// Per-frame value statistics, over all channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub min: u16,
    pub max: u16,
    pub mean: f64,
    /// Depth pixels equal to zero (no measurement). Always 0 for color.
    pub zero: usize,
}

impl FrameStats {
    pub fn of(image: &FrameImage) -> Self {
        match image {
            FrameImage::Depth(img) => Self::collect(img.iter().copied(), true),
            FrameImage::Color(img) => Self::collect(img.iter().map(|&v| v as u16), false),
        }
    }

    fn collect(values: impl Iterator<Item = u16>, count_zero: bool) -> Self {
        let (mut min, mut max, mut sum, mut n, mut zero) = (u16::MAX, 0u16, 0u64, 0u64, 0usize);
        for v in values {
            min = min.min(v);
            max = max.max(v);
            sum += v as u64;
            n += 1;
            if count_zero && v == 0 {
                zero += 1;
            }
        }
        if n == 0 {
            min = 0;
        }
        Self {
            min,
            max,
            mean: if n == 0 { 0.0 } else { sum as f64 / n as f64 },
            zero,
        }
    }
}

/// Logs frame statistics and remembers the last ones.
#[derive(Debug, Default)]
pub struct SummarySink {
    last: Option<FrameStats>,
}

impl SummarySink {
    pub fn last(&self) -> Option<FrameStats> {
        self.last
    }
}

impl FrameSink for SummarySink {
    fn show(&mut self, index: u64, frame: &Frame) -> io::Result<()> {
        let stats = FrameStats::of(&frame.image);
        tracing::info!(
            frame = index,
            timestamp = frame.timestamp,
            min = stats.min,
            max = stats.max,
            mean = stats.mean,
            zero = stats.zero,
            "frame"
        );
        self.last = Some(stats);
        Ok(())
    }
}

/// Writes each frame as a netpbm image: 16-bit PGM for depth, PPM for color.
pub struct PnmDumpSink {
    dir: PathBuf,
    stem: String,
}

impl PnmDumpSink {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            stem: stem.into(),
        })
    }

    pub fn path_for(&self, index: u64, image: &FrameImage) -> PathBuf {
        let ext = match image {
            FrameImage::Depth(_) => "pgm",
            FrameImage::Color(_) => "ppm",
        };
        self.dir.join(format!("{}_{index:06}.{ext}", self.stem))
    }
}

impl FrameSink for PnmDumpSink {
    fn show(&mut self, index: u64, frame: &Frame) -> io::Result<()> {
        let path = self.path_for(index, &frame.image);
        write_pnm(&path, &frame.image)?;
        tracing::debug!("wrote {}", path.display());
        Ok(())
    }
}

fn write_pnm(path: &Path, image: &FrameImage) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    match image {
        FrameImage::Depth(img) => {
            let (h, w) = img.dim();
            write!(out, "P5\n{w} {h}\n65535\n")?;
            for &v in img.iter() {
                out.write_u16::<BigEndian>(v)?;
            }
        }
        FrameImage::Color(img) => {
            let (h, w, _) = img.dim();
            write!(out, "P6\n{w} {h}\n255\n")?;
            for &v in img.iter() {
                out.write_u8(v)?;
            }
        }
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn depth_frame() -> Frame {
        Frame {
            timestamp: 9,
            image: FrameImage::Depth(Array2::from_shape_vec((1, 3), vec![0, 300, 600]).unwrap()),
        }
    }

    #[test]
    fn stats_over_depth() {
        let stats = FrameStats::of(&depth_frame().image);
        assert_eq!((stats.min, stats.max, stats.zero), (0, 600, 1));
        assert_eq!(stats.mean, 300.0);
    }

    #[test]
    fn summary_sink_keeps_last_stats() {
        let mut sink = SummarySink::default();
        assert!(sink.last().is_none());
        sink.show(0, &depth_frame()).unwrap();
        assert_eq!(sink.last().unwrap().max, 600);
    }

    #[test]
    fn pgm_is_big_endian_sixteen_bit() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PnmDumpSink::new(dir.path(), "depth").unwrap();
        sink.show(3, &depth_frame()).unwrap();

        let bytes = std::fs::read(dir.path().join("depth_000003.pgm")).unwrap();
        let header = b"P5\n3 1\n65535\n";
        assert_eq!(&bytes[..header.len()], header);
        assert_eq!(&bytes[header.len()..], &[0, 0, 0x01, 0x2C, 0x02, 0x58]);
    }

    #[test]
    fn ppm_keeps_rgb_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut sinks = vec![PnmDumpSink::new(dir.path(), "color").unwrap()];
        let frame = Frame {
            timestamp: 1,
            image: FrameImage::Color(Array3::from_shape_vec((1, 2, 3), vec![1, 2, 3, 4, 5, 6]).unwrap()),
        };
        sinks.show(0, &frame).unwrap();

        let bytes = std::fs::read(dir.path().join("color_000000.ppm")).unwrap();
        assert!(bytes.starts_with(b"P6\n2 1\n255\n"));
        assert!(bytes.ends_with(&[1, 2, 3, 4, 5, 6]));
    }
}
