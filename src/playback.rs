//! Frame-stepping playback of one recording.

use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::DecodeResult;
use crate::logio::Recording;
use crate::sink::FrameSink;
use crate::types::StreamHeader;

/// Answer to "show the next frame?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Next,
    Quit,
}

pub trait Acknowledge {
    fn wait(&mut self) -> io::Result<Advance>;
}

/// Never waits.
pub struct NoWait;

impl Acknowledge for NoWait {
    fn wait(&mut self) -> io::Result<Advance> {
        Ok(Advance::Next)
    }
}

/// Waits for one line of input per frame; a line starting with `q` quits.
/// A closed input stops waiting and plays the rest.
pub struct LineAck<B: BufRead> {
    input: B,
    closed: bool,
}

impl<B: BufRead> LineAck<B> {
    pub fn new(input: B) -> Self {
        Self {
            input,
            closed: false,
        }
    }
}

impl<B: BufRead> Acknowledge for LineAck<B> {
    fn wait(&mut self) -> io::Result<Advance> {
        if self.closed {
            return Ok(Advance::Next);
        }
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            self.closed = true;
            return Ok(Advance::Next);
        }
        if line.trim_start().starts_with(['q', 'Q']) {
            Ok(Advance::Quit)
        } else {
            Ok(Advance::Next)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub frames: u64,
    pub truncated_tail: bool,
    pub quit_early: bool,
}

/// `width height channels bytes_per_channel`
pub fn write_header_line<W: Write>(out: &mut W, header: &StreamHeader) -> io::Result<()> {
    writeln!(
        out,
        "{} {} {} {}",
        header.width, header.height, header.channels, header.bytes_per_channel
    )
}

/// Print the header, then for every frame print its timestamp, hand it to
/// `sink` and wait for `ack`.
pub fn play<R, S, A, W>(
    mut recording: Recording<R>,
    sink: &mut S,
    ack: &mut A,
    out: &mut W,
) -> DecodeResult<PlaybackSummary>
where
    R: Read,
    S: FrameSink + ?Sized,
    A: Acknowledge + ?Sized,
    W: Write,
{
    write_header_line(out, recording.header())?;
    let mut summary = PlaybackSummary::default();
    while let Some(frame) = recording.next_frame()? {
        writeln!(out, "{}", frame.timestamp)?;
        out.flush()?;
        sink.show(summary.frames, &frame)?;
        summary.frames += 1;
        if ack.wait()? == Advance::Quit {
            summary.quit_early = true;
            break;
        }
    }
    summary.truncated_tail = recording.truncated_tail();
    Ok(summary)
}

/// Play several files. A failure only affects the file it happened in.
pub fn play_all<P, S, A, W>(
    paths: &[P],
    sink: &mut S,
    ack: &mut A,
    out: &mut W,
) -> Vec<(PathBuf, DecodeResult<PlaybackSummary>)>
where
    P: AsRef<Path>,
    S: FrameSink + ?Sized,
    A: Acknowledge + ?Sized,
    W: Write,
{
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let result = Recording::open(path).and_then(|rec| play(rec, sink, ack, out));
            if let Err(e) = &result {
                tracing::error!("{}: {e}", path.display());
            }
            (path.to_path_buf(), result)
        })
        .collect()
}
