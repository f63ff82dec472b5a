//! Raw `.rec` recordings: one header, then `{u32 timestamp, payload}` records.

pub mod reader;
pub mod writer;

pub use reader::{Frame, FrameImage, PixelLayout, Recording};
pub use writer::RecordingWriter;
