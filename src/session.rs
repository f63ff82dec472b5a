//! Recording session naming.
//!
//! Files of one session share `<prefix>_<unix_timestamp>` and are told
//! apart by `_<role>_<device>.<ext>`. Existing recordings are discovered by
//! this naming alone, so it must not change.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamRole {
    IntrinDepth,
    IntrinColor,
    Extrin,
    Depth,
    Color,
}

impl StreamRole {
    // Longest suffixes first: "intrin_depth" also ends in "depth".
    const PARSE_ORDER: [StreamRole; 5] = [
        StreamRole::IntrinDepth,
        StreamRole::IntrinColor,
        StreamRole::Extrin,
        StreamRole::Depth,
        StreamRole::Color,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StreamRole::IntrinDepth => "intrin_depth",
            StreamRole::IntrinColor => "intrin_color",
            StreamRole::Extrin => "extrin",
            StreamRole::Depth => "depth",
            StreamRole::Color => "color",
        }
    }

    pub fn kind(self) -> FileKind {
        match self {
            StreamRole::IntrinDepth | StreamRole::IntrinColor | StreamRole::Extrin => {
                FileKind::Metadata
            }
            StreamRole::Depth | StreamRole::Color => FileKind::Raw,
        }
    }
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata files are JSON, raw recordings are binary `.rec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Metadata,
    Raw,
}

impl FileKind {
    pub fn extension(self) -> &'static str {
        match self {
            FileKind::Metadata => "json",
            FileKind::Raw => "rec",
        }
    }
}

/// A recording session: name prefix plus capture-start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSession {
    pub prefix: String,
    pub timestamp: u64,
    pub dir: PathBuf,
}

impl RecordingSession {
    pub fn new(prefix: impl Into<String>, timestamp: u64, dir: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            timestamp,
            dir: dir.into(),
        }
    }

    /// Session stamped with the current wall-clock second.
    pub fn starting_now(prefix: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self::new(prefix, timestamp, dir)
    }

    pub fn file_name(&self, role: StreamRole, device_index: usize) -> String {
        RecordingFile {
            prefix: self.prefix.clone(),
            timestamp: self.timestamp,
            role,
            device_index,
        }
        .file_name()
    }

    pub fn path(&self, role: StreamRole, device_index: usize) -> PathBuf {
        self.dir.join(self.file_name(role, device_index))
    }
}

/// One file of a session, as encoded in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFile {
    pub prefix: String,
    pub timestamp: u64,
    pub role: StreamRole,
    pub device_index: usize,
}

impl RecordingFile {
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}.{}",
            self.prefix,
            self.timestamp,
            self.role,
            self.device_index,
            self.role.kind().extension()
        )
    }

    /// Parse a file name (or the file name part of a path).
    pub fn parse(path: impl AsRef<Path>) -> Option<Self> {
        let name = path.as_ref().file_name()?.to_str()?;
        let (stem, ext) = name.rsplit_once('.')?;
        let (rest, index) = stem.rsplit_once('_')?;
        let device_index = index.parse().ok()?;

        let role = StreamRole::PARSE_ORDER.into_iter().find(|role| {
            rest.strip_suffix(role.as_str())
                .is_some_and(|head| head.ends_with('_'))
        })?;
        if role.kind().extension() != ext {
            return None;
        }
        let rest = &rest[..rest.len() - role.as_str().len() - 1];
        let (prefix, timestamp) = rest.rsplit_once('_')?;
        let timestamp = timestamp.parse().ok()?;

        Some(Self {
            prefix: prefix.to_string(),
            timestamp,
            role,
            device_index,
        })
    }

    pub fn session(&self, dir: impl Into<PathBuf>) -> RecordingSession {
        RecordingSession::new(self.prefix.clone(), self.timestamp, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_follow_contract() {
        let session = RecordingSession::new("recording", 1_500_000_000, "/data");
        assert_eq!(
            session.file_name(StreamRole::IntrinDepth, 0),
            "recording_1500000000_intrin_depth_0.json"
        );
        assert_eq!(
            session.file_name(StreamRole::Extrin, 2),
            "recording_1500000000_extrin_2.json"
        );
        assert_eq!(
            session.path(StreamRole::Color, 1),
            PathBuf::from("/data/recording_1500000000_color_1.rec")
        );
    }

    #[test]
    fn parse_recovers_every_role() {
        let session = RecordingSession::new("lab_run_3", 42, ".");
        for role in StreamRole::PARSE_ORDER {
            let parsed = RecordingFile::parse(session.file_name(role, 7)).unwrap();
            assert_eq!(parsed.prefix, "lab_run_3");
            assert_eq!(parsed.timestamp, 42);
            assert_eq!(parsed.role, role);
            assert_eq!(parsed.device_index, 7);
        }
    }

    #[test]
    fn parse_rejects_foreign_names() {
        assert!(RecordingFile::parse("notes.txt").is_none());
        assert!(RecordingFile::parse("recording_42_depth_x.rec").is_none());
        assert!(RecordingFile::parse("recording_now_depth_0.rec").is_none());
        // metadata role with raw extension
        assert!(RecordingFile::parse("recording_42_extrin_0.rec").is_none());
        assert!(RecordingFile::parse("recording_42_color_0.json").is_none());
    }

    #[test]
    fn parse_accepts_full_paths() {
        let parsed = RecordingFile::parse("/tmp/out/rec_100_depth_1.rec").unwrap();
        assert_eq!(parsed.role, StreamRole::Depth);
        assert_eq!(
            parsed.session("/tmp/out").path(StreamRole::Color, 1),
            PathBuf::from("/tmp/out/rec_100_color_1.rec")
        );
    }
}
