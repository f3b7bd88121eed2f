use core::fmt;
use core::str::FromStr;

use bitflags::bitflags;

/// A location understood by the daemon, in canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri(String);

impl Uri {
    pub fn new(canonical: impl Into<String>) -> Self {
        Self(canonical.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Uri {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Self { Self::new(s) }
}

impl From<String> for Uri {
    fn from(s: String) -> Self { Self(s) }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenMode: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const RANDOM = 1 << 2;
        const TRUNCATE = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SeekPosition {
    Start = 0,
    Current = 1,
    End = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FindDirectoryKind {
    Desktop = 1000,
    Trash = 1001,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MonitorType {
    File = 0,
    Directory = 1,
}

/// Kind of change reported by a monitor signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEventType {
    Changed,
    Deleted,
    StartExecuting,
    StopExecuting,
    Created,
    MetadataChanged,
    Other(i32),
}

impl From<i32> for MonitorEventType {
    fn from(v: i32) -> Self {
        match v {
            0 => Self::Changed,
            1 => Self::Deleted,
            2 => Self::StartExecuting,
            3 => Self::StopExecuting,
            4 => Self::Created,
            5 => Self::MetadataChanged,
            other => Self::Other(other),
        }
    }
}

impl From<MonitorEventType> for i32 {
    fn from(v: MonitorEventType) -> Self {
        match v {
            MonitorEventType::Changed => 0,
            MonitorEventType::Deleted => 1,
            MonitorEventType::StartExecuting => 2,
            MonitorEventType::StopExecuting => 3,
            MonitorEventType::Created => 4,
            MonitorEventType::MetadataChanged => 5,
            MonitorEventType::Other(v) => v,
        }
    }
}

/// Limits applied when reading length-prefixed frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameConfig {
    pub max_frame_len: usize,

    /// If the peer claims an oversize frame, only drain it if len <= drain_oversize_up_to.
    /// 0 = never drain oversize (recommended default).
    pub drain_oversize_up_to: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            // Read/Write payloads travel in a single frame.
            max_frame_len: 16 * 1024 * 1024,
            drain_oversize_up_to: 0,
        }
    }
}

/// Serialization used inside frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Postcard,
    #[cfg(feature = "cbor")]
    Cbor,
}
