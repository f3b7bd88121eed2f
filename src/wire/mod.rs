//! Messages exchanged with the daemon and the typed arguments they carry.
//!
//! Every call is a method name plus an ordered list of [`Arg`]s. Every reply
//! to a VFS operation leads with an `Int32` result code followed by
//! operation-specific fields; [`ReplyCursor`] walks those fields in order.

mod file_info;

pub use file_info::{WireFileInfo, escape_path, unescape};

use serde::{Deserialize, Serialize};

use crate::{FileInfo, Uri, VfsError, VfsResult};

/// Daemon method and signal names.
pub mod method {
    pub const GET_CONNECTION: &str = "GetConnection";
    pub const CANCEL: &str = "Cancel";
    pub const OPEN: &str = "Open";
    pub const CREATE: &str = "Create";
    pub const CLOSE: &str = "Close";
    pub const READ: &str = "Read";
    pub const WRITE: &str = "Write";
    pub const SEEK: &str = "Seek";
    pub const TELL: &str = "Tell";
    pub const TRUNCATE_HANDLE: &str = "TruncateHandle";
    pub const OPEN_DIRECTORY: &str = "OpenDirectory";
    pub const CLOSE_DIRECTORY: &str = "CloseDirectory";
    pub const READ_DIRECTORY: &str = "ReadDirectory";
    pub const GET_FILE_INFO: &str = "GetFileInfo";
    pub const GET_FILE_INFO_FROM_HANDLE: &str = "GetFileInfoFromHandle";
    pub const IS_LOCAL: &str = "IsLocal";
    pub const MAKE_DIRECTORY: &str = "MakeDirectory";
    pub const REMOVE_DIRECTORY: &str = "RemoveDirectory";
    pub const MOVE: &str = "Move";
    pub const UNLINK: &str = "Unlink";
    pub const CHECK_SAME_FS: &str = "CheckSameFileSystem";
    pub const SET_FILE_INFO: &str = "SetFileInfo";
    pub const TRUNCATE: &str = "Truncate";
    pub const FIND_DIRECTORY: &str = "FindDirectory";
    pub const CREATE_SYMBOLIC_LINK: &str = "CreateSymbolicLink";
    pub const MONITOR_ADD: &str = "MonitorAdd";
    pub const MONITOR_CANCEL: &str = "MonitorCancel";
    pub const GET_VOLUME_FREE_SPACE: &str = "GetVolumeFreeSpace";

    /// Inbound: daemon asks the client to run a callback.
    pub const CALLBACK: &str = "Callback";
    /// Inbound signal on the shared connection: `(id, uri, event_type)`.
    pub const MONITOR_SIGNAL: &str = "MonitorSignal";
}

/// One typed argument or reply field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Str(String),
    Int32(i32),
    Int64(i64),
    UInt64(u64),
    Bool(bool),
    Bytes(Vec<u8>),
    Uri(String),
    FileInfo(WireFileInfo),
    FileInfoList(Vec<WireFileInfo>),
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self { Arg::Str(v.to_owned()) }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self { Arg::Int32(v) }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self { Arg::Int64(v) }
}

impl From<u64> for Arg {
    fn from(v: u64) -> Self { Arg::UInt64(v) }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self { Arg::Bool(v) }
}

impl From<&[u8]> for Arg {
    fn from(v: &[u8]) -> Self { Arg::Bytes(v.to_vec()) }
}

impl From<&Uri> for Arg {
    fn from(v: &Uri) -> Self { Arg::Uri(v.as_str().to_owned()) }
}

impl From<&FileInfo> for Arg {
    fn from(v: &FileInfo) -> Self { Arg::FileInfo(v.into()) }
}

impl Arg {
    fn kind(&self) -> &'static str {
        match self {
            Arg::Str(_) => "string",
            Arg::Int32(_) => "int32",
            Arg::Int64(_) => "int64",
            Arg::UInt64(_) => "uint64",
            Arg::Bool(_) => "bool",
            Arg::Bytes(_) => "bytes",
            Arg::Uri(_) => "uri",
            Arg::FileInfo(_) => "file info",
            Arg::FileInfoList(_) => "file info list",
        }
    }
}

/// A unit on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Call {
        serial: u32,
        method: String,
        args: Vec<Arg>,
        no_reply: bool,
    },
    Reply {
        reply_to: u32,
        args: Vec<Arg>,
    },
    /// Transport-level failure to handle a call (unknown method, bad shape).
    Error {
        reply_to: u32,
        name: String,
        message: String,
    },
    Signal {
        member: String,
        args: Vec<Arg>,
    },
}

impl Message {
    pub fn call(serial: u32, method: &str, args: Vec<Arg>) -> Self {
        Message::Call { serial, method: method.to_owned(), args, no_reply: false }
    }

    /// Fire-and-forget call; the peer sends nothing back.
    pub fn notify(method: &str, args: Vec<Arg>) -> Self {
        Message::Call { serial: 0, method: method.to_owned(), args, no_reply: true }
    }

    pub fn reply(reply_to: u32, args: Vec<Arg>) -> Self {
        Message::Reply { reply_to, args }
    }

    pub fn error(reply_to: u32, name: &str, message: impl Into<String>) -> Self {
        Message::Error { reply_to, name: name.to_owned(), message: message.into() }
    }

    pub fn signal(member: &str, args: Vec<Arg>) -> Self {
        Message::Signal { member: member.to_owned(), args }
    }
}

/// Reads reply fields in order, failing loudly on any shape mismatch.
#[derive(Debug)]
pub struct ReplyCursor {
    fields: std::vec::IntoIter<Arg>,
    pos: usize,
}

macro_rules! cursor_getter {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&mut self) -> VfsResult<$ty> {
            match self.next_arg()? {
                Arg::$variant(v) => Ok(v),
                other => Err(self.mismatch(stringify!($variant), &other)),
            }
        }
    };
}

impl ReplyCursor {
    pub fn new(fields: Vec<Arg>) -> Self {
        Self { fields: fields.into_iter(), pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.fields.len()
    }

    fn next_arg(&mut self) -> VfsResult<Arg> {
        let pos = self.pos;
        self.pos += 1;
        self.fields
            .next()
            .ok_or_else(|| VfsError::malformed(format_args!("reply ends before field {pos}")))
    }

    fn mismatch(&self, wanted: &str, got: &Arg) -> VfsError {
        VfsError::malformed(format_args!(
            "field {} is {}, expected {wanted}",
            self.pos - 1,
            got.kind()
        ))
    }

    cursor_getter!(next_i32, Int32, i32);
    cursor_getter!(next_i64, Int64, i64);
    cursor_getter!(next_u64, UInt64, u64);
    cursor_getter!(next_bool, Bool, bool);
    cursor_getter!(next_bytes, Bytes, Vec<u8>);

    /// Plain strings; URIs are accepted since both travel as canonical text.
    pub fn next_str(&mut self) -> VfsResult<String> {
        match self.next_arg()? {
            Arg::Str(s) | Arg::Uri(s) => Ok(s),
            other => Err(self.mismatch("string", &other)),
        }
    }

    pub fn next_uri(&mut self) -> VfsResult<Uri> {
        self.next_str().map(Uri::new)
    }

    pub fn next_file_info(&mut self) -> VfsResult<FileInfo> {
        match self.next_arg()? {
            Arg::FileInfo(w) => FileInfo::try_from(w),
            other => Err(self.mismatch("file info", &other)),
        }
    }

    /// A length-prefixed run of FileInfo tuples. Zero entries is valid.
    pub fn next_file_info_list(&mut self) -> VfsResult<Vec<FileInfo>> {
        match self.next_arg()? {
            Arg::FileInfoList(list) => list.into_iter().map(FileInfo::try_from).collect(),
            other => Err(self.mismatch("file info list", &other)),
        }
    }
}
