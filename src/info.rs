//! Metadata record for one filesystem entry.

use std::borrow::Cow;

use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    #[default]
    Unknown,
    Regular,
    Directory,
    Fifo,
    Socket,
    CharacterDevice,
    BlockDevice,
    SymbolicLink,
}

impl From<i32> for FileType {
    fn from(v: i32) -> Self {
        match v {
            1 => Self::Regular,
            2 => Self::Directory,
            3 => Self::Fifo,
            4 => Self::Socket,
            5 => Self::CharacterDevice,
            6 => Self::BlockDevice,
            7 => Self::SymbolicLink,
            _ => Self::Unknown,
        }
    }
}

impl From<FileType> for i32 {
    fn from(v: FileType) -> Self {
        match v {
            FileType::Unknown => 0,
            FileType::Regular => 1,
            FileType::Directory => 2,
            FileType::Fifo => 3,
            FileType::Socket => 4,
            FileType::CharacterDevice => 5,
            FileType::BlockDevice => 6,
            FileType::SymbolicLink => 7,
        }
    }
}

bitflags! {
    /// Which [`FileInfo`] fields carry meaningful values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileInfoFields: u32 {
        const TYPE = 1 << 0;
        const PERMISSIONS = 1 << 1;
        const FLAGS = 1 << 2;
        const DEVICE = 1 << 3;
        const INODE = 1 << 4;
        const LINK_COUNT = 1 << 5;
        const SIZE = 1 << 6;
        const BLOCK_COUNT = 1 << 7;
        const IO_BLOCK_SIZE = 1 << 8;
        const ATIME = 1 << 9;
        const MTIME = 1 << 10;
        const CTIME = 1 << 11;
        const SYMLINK_NAME = 1 << 12;
        const MIME_TYPE = 1 << 13;
        const ACCESS = 1 << 14;
        const IDS = 1 << 15;
        const ACL = 1 << 16;
        const SELINUX_CONTEXT = 1 << 17;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileFlags: u32 {
        const SYMLINK = 1 << 0;
        const LOCAL = 1 << 1;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileInfoOptions: u32 {
        const GET_MIME_TYPE = 1 << 0;
        const FORCE_FAST_MIME_TYPE = 1 << 1;
        const FORCE_SLOW_MIME_TYPE = 1 << 2;
        const FOLLOW_LINKS = 1 << 3;
        const GET_ACCESS_RIGHTS = 1 << 4;
        const NAME_ONLY = 1 << 5;
        const GET_ACL = 1 << 6;
        const GET_SELINUX_CONTEXT = 1 << 7;
    }

    /// Fields SetFileInfo should apply.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SetFileInfoMask: u32 {
        const NAME = 1 << 0;
        const PERMISSIONS = 1 << 1;
        const OWNER = 1 << 2;
        const TIME = 1 << 3;
        const ACL = 1 << 4;
        const SELINUX_CONTEXT = 1 << 5;
        const SYMLINK_NAME = 1 << 6;
    }
}

/// Names and link targets are raw bytes; they are escaped on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileInfo {
    pub valid_fields: FileInfoFields,
    pub name: Vec<u8>,
    pub file_type: FileType,
    pub permissions: u32,
    pub flags: FileFlags,
    pub device: u64,
    pub inode: u64,
    pub link_count: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub block_count: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub symlink_name: Option<Vec<u8>>,
    pub mime_type: Option<String>,
}

impl FileInfo {
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn is_valid(&self, field: FileInfoFields) -> bool {
        self.valid_fields.contains(field)
    }

    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}
