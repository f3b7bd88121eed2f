//! FileInfo tuple shape and the path escaping used for names.

use serde::{Deserialize, Serialize};

use crate::{FileFlags, FileInfo, FileInfoFields, VfsError, VfsResult};

/// FileInfo as it travels: a fixed-order tuple. Absent optional strings are
/// sent as the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFileInfo(
    pub u32,    // valid fields
    pub String, // escaped name
    pub i32,    // type
    pub u32,    // permissions
    pub u32,    // flags
    pub u64,    // device
    pub u64,    // inode
    pub u32,    // link count
    pub u32,    // uid
    pub u32,    // gid
    pub u64,    // size
    pub u64,    // block count
    pub i64,    // atime
    pub i64,    // mtime
    pub i64,    // ctime
    pub String, // escaped symlink target, "" when absent
    pub String, // mime type, "" when absent
);

impl From<&FileInfo> for WireFileInfo {
    fn from(info: &FileInfo) -> Self {
        WireFileInfo(
            info.valid_fields.bits(),
            escape_path(&info.name),
            info.file_type.into(),
            info.permissions,
            info.flags.bits(),
            info.device,
            info.inode,
            info.link_count,
            info.uid,
            info.gid,
            info.size,
            info.block_count,
            info.atime,
            info.mtime,
            info.ctime,
            info.symlink_name.as_deref().map(escape_path).unwrap_or_default(),
            info.mime_type.clone().unwrap_or_default(),
        )
    }
}

impl TryFrom<WireFileInfo> for FileInfo {
    type Error = VfsError;

    fn try_from(w: WireFileInfo) -> VfsResult<Self> {
        let symlink_name = match w.15.as_str() {
            "" => None,
            s => Some(unescape(s)?),
        };
        let mime_type = Some(w.16).filter(|s| !s.is_empty());

        Ok(FileInfo {
            valid_fields: FileInfoFields::from_bits_retain(w.0),
            name: unescape(&w.1)?,
            file_type: w.2.into(),
            permissions: w.3,
            flags: FileFlags::from_bits_retain(w.4),
            device: w.5,
            inode: w.6,
            link_count: w.7,
            uid: w.8,
            gid: w.9,
            size: w.10,
            block_count: w.11,
            atime: w.12,
            mtime: w.13,
            ctime: w.14,
            symlink_name,
            mime_type,
        })
    }
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

fn is_path_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!$&'()*+,-./:;=@_~".contains(&b)
}

/// Percent-escapes every byte that is not path-safe ASCII.
pub fn escape_path(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    for &b in raw {
        if is_path_safe(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0f) as usize] as char);
        }
    }
    out
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Reverses [`escape_path`]. Truncated or non-hex escapes are rejected.
pub fn unescape(escaped: &str) -> VfsResult<Vec<u8>> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = bytes.get(i + 1).copied().and_then(hex_value);
            let lo = bytes.get(i + 2).copied().and_then(hex_value);
            match (hi, lo) {
                (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
                _ => return Err(VfsError::malformed(format_args!("bad escape in {escaped:?}"))),
            }
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}
