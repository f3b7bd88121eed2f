//! Wrappers around daemon-assigned handle ids.
//!
//! A handle belongs to the thread that opened it, like the private
//! connection its id is scoped to, so neither wrapper is `Send`. Each one
//! also remembers that connection's generation: once the connection is
//! lost the id means nothing, and every call on the handle is refused
//! locally with `Precondition`.

use std::collections::VecDeque;
use std::marker::PhantomData;

use tracing::debug;

use crate::executor::{CallTimeout, Executor};
use crate::wire::{Arg, method};
use crate::{
    Cancellation, FileInfo, FileInfoOptions, OpenMode, ResultCode, SeekPosition, Uri, VfsError, VfsResult,
};

type NotSend = PhantomData<*const ()>;

/// One open file on the daemon.
#[derive(Debug)]
pub struct FileHandle {
    id: i32,
    conn: u64,
    open: bool,
    _thread: NotSend,
}

impl FileHandle {
    fn wrap(id: i32, conn: u64) -> Self {
        Self { id, conn, open: true, _thread: PhantomData }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn live_id(&self) -> VfsResult<i32> {
        if self.open {
            Ok(self.id)
        } else {
            Err(VfsError::precondition(format_args!("file handle {} is closed", self.id)))
        }
    }

    pub(crate) fn open(exec: &Executor, uri: &Uri, mode: OpenMode, cancel: Option<&Cancellation>) -> VfsResult<Self> {
        let args = vec![Arg::from(uri), Arg::Int32(mode.bits() as i32)];
        let reply = exec.execute(method::OPEN, args, cancel, CallTimeout::Long)?;
        let conn = reply.generation();
        let id = reply.check()?.next_i32()?;
        debug!(id, %uri, "file opened");
        Ok(Self::wrap(id, conn))
    }

    pub(crate) fn create(
        exec: &Executor,
        uri: &Uri,
        mode: OpenMode,
        exclusive: bool,
        perm: u32,
        cancel: Option<&Cancellation>,
    ) -> VfsResult<Self> {
        let args = vec![
            Arg::from(uri),
            Arg::Int32(mode.bits() as i32),
            Arg::Bool(exclusive),
            Arg::Int32(perm as i32),
        ];
        let reply = exec.execute(method::CREATE, args, cancel, CallTimeout::Default)?;
        let conn = reply.generation();
        let id = reply.check()?.next_i32()?;
        debug!(id, %uri, "file created");
        Ok(Self::wrap(id, conn))
    }

    /// On success the handle is spent; on failure it stays usable.
    pub(crate) fn close(&mut self, exec: &Executor, cancel: Option<&Cancellation>) -> VfsResult<()> {
        let id = self.live_id()?;
        exec.call_on(self.conn, method::CLOSE, vec![Arg::Int32(id)], cancel, CallTimeout::Long)?;
        self.open = false;
        Ok(())
    }

    /// Fills the front of `buf`; returns how many bytes arrived.
    pub(crate) fn read(&mut self, exec: &Executor, buf: &mut [u8], cancel: Option<&Cancellation>) -> VfsResult<usize> {
        let id = self.live_id()?;
        let args = vec![Arg::Int32(id), Arg::UInt64(buf.len() as u64)];
        let data = exec.call_on(self.conn, method::READ, args, cancel, CallTimeout::Default)?.next_bytes()?;
        let Some(dst) = buf.get_mut(..data.len()) else {
            return Err(VfsError::malformed(format_args!(
                "read returned {} bytes for a {} byte request",
                data.len(),
                buf.len()
            )));
        };
        dst.copy_from_slice(&data);
        Ok(data.len())
    }

    /// Returns the count the daemon reports, which may be short.
    pub(crate) fn write(&mut self, exec: &Executor, data: &[u8], cancel: Option<&Cancellation>) -> VfsResult<u64> {
        let id = self.live_id()?;
        let args = vec![Arg::Int32(id), Arg::from(data)];
        exec.call_on(self.conn, method::WRITE, args, cancel, CallTimeout::Default)?.next_u64()
    }

    pub(crate) fn seek(
        &mut self,
        exec: &Executor,
        whence: SeekPosition,
        offset: i64,
        cancel: Option<&Cancellation>,
    ) -> VfsResult<()> {
        let id = self.live_id()?;
        let args = vec![Arg::Int32(id), Arg::Int32(whence as i32), Arg::Int64(offset)];
        exec.call_on(self.conn, method::SEEK, args, cancel, CallTimeout::Default)?;
        Ok(())
    }

    pub(crate) fn tell(&self, exec: &Executor) -> VfsResult<i64> {
        let id = self.live_id()?;
        exec.call_on(self.conn, method::TELL, vec![Arg::Int32(id)], None, CallTimeout::Default)?.next_i64()
    }

    pub(crate) fn truncate(&mut self, exec: &Executor, length: u64, cancel: Option<&Cancellation>) -> VfsResult<()> {
        let id = self.live_id()?;
        let args = vec![Arg::Int32(id), Arg::UInt64(length)];
        exec.call_on(self.conn, method::TRUNCATE_HANDLE, args, cancel, CallTimeout::Default)?;
        Ok(())
    }

    pub(crate) fn file_info(
        &self,
        exec: &Executor,
        options: FileInfoOptions,
        cancel: Option<&Cancellation>,
    ) -> VfsResult<FileInfo> {
        let id = self.live_id()?;
        let args = vec![Arg::Int32(id), Arg::Int32(options.bits() as i32)];
        exec.call_on(self.conn, method::GET_FILE_INFO_FROM_HANDLE, args, cancel, CallTimeout::Default)?
            .next_file_info()
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.open {
            debug!(id = self.id, "file handle dropped while open; daemon keeps it until disconnect");
        }
    }
}

/// One open directory enumeration, with the current chunk of entries.
#[derive(Debug)]
pub struct DirectoryHandle {
    id: i32,
    conn: u64,
    open: bool,
    chunk: VecDeque<FileInfo>,
    finished: bool,
    _thread: NotSend,
}

impl DirectoryHandle {
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// True once the daemon signalled the end; buffered entries may remain.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn live_id(&self) -> VfsResult<i32> {
        if self.open {
            Ok(self.id)
        } else {
            Err(VfsError::precondition(format_args!("directory handle {} is closed", self.id)))
        }
    }

    pub(crate) fn open(
        exec: &Executor,
        uri: &Uri,
        options: FileInfoOptions,
        cancel: Option<&Cancellation>,
    ) -> VfsResult<Self> {
        let args = vec![Arg::from(uri), Arg::Int32(options.bits() as i32)];
        let reply = exec.execute(method::OPEN_DIRECTORY, args, cancel, CallTimeout::Default)?;
        let conn = reply.generation();
        let id = reply.check()?.next_i32()?;
        debug!(id, %uri, "directory opened");
        Ok(Self { id, conn, open: true, chunk: VecDeque::new(), finished: false, _thread: PhantomData })
    }

    /// Next entry, or an `EOF` error once the listing is exhausted. After
    /// that every call answers `EOF` without asking the daemon again.
    pub(crate) fn read_next(&mut self, exec: &Executor, cancel: Option<&Cancellation>) -> VfsResult<FileInfo> {
        let id = self.live_id()?;
        if self.chunk.is_empty() && !self.finished {
            self.refill(exec, id, cancel)?;
        }
        self.chunk.pop_front().ok_or_else(|| VfsError::remote(ResultCode::EOF))
    }

    fn refill(&mut self, exec: &Executor, id: i32, cancel: Option<&Cancellation>) -> VfsResult<()> {
        let (result, mut fields) = exec
            .execute_on(
                self.conn,
                method::READ_DIRECTORY,
                vec![Arg::Int32(id)],
                cancel,
                CallTimeout::Default,
            )?
            .split();
        let entries = if result.is_ok() {
            fields.next_file_info_list()?
        } else if result == ResultCode::EOF {
            // A final chunk may ride along with the EOF code.
            self.finished = true;
            match fields.remaining() {
                0 => Vec::new(),
                _ => fields.next_file_info_list()?,
            }
        } else {
            return Err(VfsError::remote(result));
        };

        if entries.is_empty() {
            self.finished = true;
        }
        debug!(id, count = entries.len(), finished = self.finished, "directory chunk");
        self.chunk.extend(entries);
        Ok(())
    }

    pub(crate) fn close(&mut self, exec: &Executor, cancel: Option<&Cancellation>) -> VfsResult<()> {
        let id = self.live_id()?;
        exec.call_on(self.conn, method::CLOSE_DIRECTORY, vec![Arg::Int32(id)], cancel, CallTimeout::Default)?;
        self.open = false;
        self.chunk.clear();
        Ok(())
    }
}

impl Drop for DirectoryHandle {
    fn drop(&mut self) {
        if self.open {
            debug!(id = self.id, "directory handle dropped while open");
        }
    }
}
