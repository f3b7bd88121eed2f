//! Length-prefixed framing for stream transports.
//!
//! Format: `<u32_le_len><frame_bytes...>`

use crate::{FrameConfig, VfsError};

use std::io::{Read, Write};

/// Number of bytes used for the length prefix.
pub const LEN_PREFIX: usize = 4;

/// A writer that frames messages with a u32 length prefix.
#[derive(Debug)]
pub struct FramedWriter<W: Write> {
    inner: W,
}

impl<W: Write> FramedWriter<W> {
    pub fn new(inner: W) -> Self { Self { inner } }

    pub fn into_inner(self) -> W { self.inner }
    pub fn inner_mut(&mut self) -> &mut W { &mut self.inner }

    /// Writes one frame with a single `write_all`, so a frame is never
    /// interleaved with another writer's bytes on a shared socket.
    /// Does NOT flush (caller controls flushing).
    pub fn write_frame(&mut self, bytes: &[u8]) -> Result<(), VfsError> {
        let len: u32 = bytes
            .len()
            .try_into()
            .map_err(|_| VfsError::frame_too_large(bytes.len(), u32::MAX as usize))?;

        let mut framed = Vec::with_capacity(LEN_PREFIX + bytes.len());
        framed.extend_from_slice(&len.to_le_bytes());
        framed.extend_from_slice(bytes);
        self.inner.write_all(&framed)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), VfsError> {
        self.inner.flush()?;
        Ok(())
    }
}

/// A reader that consumes length-prefixed frames.
#[derive(Debug)]
pub struct FramedReader<R: Read> {
    inner: R,
    cfg: FrameConfig,
}

impl<R: Read> FramedReader<R> {
    pub fn new(inner: R) -> Self { Self::with_config(inner, FrameConfig::default()) }
    pub fn with_max(inner: R, max_frame_len: usize) -> Self {
        Self::with_config(inner, FrameConfig { max_frame_len, ..Default::default() })
    }
    pub fn with_config(inner: R, cfg: FrameConfig) -> Self { Self { inner, cfg } }

    pub fn into_inner(self) -> R { self.inner }
    pub fn inner_mut(&mut self) -> &mut R { &mut self.inner }
    pub fn config(&self) -> FrameConfig { self.cfg }

    fn drain_exact(&mut self, len: usize) -> Result<(), VfsError> {
        let mut sink = std::io::sink();
        std::io::copy(&mut self.inner.by_ref().take(len as u64), &mut sink)?;
        Ok(())
    }

    fn read_len(&mut self) -> Result<usize, VfsError> {
        let mut len_buf = [0u8; LEN_PREFIX];
        self.inner.read_exact(&mut len_buf)?;
        Ok(u32::from_le_bytes(len_buf) as usize)
    }

    /// Reads the next frame into `dst`, resizing it exactly to the frame length.
    pub fn recv_into(&mut self, dst: &mut Vec<u8>) -> Result<(), VfsError> {
        let len = self.read_len()?;

        if len > self.cfg.max_frame_len {
            if self.cfg.drain_oversize_up_to != 0 && len <= self.cfg.drain_oversize_up_to {
                self.drain_exact(len)?;
            }
            return Err(VfsError::frame_too_large(len, self.cfg.max_frame_len));
        }

        dst.clear();
        dst.resize(len, 0u8);
        self.inner.read_exact(dst)?;
        Ok(())
    }
}

pub mod cbor;
pub mod postcard;
