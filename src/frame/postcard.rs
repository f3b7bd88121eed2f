use std::io::{Read, Write};

use serde::{Serialize, de::DeserializeOwned};

use crate::{FrameConfig, VfsError, frame::{FramedReader, FramedWriter}};

pub struct FramedPostcardWriter<W: Write> {
    inner: FramedWriter<W>,
    buf: Vec<u8>,
}

impl<W: Write> FramedPostcardWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner: FramedWriter::new(inner), buf: Vec::new() }
    }

    /// Encodes `value` into one frame and flushes it.
    pub fn send<T: Serialize>(&mut self, value: &T) -> Result<(), VfsError> {
        self.buf.clear();

        let serialized = postcard::to_extend(value, std::mem::take(&mut self.buf))
            .map_err(VfsError::postcard_encode)?;

        // Keep the allocation for the next message.
        self.buf = serialized;

        self.inner.write_frame(&self.buf)?;
        self.inner.flush()
    }

    pub fn inner_mut(&mut self) -> &mut FramedWriter<W> { &mut self.inner }
}

pub struct FramedPostcardReader<R: Read> {
    inner: FramedReader<R>,
    buf: Vec<u8>,
}

impl<R: Read> FramedPostcardReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner: FramedReader::new(inner), buf: Vec::new() }
    }

    pub fn with_config(inner: R, cfg: FrameConfig) -> Self {
        Self::with_inner(FramedReader::with_config(inner, cfg))
    }

    pub fn with_inner(inner: FramedReader<R>) -> Self {
        Self { inner, buf: Vec::new() }
    }

    pub fn recv<T: DeserializeOwned>(&mut self) -> Result<T, VfsError> {
        self.inner.recv_into(&mut self.buf)?;
        postcard::from_bytes(&self.buf).map_err(VfsError::postcard_decode)
    }

    pub fn inner_mut(&mut self) -> &mut FramedReader<R> { &mut self.inner }
}
