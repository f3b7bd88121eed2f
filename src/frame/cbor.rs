#![cfg(feature = "cbor")]

use crate::{
    FrameConfig, VfsError, VfsdCode,
    frame::{FramedReader, FramedWriter},
};
use std::io::{Read, Write};
use {
    serde::{Serialize, de::DeserializeOwned},
};

pub struct FramedCborWriter<W: Write> {
    inner: FramedWriter<W>,
}

impl<W: Write> FramedCborWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner: FramedWriter::new(inner) }
    }

    pub fn send<T: Serialize>(&mut self, value: &T) -> Result<(), VfsError> {
        let encoded = ::serde_cbor::to_vec(value)
            .map_err(|e| VfsError::cbor(VfsdCode::Encode, e))?;
        self.inner.write_frame(&encoded)?;
        self.inner.flush()
    }

    pub fn inner_mut(&mut self) -> &mut FramedWriter<W> { &mut self.inner }
}

pub struct FramedCborReader<R: Read> {
    inner: FramedReader<R>,
    buf: Vec<u8>,
}

impl<R: Read> FramedCborReader<R> {
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
        ::serde_cbor::from_slice(&self.buf)
            .map_err(|e| VfsError::cbor(VfsdCode::Decode, e))
    }

    pub fn inner_mut(&mut self) -> &mut FramedReader<R> { &mut self.inner }
}
