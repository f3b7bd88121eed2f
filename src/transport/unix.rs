//! Unix-domain-socket channels carrying framed, serde-encoded messages.

use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

#[cfg(feature = "cbor")]
use crate::frame::cbor::{FramedCborReader, FramedCborWriter};
use crate::frame::postcard::{FramedPostcardReader, FramedPostcardWriter};
use crate::{
    ClientConfig, Codec, Connector, Duplex, FrameConfig, MessageSink, MessageSource, VfsError,
    VfsResult, VfsdCode, wire::Message,
};

enum Encoder {
    Postcard(FramedPostcardWriter<UnixStream>),
    #[cfg(feature = "cbor")]
    Cbor(FramedCborWriter<UnixStream>),
}

enum Decoder {
    Postcard(FramedPostcardReader<UnixStream>),
    #[cfg(feature = "cbor")]
    Cbor(FramedCborReader<UnixStream>),
}

pub struct UnixSink {
    enc: Encoder,
}

impl MessageSink for UnixSink {
    fn send(&mut self, msg: &Message) -> VfsResult<()> {
        match &mut self.enc {
            Encoder::Postcard(w) => w.send(msg),
            #[cfg(feature = "cbor")]
            Encoder::Cbor(w) => w.send(msg),
        }
    }

    fn close(&mut self) -> VfsResult<()> {
        let stream = match &mut self.enc {
            Encoder::Postcard(w) => w.inner_mut().inner_mut(),
            #[cfg(feature = "cbor")]
            Encoder::Cbor(w) => w.inner_mut().inner_mut(),
        };
        match stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != std::io::ErrorKind::NotConnected => Err(e.into()),
            _ => Ok(()),
        }
    }
}

pub struct UnixSource {
    // Separate handle so the timeout can be set while the decoder owns the stream.
    control: UnixStream,
    dec: Decoder,
}

impl MessageSource for UnixSource {
    fn recv(&mut self, timeout: Option<Duration>) -> VfsResult<Message> {
        if timeout.is_some_and(|t| t.is_zero()) {
            return Err(VfsError::new(VfsdCode::Timeout).ctx("deadline already passed"));
        }
        self.control.set_read_timeout(timeout)?;
        match &mut self.dec {
            Decoder::Postcard(r) => r.recv(),
            #[cfg(feature = "cbor")]
            Decoder::Cbor(r) => r.recv(),
        }
    }
}

/// Wraps connected streams; used by the client connector and by daemons
/// serving accepted connections.
pub struct UnixChannel;

impl UnixChannel {
    pub fn from_stream(stream: UnixStream, codec: Codec, frame: FrameConfig) -> VfsResult<Duplex> {
        let read_half = stream.try_clone()?;
        let control = stream.try_clone()?;

        let (enc, dec) = match codec {
            Codec::Postcard => (
                Encoder::Postcard(FramedPostcardWriter::new(stream)),
                Decoder::Postcard(FramedPostcardReader::with_config(read_half, frame)),
            ),
            #[cfg(feature = "cbor")]
            Codec::Cbor => (
                Encoder::Cbor(FramedCborWriter::new(stream)),
                Decoder::Cbor(FramedCborReader::with_config(read_half, frame)),
            ),
        };

        Ok(Duplex::new(UnixSink { enc }, UnixSource { control, dec }))
    }

    pub fn connect(path: impl AsRef<Path>, codec: Codec, frame: FrameConfig) -> VfsResult<Duplex> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| {
            let ctx = format!("connect {}: {e}", path.display());
            VfsError::io(e).ctx(ctx)
        })?;
        debug!(path = %path.display(), "connected to daemon socket");
        Self::from_stream(stream, codec, frame)
    }
}

/// Connects to the daemon's well-known socket; bootstrap addresses are
/// socket paths.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    socket_path: PathBuf,
    codec: Codec,
    frame: FrameConfig,
}

impl UnixConnector {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            codec: config.codec,
            frame: config.frame,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Connector for UnixConnector {
    fn connect_shared(&self) -> VfsResult<Duplex> {
        UnixChannel::connect(&self.socket_path, self.codec, self.frame)
    }

    fn connect_private(&self, address: &str) -> VfsResult<Duplex> {
        UnixChannel::connect(address, self.codec, self.frame)
    }
}
