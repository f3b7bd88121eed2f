use std::{fmt, io};

use liaise::{Liaise, RegisterErrors};

use crate::ResultCode;

#[derive(RegisterErrors, Debug, Copy, Clone, PartialEq, Eq)]
#[error_prefix = "VFSD"]
pub enum VfsdCode {
    Io = 1,
    FrameTooLarge = 2,
    Encode = 3,
    Decode = 4,
    Internal = 5,
    Timeout = 6,
    Remote = 7,
    Precondition = 8,
    MalformedReply = 9,
}

impl Liaise for VfsdCode {
    fn code_id(self) -> u16 { self as u16 }

    fn message(self) -> &'static str {
        match self {
            Self::Io => "I/O error",
            Self::FrameTooLarge => "Frame too large",
            Self::Encode => "Message encode failed",
            Self::Decode => "Message decode failed",
            Self::Internal => "Daemon connection failed",
            Self::Timeout => "Daemon did not reply in time",
            Self::Remote => "Daemon reported failure",
            Self::Precondition => "Precondition violated",
            Self::MalformedReply => "Malformed reply",
        }
    }
}

/// Concrete runtime error type for the crate.
///
/// Daemon-reported failures carry the verbatim [`ResultCode`] in `remote`;
/// everything else is classified by `code`.
#[derive(Debug)]
pub struct VfsError {
    pub code: VfsdCode,
    pub ctx: Option<String>,
    pub remote: Option<ResultCode>,
    pub source: Option<VfsSource>,
}

#[derive(Debug)]
pub enum VfsSource {
    Io(io::Error),
    Postcard(postcard::Error),
    #[cfg(feature = "cbor")]
    Cbor(serde_cbor::Error),
}

pub type VfsResult<T> = Result<T, VfsError>;

impl VfsError {
    #[inline]
    pub fn new(code: VfsdCode) -> Self {
        Self { code, ctx: None, remote: None, source: None }
    }

    #[inline]
    pub fn ctx(mut self, ctx: impl fmt::Display) -> Self {
        self.ctx = Some(ctx.to_string());
        self
    }

    /// Classifies a transport I/O error: stalled reads are timeouts, a
    /// vanished peer is an internal (connection) failure.
    pub fn io(err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => VfsdCode::Timeout,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::NotFound => VfsdCode::Internal,
            _ => VfsdCode::Io,
        };
        Self {
            code,
            ctx: Some(err.to_string()),
            remote: None,
            source: Some(VfsSource::Io(err)),
        }
    }

    #[inline]
    pub fn internal(ctx: impl fmt::Display) -> Self {
        Self::new(VfsdCode::Internal).ctx(ctx)
    }

    #[inline]
    pub fn disconnected() -> Self {
        Self::internal("connection closed by peer")
    }

    #[inline]
    pub fn timeout(method: &str) -> Self {
        Self::new(VfsdCode::Timeout).ctx(format_args!("no reply to {method}"))
    }

    #[inline]
    pub fn remote(result: ResultCode) -> Self {
        Self {
            code: VfsdCode::Remote,
            ctx: Some(result.to_string()),
            remote: Some(result),
            source: None,
        }
    }

    #[inline]
    pub fn precondition(ctx: impl fmt::Display) -> Self {
        Self::new(VfsdCode::Precondition).ctx(ctx)
    }

    #[inline]
    pub fn malformed(ctx: impl fmt::Display) -> Self {
        Self::new(VfsdCode::MalformedReply).ctx(ctx)
    }

    #[inline]
    pub fn frame_too_large(len: usize, max: usize) -> Self {
        Self::new(VfsdCode::FrameTooLarge).ctx(format_args!("len {len} exceeds max {max}"))
    }

    #[inline]
    pub fn postcard_encode(err: postcard::Error) -> Self {
        Self {
            code: VfsdCode::Encode,
            ctx: Some(err.to_string()),
            remote: None,
            source: Some(VfsSource::Postcard(err)),
        }
    }

    #[inline]
    pub fn postcard_decode(err: postcard::Error) -> Self {
        Self {
            code: VfsdCode::Decode,
            ctx: Some(err.to_string()),
            remote: None,
            source: Some(VfsSource::Postcard(err)),
        }
    }

    #[cfg(feature = "cbor")]
    #[inline]
    pub fn cbor(code: VfsdCode, err: serde_cbor::Error) -> Self {
        Self {
            code,
            ctx: Some(err.to_string()),
            remote: None,
            source: Some(VfsSource::Cbor(err)),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.code == VfsdCode::Timeout
    }

    /// True for failures of the channel itself (as opposed to the daemon
    /// answering with a failure code).
    pub fn is_transport(&self) -> bool {
        matches!(
            self.code,
            VfsdCode::Io
                | VfsdCode::Internal
                | VfsdCode::FrameTooLarge
                | VfsdCode::Encode
                | VfsdCode::Decode
        )
    }

    /// Projects the error into the daemon's result-code space.
    ///
    /// Returns `None` for local programmer errors (closed handles, malformed
    /// replies), which have no remote counterpart.
    pub fn result_code(&self) -> Option<ResultCode> {
        match self.code {
            VfsdCode::Remote => self.remote,
            VfsdCode::Timeout => Some(ResultCode::TIMEOUT),
            VfsdCode::Precondition | VfsdCode::MalformedReply => None,
            _ => Some(ResultCode::INTERNAL),
        }
    }
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // "[VFSD0007] Daemon reported failure: File exists"
        let base = self.code.render();
        match &self.ctx {
            Some(ctx) => write!(f, "{base}: {ctx}"),
            None => write!(f, "{base}"),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.source {
            Some(VfsSource::Io(e)) => Some(e),
            Some(VfsSource::Postcard(e)) => Some(e),
            #[cfg(feature = "cbor")]
            Some(VfsSource::Cbor(e)) => Some(e),
            None => None,
        }
    }
}

impl From<io::Error> for VfsError {
    #[inline]
    fn from(e: io::Error) -> Self {
        VfsError::io(e)
    }
}
