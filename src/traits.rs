use std::time::Duration;

use crate::{VfsResult, wire::{Arg, Message}};

/// Outbound half of a message channel.
pub trait MessageSink: Send {
    fn send(&mut self, msg: &Message) -> VfsResult<()>;

    /// Tears the channel down for both directions, waking any reader.
    fn close(&mut self) -> VfsResult<()> {
        Ok(())
    }
}

/// Inbound half of a message channel.
///
/// `timeout: None` blocks until a message arrives or the peer goes away.
/// An elapsed timeout is reported as a `Timeout` error, a vanished peer as
/// `Internal`.
pub trait MessageSource: Send {
    fn recv(&mut self, timeout: Option<Duration>) -> VfsResult<Message>;
}

/// Both halves of one point-to-point channel.
pub struct Duplex {
    pub sink: Box<dyn MessageSink>,
    pub source: Box<dyn MessageSource>,
}

impl Duplex {
    pub fn new(sink: impl MessageSink + 'static, source: impl MessageSource + 'static) -> Self {
        Self { sink: Box::new(sink), source: Box::new(source) }
    }
}

/// Opens channels to the daemon.
pub trait Connector: Send + Sync {
    /// The shared channel: bootstrap and monitor traffic, inbound signals.
    fn connect_shared(&self) -> VfsResult<Duplex>;

    /// An exclusive channel to an address handed out by bootstrap.
    fn connect_private(&self, address: &str) -> VfsResult<Duplex>;
}

/// Answers daemon-initiated callback requests (authentication prompts and
/// the like) that arrive while an operation is in flight.
///
/// `invoke` runs on the calling thread while its private connection is
/// busy, so client operations issued from it fail with `Precondition`.
pub trait CallbackHandler: Send + Sync {
    fn invoke(&self, callback: &str, args: &[Arg]) -> VfsResult<Vec<Arg>>;
}
