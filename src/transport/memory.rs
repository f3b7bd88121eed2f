//! In-process channels.
//!
//! A [`MemoryConnector`] hands each new channel's far end to the paired
//! [`MemoryListener`], tagged with the address it was opened for, so a
//! daemon can live in the same process (tests, embedding).

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::{Connector, Duplex, MessageSink, MessageSource, VfsError, VfsResult, wire::Message};

/// Address reported for channels opened through `connect_shared`.
pub const SHARED_ADDRESS: &str = "shared";

pub struct MemorySink {
    tx: Sender<Message>,
}

impl MessageSink for MemorySink {
    fn send(&mut self, msg: &Message) -> VfsResult<()> {
        self.tx.send(msg.clone()).map_err(|_| VfsError::disconnected())
    }
}

pub struct MemorySource {
    rx: Receiver<Message>,
}

impl MessageSource for MemorySource {
    fn recv(&mut self, timeout: Option<Duration>) -> VfsResult<Message> {
        match timeout {
            None => self.rx.recv().map_err(|_| VfsError::disconnected()),
            Some(t) => self.rx.recv_timeout(t).map_err(|e| match e {
                RecvTimeoutError::Timeout => VfsError::timeout("message"),
                RecvTimeoutError::Disconnected => VfsError::disconnected(),
            }),
        }
    }
}

/// Two connected channel ends.
pub fn pair() -> (Duplex, Duplex) {
    let (a_tx, a_rx) = mpsc::channel();
    let (b_tx, b_rx) = mpsc::channel();
    (
        Duplex::new(MemorySink { tx: a_tx }, MemorySource { rx: b_rx }),
        Duplex::new(MemorySink { tx: b_tx }, MemorySource { rx: a_rx }),
    )
}

/// Connected connector/listener pair.
pub fn endpoint() -> (MemoryConnector, MemoryListener) {
    let (tx, rx) = mpsc::channel();
    (MemoryConnector { accept: tx }, MemoryListener { incoming: rx })
}

/// Client side: every connect produces a fresh channel.
pub struct MemoryConnector {
    accept: Sender<(String, Duplex)>,
}

impl MemoryConnector {
    fn open(&self, address: &str) -> VfsResult<Duplex> {
        let (near, far) = pair();
        self.accept
            .send((address.to_owned(), far))
            .map_err(|_| VfsError::internal(format_args!("no listener for {address}")))?;
        Ok(near)
    }
}

impl Connector for MemoryConnector {
    fn connect_shared(&self) -> VfsResult<Duplex> {
        self.open(SHARED_ADDRESS)
    }

    fn connect_private(&self, address: &str) -> VfsResult<Duplex> {
        self.open(address)
    }
}

/// Daemon side: yields `(address, channel)` for each client connect.
pub struct MemoryListener {
    incoming: Receiver<(String, Duplex)>,
}

impl MemoryListener {
    /// Blocks for the next connection; `None` once every connector is gone.
    pub fn accept(&self) -> Option<(String, Duplex)> {
        self.incoming.recv().ok()
    }
}
