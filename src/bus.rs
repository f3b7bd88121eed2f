//! The shared connection: bootstrap and monitor calls go out on it, and
//! monitor signals come in on it.
//!
//! Unlike private connections, it is used from many threads at once. A
//! dispatcher thread owns the receiving half and routes each reply to the
//! caller waiting on its serial.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::monitor::MonitorRegistry;
use crate::wire::{Arg, Message, ReplyCursor, method};
use crate::{Connector, MessageSink, MessageSource, MonitorEventType, Uri, VfsError, VfsResult};

#[derive(Default)]
struct Pending {
    waiters: Mutex<HashMap<u32, Sender<Message>>>,
    connected: AtomicBool,
}

pub struct SharedConnection {
    sink: Mutex<Box<dyn MessageSink>>,
    pending: Arc<Pending>,
    next_serial: AtomicU32,
    dispatcher: ThreadId,
}

impl SharedConnection {
    /// Connects and starts the dispatcher. Signals are delivered to
    /// `monitors` until the channel closes.
    pub fn open(connector: &dyn Connector, monitors: Arc<MonitorRegistry>) -> VfsResult<Arc<Self>> {
        let duplex = connector.connect_shared()?;
        let pending = Arc::new(Pending::default());
        pending.connected.store(true, Ordering::SeqCst);

        let dispatcher = Dispatcher { source: duplex.source, pending: pending.clone(), monitors };
        let thread = thread::Builder::new()
            .name("vfsd-shared".into())
            .spawn(move || dispatcher.run())?;
        debug!("shared connection open");

        Ok(Arc::new(Self {
            sink: Mutex::new(duplex.sink),
            pending,
            next_serial: AtomicU32::new(1),
            dispatcher: thread.thread().id(),
        }))
    }

    pub fn is_connected(&self) -> bool {
        self.pending.connected.load(Ordering::SeqCst)
    }

    /// True on this connection's dispatcher thread, i.e. inside a monitor
    /// callback.
    pub fn is_dispatcher_thread(&self) -> bool {
        thread::current().id() == self.dispatcher
    }

    /// Blocks until the reply to this call arrives or `timeout` passes.
    /// Refused on the dispatcher thread, which is the only one that could
    /// route the reply.
    pub fn call(&self, name: &str, args: Vec<Arg>, timeout: Duration) -> VfsResult<Vec<Arg>> {
        if self.is_dispatcher_thread() {
            return Err(VfsError::precondition(format_args!(
                "{name} would wait on the shared connection from its own dispatcher"
            )));
        }
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        self.pending.waiters.lock().insert(serial, tx);

        // Checked after registering: the dispatcher clears waiters only
        // after flipping this flag.
        if !self.is_connected() {
            self.forget(serial);
            return Err(VfsError::disconnected());
        }

        let sent = self.sink.lock().send(&Message::call(serial, name, args));
        if let Err(e) = sent {
            self.forget(serial);
            return Err(e);
        }

        match rx.recv_timeout(timeout) {
            Ok(Message::Reply { args, .. }) => Ok(args),
            Ok(Message::Error { name: err, message, .. }) => {
                Err(VfsError::internal(format_args!("{name} rejected: {err}: {message}")))
            }
            Ok(other) => Err(VfsError::malformed(format_args!("{name}: unexpected {other:?}"))),
            Err(RecvTimeoutError::Timeout) => {
                self.forget(serial);
                Err(VfsError::timeout(name))
            }
            Err(RecvTimeoutError::Disconnected) => Err(VfsError::disconnected()),
        }
    }

    /// Sends without expecting a reply.
    pub fn notify(&self, name: &str, args: Vec<Arg>) -> VfsResult<()> {
        self.sink.lock().send(&Message::notify(name, args))
    }

    fn forget(&self, serial: u32) {
        self.pending.waiters.lock().remove(&serial);
    }
}

impl Drop for SharedConnection {
    fn drop(&mut self) {
        debug!("closing shared connection");
        if let Err(e) = self.sink.get_mut().close() {
            trace!(error = %e, "close failed");
        }
    }
}

struct Dispatcher {
    source: Box<dyn MessageSource>,
    pending: Arc<Pending>,
    monitors: Arc<MonitorRegistry>,
}

impl Dispatcher {
    fn run(mut self) {
        loop {
            match self.source.recv(None) {
                Ok(msg) => self.route(msg),
                Err(e) => {
                    debug!(error = %e, "shared connection closed");
                    break;
                }
            }
        }
        // Ids were scoped to this connection. Cleared before the flag flips
        // so a reopened connection never sees the old entries.
        let dropped = self.monitors.reset();
        if dropped > 0 {
            warn!(count = dropped, "shared connection lost; monitors dropped");
        }
        self.pending.connected.store(false, Ordering::SeqCst);
        // Dropping the senders wakes every waiter with a disconnect.
        self.pending.waiters.lock().clear();
    }

    fn route(&self, msg: Message) {
        let reply_to = match &msg {
            Message::Reply { reply_to, .. } | Message::Error { reply_to, .. } => Some(*reply_to),
            _ => None,
        };
        if let Some(reply_to) = reply_to {
            let waiter = self.pending.waiters.lock().remove(&reply_to);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(msg);
                }
                None => trace!(reply_to, "stray reply on shared connection"),
            }
            return;
        }

        match msg {
            Message::Signal { member, args } if member == method::MONITOR_SIGNAL => match decode_signal(args) {
                Ok((id, uri, event)) => {
                    self.monitors.dispatch(id, uri, event);
                }
                Err(e) => warn!(error = %e, "malformed monitor signal"),
            },
            other => trace!(?other, "ignoring message on shared connection"),
        }
    }
}

fn decode_signal(args: Vec<Arg>) -> VfsResult<(i32, Uri, MonitorEventType)> {
    let mut fields = ReplyCursor::new(args);
    let id = fields.next_i32()?;
    let uri = fields.next_uri()?;
    let event = fields.next_i32()?;
    Ok((id, uri, MonitorEventType::from(event)))
}

/// Owns the client's shared connection, reopening it after a loss.
pub struct SharedBus {
    connector: Arc<dyn Connector>,
    monitors: Arc<MonitorRegistry>,
    current: Mutex<Option<Arc<SharedConnection>>>,
}

impl SharedBus {
    pub fn new(connector: Arc<dyn Connector>, monitors: Arc<MonitorRegistry>) -> Self {
        Self { connector, monitors, current: Mutex::new(None) }
    }

    pub fn monitors(&self) -> &Arc<MonitorRegistry> {
        &self.monitors
    }

    pub fn connection(&self) -> VfsResult<Arc<SharedConnection>> {
        let mut current = self.current.lock();
        if let Some(conn) = current.as_ref() {
            if conn.is_connected() {
                return Ok(conn.clone());
            }
            warn!("shared connection lost; reopening");
        }
        let conn = SharedConnection::open(self.connector.as_ref(), self.monitors.clone())?;
        *current = Some(conn.clone());
        Ok(conn)
    }

    pub fn call(&self, name: &str, args: Vec<Arg>, timeout: Duration) -> VfsResult<Vec<Arg>> {
        self.connection()?.call(name, args, timeout)
    }

    pub fn notify(&self, name: &str, args: Vec<Arg>) -> VfsResult<()> {
        self.connection()?.notify(name, args)
    }

    /// True when running inside a monitor callback of the current shared
    /// connection.
    pub fn on_dispatcher_thread(&self) -> bool {
        self.current.lock().as_ref().is_some_and(|c| c.is_dispatcher_thread())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn replies_and_signals_are_routed() {
        let (connector, listener) = memory::endpoint();
        let monitors = Arc::new(MonitorRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        monitors
            .subscribe(4, Box::new(move |ev: &crate::MonitorEvent| {
                assert_eq!(ev.uri, Uri::new("file:///w"));
                h.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        let bus = SharedBus::new(Arc::new(connector), monitors);
        let daemon = thread::spawn(move || {
            let (_, mut ch) = listener.accept().unwrap();
            let Message::Call { serial, .. } = ch.source.recv(None).unwrap() else {
                panic!("expected a call");
            };
            ch.sink
                .send(&Message::signal(
                    method::MONITOR_SIGNAL,
                    vec![Arg::Int32(4), Arg::Str("file:///w".into()), Arg::Int32(0)],
                ))
                .unwrap();
            ch.sink
                .send(&Message::reply(serial, vec![Arg::Str("p".into()), Arg::Int32(1)]))
                .unwrap();
            ch
        });

        let fields = bus.call(method::GET_CONNECTION, Vec::new(), Duration::from_secs(5)).unwrap();
        assert_eq!(fields.len(), 2);
        let _ch = daemon.join().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reopens_after_loss_without_old_monitors() {
        let (connector, listener) = memory::endpoint();
        let monitors = Arc::new(MonitorRegistry::new());
        let bus = SharedBus::new(Arc::new(connector), monitors.clone());

        let first = bus.connection().unwrap();
        monitors.subscribe(2, Box::new(|_: &crate::MonitorEvent| {})).unwrap();
        let (_, ch) = listener.accept().unwrap();
        drop(ch);
        while first.is_connected() {
            thread::sleep(Duration::from_millis(1));
        }

        let err = first.call("Ping", Vec::new(), Duration::from_secs(5)).unwrap_err();
        assert_eq!(err.code, crate::VfsdCode::Internal);

        assert!(monitors.is_empty());

        let second = bus.connection().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(listener.accept().unwrap().0, memory::SHARED_ADDRESS);
    }
}
