//! Per-thread private connections to the daemon.
//!
//! Each thread that issues an operation gets its own exclusive channel,
//! bootstrapped lazily through the shared bus and cached in thread-local
//! storage keyed by the owning [`ConnectionManager`]. The calling thread
//! pumps its channel itself until the reply arrives, so no lock is held
//! across the blocking receive.
//!
//! Every connection carries a process-unique generation. Handles remember
//! the generation that issued their ids and are refused on any other.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::bus::SharedBus;
use crate::cancel::SharedSink;
use crate::wire::{Arg, Message, ReplyCursor, method};
use crate::{CallbackHandler, Connector, Duplex, MessageSource, VfsError, VfsResult, VfsdCode};

enum Slot {
    Idle(RemoteConnection),
    /// Checked out by a call running further up this thread's stack.
    Busy,
}

thread_local! {
    static CONNECTIONS: RefCell<HashMap<u64, Slot>> = RefCell::new(HashMap::new());
}

static NEXT_MANAGER: AtomicU64 = AtomicU64::new(1);
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// One thread's exclusive channel plus the counters scoped to it.
pub struct RemoteConnection {
    conn_id: i32,
    generation: u64,
    sink: SharedSink,
    source: Box<dyn MessageSource>,
    callbacks: Option<Arc<dyn CallbackHandler>>,
    next_serial: u32,
    next_token: i32,
    connected: bool,
}

impl RemoteConnection {
    pub(crate) fn new(duplex: Duplex, conn_id: i32, callbacks: Option<Arc<dyn CallbackHandler>>) -> Self {
        Self {
            conn_id,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            sink: Arc::new(Mutex::new(duplex.sink)),
            source: duplex.source,
            callbacks,
            next_serial: 0,
            next_token: 0,
            connected: true,
        }
    }

    pub fn conn_id(&self) -> i32 {
        self.conn_id
    }

    /// Process-unique; never reused after this connection is gone.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Next cancellation token; unique on this connection until it wraps.
    pub(crate) fn mint_token(&mut self) -> i32 {
        self.next_token = self.next_token.checked_add(1).unwrap_or(1);
        self.next_token
    }

    pub(crate) fn sink(&self) -> SharedSink {
        self.sink.clone()
    }

    fn mint_serial(&mut self) -> u32 {
        // 0 is what fire-and-forget calls carry.
        self.next_serial = self.next_serial.checked_add(1).unwrap_or(1);
        self.next_serial
    }

    /// Sends one call and pumps the channel until its reply, a disconnect,
    /// or `timeout`. Returns the reply fields.
    pub(crate) fn call(&mut self, name: &str, args: Vec<Arg>, timeout: Duration) -> VfsResult<Vec<Arg>> {
        let serial = self.mint_serial();
        let sent = self.sink.lock().send(&Message::call(serial, name, args));
        sent.map_err(|e| self.lost(e))?;

        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let msg = match self.source.recv(Some(left)) {
                Ok(msg) => msg,
                Err(e) if e.is_timeout() => return Err(self.timed_out(name)),
                Err(e) => return Err(self.lost(e)),
            };
            match msg {
                Message::Reply { reply_to, args } if reply_to == serial => return Ok(args),
                Message::Error { reply_to, name: err, message } if reply_to == serial => {
                    return Err(VfsError::internal(format_args!("{name} rejected: {err}: {message}")));
                }
                Message::Call { serial: inbound, method: m, args, no_reply } if m == method::CALLBACK => {
                    self.answer_callback(inbound, args, no_reply)?;
                }
                other => trace!(conn = self.conn_id, ?other, "stray message on private connection"),
            }
        }
    }

    fn answer_callback(&mut self, serial: u32, args: Vec<Arg>, no_reply: bool) -> VfsResult<()> {
        let mut args = args.into_iter();
        let outcome = match args.next() {
            Some(Arg::Str(callback)) => {
                let rest: Vec<Arg> = args.collect();
                debug!(conn = self.conn_id, %callback, "daemon callback");
                match &self.callbacks {
                    Some(handler) => handler.invoke(&callback, &rest),
                    None => Err(VfsError::precondition(format_args!("no handler for callback {callback}"))),
                }
            }
            _ => Err(VfsError::malformed("callback without a name")),
        };
        if no_reply {
            return Ok(());
        }
        let answer = match outcome {
            Ok(fields) => Message::reply(serial, fields),
            Err(e) => Message::error(serial, "Callback.Failed", e.to_string()),
        };
        let sent = self.sink.lock().send(&answer);
        sent.map_err(|e| self.lost(e))
    }

    /// The connection stays usable: a late reply carries a stale serial
    /// and is skipped by the next call.
    fn timed_out(&self, name: &str) -> VfsError {
        warn!(conn = self.conn_id, method = name, "call timed out");
        VfsError::timeout(name)
    }

    fn lost(&mut self, err: VfsError) -> VfsError {
        debug!(conn = self.conn_id, error = %err, "private connection lost");
        self.connected = false;
        match err.code {
            VfsdCode::Internal => err,
            _ => VfsError::internal(format_args!("connection {} lost: {err}", self.conn_id)),
        }
    }
}

impl Drop for RemoteConnection {
    fn drop(&mut self) {
        debug!(conn = self.conn_id, "closing private connection");
        if let Err(e) = self.sink.lock().close() {
            trace!(conn = self.conn_id, error = %e, "close failed");
        }
    }
}

/// Hands out the calling thread's [`RemoteConnection`], bootstrapping it on
/// first use and again after it was lost.
pub struct ConnectionManager {
    id: u64,
    bus: Arc<SharedBus>,
    connector: Arc<dyn Connector>,
    callbacks: Option<Arc<dyn CallbackHandler>>,
    bootstrap_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(
        bus: Arc<SharedBus>,
        connector: Arc<dyn Connector>,
        callbacks: Option<Arc<dyn CallbackHandler>>,
        bootstrap_timeout: Duration,
    ) -> Self {
        Self {
            id: NEXT_MANAGER.fetch_add(1, Ordering::Relaxed),
            bus,
            connector,
            callbacks,
            bootstrap_timeout,
        }
    }

    /// Runs `f` against this thread's connection, bootstrapping one if
    /// there is none or it was lost.
    pub fn with_connection<R>(&self, f: impl FnOnce(&mut RemoteConnection) -> VfsResult<R>) -> VfsResult<R> {
        self.run(None, f)
    }

    /// Runs `f` only on the connection of generation `generation`. If that
    /// connection is gone the call fails with `Precondition` and nothing is
    /// bootstrapped.
    pub fn with_generation<R>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut RemoteConnection) -> VfsResult<R>,
    ) -> VfsResult<R> {
        self.run(Some(generation), f)
    }

    fn run<R>(&self, bound: Option<u64>, f: impl FnOnce(&mut RemoteConnection) -> VfsResult<R>) -> VfsResult<R> {
        let cached = self.check_out()?;
        let _release = Release(self.id);

        let mut conn = match (cached, bound) {
            (Some(conn), _) if conn.is_connected() => conn,
            (_, Some(generation)) => return Err(stale(generation)),
            (_, None) => self.bootstrap()?,
        };
        if let Some(generation) = bound {
            if conn.generation() != generation {
                self.check_in(conn);
                return Err(stale(generation));
            }
        }

        let out = f(&mut conn);
        self.check_in(conn);
        out
    }

    /// Takes this thread's connection out of the cache, leaving a busy
    /// marker. A nested call on the same thread (from a callback handler)
    /// is refused instead of silently opening a second connection.
    fn check_out(&self) -> VfsResult<Option<RemoteConnection>> {
        CONNECTIONS
            .try_with(|map| {
                let mut map = map.borrow_mut();
                if matches!(map.get(&self.id), Some(Slot::Busy)) {
                    return Err(VfsError::precondition(
                        "private connection is busy with a call on this thread",
                    ));
                }
                Ok(match map.insert(self.id, Slot::Busy) {
                    Some(Slot::Idle(conn)) => Some(conn),
                    _ => None,
                })
            })
            .map_err(|_| VfsError::internal("thread is shutting down"))?
    }

    fn check_in(&self, conn: RemoteConnection) {
        if conn.is_connected() {
            let _ = CONNECTIONS.try_with(|map| map.borrow_mut().insert(self.id, Slot::Idle(conn)));
        } else {
            debug!(conn = conn.conn_id(), "discarding dead connection; next call re-bootstraps");
        }
    }

    /// Closes this thread's connection, if any and not in use. Returns
    /// whether one was closed.
    pub fn close_current(&self) -> bool {
        CONNECTIONS
            .try_with(|map| {
                let mut map = map.borrow_mut();
                match map.get(&self.id) {
                    Some(Slot::Idle(_)) => map.remove(&self.id).is_some(),
                    _ => false,
                }
            })
            .unwrap_or(false)
    }

    fn bootstrap(&self) -> VfsResult<RemoteConnection> {
        self.try_bootstrap().map_err(|e| {
            warn!(error = %e, "connection bootstrap failed");
            match e.code {
                VfsdCode::Internal => e,
                _ => VfsError::internal(format_args!("bootstrap: {e}")),
            }
        })
    }

    fn try_bootstrap(&self) -> VfsResult<RemoteConnection> {
        let fields = self.bus.call(method::GET_CONNECTION, Vec::new(), self.bootstrap_timeout)?;
        let mut reply = ReplyCursor::new(fields);
        let address = reply.next_str()?;
        let conn_id = reply.next_i32()?;

        let duplex = self.connector.connect_private(&address)?;
        debug!(conn = conn_id, %address, "private connection established");
        Ok(RemoteConnection::new(duplex, conn_id, self.callbacks.clone()))
    }
}

/// Clears the busy marker if the connection was not checked back in.
struct Release(u64);

impl Drop for Release {
    fn drop(&mut self) {
        let _ = CONNECTIONS.try_with(|map| {
            let mut map = map.borrow_mut();
            if matches!(map.get(&self.0), Some(Slot::Busy)) {
                map.remove(&self.0);
            }
        });
    }
}

fn stale(generation: u64) -> VfsError {
    VfsError::precondition(format_args!(
        "handle belongs to connection generation {generation}, which is gone"
    ))
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // Other threads' entries go when those threads exit.
        self.close_current();
    }
}
