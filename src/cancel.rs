//! Caller-side cancellation objects and the per-call tokens bound to them.
//!
//! A [`Cancellation`] is unarmed until an operation that accepts it starts.
//! For the duration of that one call it carries the token the call was sent
//! with; [`Cancellation::cancel`] then asks the daemon to abort it. Outside
//! that window a cancel only records the request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{MessageSink, VfsError, VfsResult, wire::{Arg, Message, method}};

/// The write half of a private connection, shared with cancel requests
/// issued from other threads.
pub(crate) type SharedSink = Arc<Mutex<Box<dyn MessageSink>>>;

struct Armed {
    token: i32,
    conn_id: i32,
    sink: SharedSink,
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    armed: Mutex<Option<Armed>>,
}

/// Cancellation object handed to cancellable operations. Clones share state,
/// so one clone can be kept by the caller and another moved to a watchdog.
#[derive(Clone, Default)]
pub struct Cancellation {
    state: Arc<CancelState>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Sent to the daemon only if a call is in flight;
    /// the request is not acknowledged.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);

        // Copied out so a slow send never holds up disarming.
        let target = self
            .state
            .armed
            .lock()
            .as_ref()
            .map(|a| (a.token, a.conn_id, a.sink.clone()));
        let Some((token, conn_id, sink)) = target else {
            debug!("cancel requested with no call in flight");
            return;
        };
        debug!(token, conn = conn_id, "sending cancel");
        let msg = Message::notify(method::CANCEL, vec![Arg::Int32(token)]);
        if let Err(e) = sink.lock().send(&msg) {
            warn!(token, error = %e, "cancel request not delivered");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_armed(&self) -> bool {
        self.state.armed.lock().is_some()
    }

    /// Binds `token` to this object until the returned guard drops.
    pub(crate) fn arm(&self, token: i32, conn_id: i32, sink: SharedSink) -> VfsResult<ArmedToken> {
        let mut armed = self.state.armed.lock();
        if let Some(current) = armed.as_ref() {
            return Err(VfsError::precondition(format_args!(
                "cancellation already armed with token {}",
                current.token
            )));
        }
        *armed = Some(Armed { token, conn_id, sink });
        Ok(ArmedToken { state: Arc::downgrade(&self.state), token })
    }
}

impl std::fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancellation")
            .field("cancelled", &self.is_cancelled())
            .field("armed", &self.is_armed())
            .finish()
    }
}

/// Live association between one call and its cancellation object.
/// Dropping it disarms.
pub(crate) struct ArmedToken {
    state: Weak<CancelState>,
    token: i32,
}

impl ArmedToken {
    pub(crate) fn token(&self) -> i32 {
        self.token
    }

    /// Clears the association if it is still ours. Safe to repeat, and safe
    /// after every `Cancellation` clone is gone.
    pub(crate) fn disarm(&self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut armed = state.armed.lock();
        if armed.as_ref().is_some_and(|a| a.token == self.token) {
            *armed = None;
        }
    }
}

impl Drop for ArmedToken {
    fn drop(&mut self) {
        self.disarm();
    }
}
