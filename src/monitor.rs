//! Process-wide table of change-notification subscriptions.
//!
//! The shared connection's dispatcher calls [`MonitorRegistry::dispatch`]
//! for every inbound monitor signal; application threads subscribe and
//! unsubscribe concurrently.
//!
//! Callbacks run without the table locked, so they may call back into the
//! registry or the client (including cancelling their own monitor). Each
//! entry has its own gate: `unsubscribe` waits for a delivery in flight on
//! another thread, and nothing is delivered once it returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, trace};

use crate::{MonitorEventType, Uri, VfsError, VfsResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorEvent {
    pub monitor_id: i32,
    pub uri: Uri,
    pub event_type: MonitorEventType,
}

pub type MonitorCallback = Box<dyn Fn(&MonitorEvent) + Send + Sync>;

/// A standing subscription, as returned by `monitor_add`.
///
/// Ids are assigned per shared connection, so the handle also records the
/// registry epoch it was issued in. A handle from before a reset never
/// matches an entry made after it, even one with the same id.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct MonitorHandle {
    id: i32,
    epoch: u64,
}

impl MonitorHandle {
    pub fn id(&self) -> i32 {
        self.id
    }
}

struct Entry {
    epoch: u64,
    callback: MonitorCallback,
    gate: ReentrantMutex<()>,
    cancelled: AtomicBool,
}

impl Entry {
    /// Waits out any delivery on another thread, then stops further ones.
    fn retire(&self) {
        let _gate = self.gate.lock();
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Table {
    epoch: u64,
    entries: HashMap<i32, Arc<Entry>>,
}

#[derive(Default)]
pub struct MonitorRegistry {
    table: Mutex<Table>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under a daemon-assigned id. An id that is still
    /// registered is refused, never overwritten.
    pub fn subscribe(&self, id: i32, callback: MonitorCallback) -> VfsResult<MonitorHandle> {
        let mut table = self.table.lock();
        if table.entries.contains_key(&id) {
            return Err(VfsError::precondition(format_args!("monitor {id} is already registered")));
        }
        let epoch = table.epoch;
        let entry = Entry { epoch, callback, gate: ReentrantMutex::new(()), cancelled: AtomicBool::new(false) };
        table.entries.insert(id, Arc::new(entry));
        Ok(MonitorHandle { id, epoch })
    }

    /// Removes the entry `handle` was issued for. Once this returns, no
    /// delivery for it is in flight on another thread and none will start.
    /// Returns false if the handle is stale or already removed.
    pub fn unsubscribe(&self, handle: &MonitorHandle) -> bool {
        let entry = {
            let mut table = self.table.lock();
            match table.entries.get(&handle.id) {
                Some(e) if e.epoch == handle.epoch => table.entries.remove(&handle.id),
                _ => None,
            }
        };
        match entry {
            Some(entry) => {
                entry.retire();
                true
            }
            None => false,
        }
    }

    /// Drops every subscription and starts a new epoch. Used when the
    /// shared connection that carried the ids is gone.
    pub fn reset(&self) -> usize {
        let drained: Vec<Arc<Entry>> = {
            let mut table = self.table.lock();
            table.epoch += 1;
            table.entries.drain().map(|(_, e)| e).collect()
        };
        for entry in &drained {
            entry.retire();
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "monitor subscriptions dropped");
        }
        drained.len()
    }

    /// Delivers one signal. Unknown ids (cancelled, or racing the cancel)
    /// are dropped.
    pub fn dispatch(&self, id: i32, uri: Uri, event_type: MonitorEventType) -> bool {
        let entry = self.table.lock().entries.get(&id).cloned();
        let Some(entry) = entry else {
            trace!(id, %uri, "dropping signal for unknown monitor");
            return false;
        };

        let _gate = entry.gate.lock();
        if entry.cancelled.load(Ordering::SeqCst) {
            trace!(id, "dropping signal for cancelled monitor");
            return false;
        }
        (entry.callback)(&MonitorEvent { monitor_id: id, uri, event_type });
        true
    }

    pub fn contains(&self, id: i32) -> bool {
        self.table.lock().entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
