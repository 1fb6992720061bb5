//! Poll waiters and the per-node poll set
//!
//! A waiter is a registration of interest in node events, modeled after
//! file-descriptor polling: the caller creates a [`PollWaiter`], registers it
//! on a node, blocks on it, and tears the registration down afterwards. Each
//! waiter carries its own wakeup primitive, and the set of registered waiters
//! is a dense array guarded by the node lock — which is exactly what closes
//! the wakeup-lost-between-check-and-sleep race without a condition variable
//! per node.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use bitflags::bitflags;

use crate::config::MAX_POLL_WAITERS;
use crate::error::{OrbitError, Result};

bitflags! {
    /// Event mask for poll registrations
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollEvents: u16 {
        /// A sample this subscriber has not seen is available
        const READABLE = 0x01;
        /// The node accepts publishes (always true for in-process nodes)
        const WRITABLE = 0x04;
    }
}

/// One registration of interest in node events.
///
/// Owned by the polling caller; the node's poll set holds a reference for
/// the duration of the registration.
#[derive(Debug)]
pub struct PollWaiter {
    requested: PollEvents,
    ready: Mutex<PollEvents>,
    wakeup: Condvar,
}

impl PollWaiter {
    /// Create a waiter interested in `requested` events.
    pub fn new(requested: PollEvents) -> Self {
        Self {
            requested,
            ready: Mutex::new(PollEvents::empty()),
            wakeup: Condvar::new(),
        }
    }

    /// Events this waiter asked for.
    pub fn requested(&self) -> PollEvents {
        self.requested
    }

    /// Deliver events. Only the intersection with the requested mask is
    /// recorded; the waiter is signaled when it becomes non-empty.
    pub fn notify(&self, events: PollEvents) {
        let hits = events & self.requested;
        if hits.is_empty() {
            return;
        }

        let mut ready = self.ready.lock().unwrap();
        *ready |= hits;
        self.wakeup.notify_all();
    }

    /// Events delivered since the last [`reset`](Self::reset).
    pub fn revents(&self) -> PollEvents {
        *self.ready.lock().unwrap()
    }

    /// Clear delivered events. Called when a registration is (re-)established.
    pub fn reset(&self) {
        *self.ready.lock().unwrap() = PollEvents::empty();
    }

    /// Block until at least one requested event is delivered, or the timeout
    /// elapses. Returns the delivered events (empty on timeout).
    pub fn wait(&self, timeout: Option<Duration>) -> PollEvents {
        let ready = self.ready.lock().unwrap();

        match timeout {
            None => *self
                .wakeup
                .wait_while(ready, |r| r.is_empty())
                .unwrap(),
            Some(timeout) => {
                let (ready, _timed_out) = self
                    .wakeup
                    .wait_timeout_while(ready, timeout, |r| r.is_empty())
                    .unwrap();
                *ready
            }
        }
    }
}

/// Dense array of registered waiters, guarded by the owning node's lock.
#[derive(Debug, Default)]
pub struct PollSet {
    slots: Vec<Option<Arc<PollWaiter>>>,
}

impl PollSet {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Store a waiter in the first free slot, doubling capacity on demand.
    pub fn store(&mut self, waiter: &Arc<PollWaiter>) -> Result<usize> {
        if let Some(slot) = self.slots.iter().position(Option::is_none) {
            self.slots[slot] = Some(Arc::clone(waiter));
            return Ok(slot);
        }

        let occupied = self.slots.len();
        if occupied >= MAX_POLL_WAITERS {
            return Err(OrbitError::no_mem("poll waiter table exhausted"));
        }

        let grown = if occupied == 0 {
            1
        } else {
            (occupied * 2).min(MAX_POLL_WAITERS)
        };
        self.slots.resize(grown, None);
        self.slots[occupied] = Some(Arc::clone(waiter));
        Ok(occupied)
    }

    /// Remove a previously stored waiter. Returns whether it was present.
    pub fn remove(&mut self, waiter: &Arc<PollWaiter>) -> bool {
        for slot in self.slots.iter_mut() {
            if let Some(stored) = slot {
                if Arc::ptr_eq(stored, waiter) {
                    *slot = None;
                    return true;
                }
            }
        }
        false
    }

    /// Deliver events to every registered waiter whose mask matches.
    pub fn notify_all(&self, events: PollEvents) {
        for waiter in self.slots.iter().flatten() {
            waiter.notify(events);
        }
    }

    /// Number of registered waiters.
    pub fn waiter_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Current slot capacity.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
