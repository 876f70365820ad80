//! Non-blocking snapshot fan-out with a drop-stale policy.
//!
//! Each subscriber owns a single mutex-guarded slot. Publishing
//! replaces whatever the subscriber has not yet consumed, so a slow
//! subscriber only ever loses *its own* stale snapshots — the publisher
//! never blocks and never allocates per-subscriber queues.

use crate::snapshot::Snapshot;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct Slot {
    latest: Mutex<Option<Arc<Snapshot>>>,
    ready: Condvar,
    closed: Mutex<bool>,
}

/// Publisher side of the snapshot fan-out.
///
/// Held by the tick thread; [`subscribe`](SnapshotHub::subscribe) may be
/// called from any thread.
#[derive(Default)]
pub struct SnapshotHub {
    slots: Mutex<Vec<Arc<Slot>>>,
}

impl SnapshotHub {
    /// A hub with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Subscription {
        let slot = Arc::new(Slot {
            latest: Mutex::new(None),
            ready: Condvar::new(),
            closed: Mutex::new(false),
        });
        self.slots.lock().unwrap().push(Arc::clone(&slot));
        Subscription { slot }
    }

    /// Publish a snapshot to every live subscriber, replacing any
    /// unconsumed one. Dead subscriptions are pruned as they are found.
    pub fn publish(&self, snapshot: Arc<Snapshot>) {
        let mut slots = self.slots.lock().unwrap();
        slots.retain(|slot| {
            // Subscriber gone when we hold the only other reference.
            if Arc::strong_count(slot) == 1 {
                return false;
            }
            *slot.latest.lock().unwrap() = Some(Arc::clone(&snapshot));
            slot.ready.notify_one();
            true
        });
    }

    /// Mark every subscription closed and wake blocked receivers.
    pub fn close(&self) {
        let slots = self.slots.lock().unwrap();
        for slot in slots.iter() {
            // Receivers hold `latest` from their closed-check until they
            // start waiting, so taking it here means each receiver is
            // either before the check (and will see the flag) or already
            // waiting (and will get the notify).
            let guard = slot.latest.lock().unwrap();
            *slot.closed.lock().unwrap() = true;
            drop(guard);
            slot.ready.notify_one();
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}

/// Receiver side of the snapshot fan-out.
pub struct Subscription {
    slot: Arc<Slot>,
}

impl Subscription {
    /// Take the latest unconsumed snapshot without blocking.
    pub fn try_latest(&self) -> Option<Arc<Snapshot>> {
        self.slot.latest.lock().unwrap().take()
    }

    /// Block until a snapshot arrives or the hub closes.
    ///
    /// Returns `None` once the hub is closed and no snapshot is pending.
    pub fn recv(&self) -> Option<Arc<Snapshot>> {
        let mut latest = self.slot.latest.lock().unwrap();
        loop {
            if let Some(snap) = latest.take() {
                return Some(snap);
            }
            if *self.slot.closed.lock().unwrap() {
                return None;
            }
            latest = self.slot.ready.wait(latest).unwrap();
        }
    }

    /// Block until a snapshot arrives, the hub closes, or the timeout
    /// elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Arc<Snapshot>> {
        let mut latest = self.slot.latest.lock().unwrap();
        loop {
            if let Some(snap) = latest.take() {
                return Some(snap);
            }
            if *self.slot.closed.lock().unwrap() {
                return None;
            }
            let (guard, result) = self.slot.ready.wait_timeout(latest, timeout).unwrap();
            latest = guard;
            if result.timed_out() {
                return latest.take();
            }
        }
    }
}
