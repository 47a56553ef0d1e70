//! Single-writer, multi-reader result distribution.
//!
//! One inference pipeline publishes; any number of consumers (HUD, rig
//! mapper, debug taps) subscribe. The bus caches the last published value
//! and replays it synchronously to late subscribers, so joining after the
//! first frame never stalls a consumer. A panicking subscriber is isolated:
//! it is dropped with a warning and never prevents other subscribers from
//! running or the publisher from continuing.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Callback<T> = Box<dyn FnMut(&T) + Send>;

struct SubEntry<T> {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback<T>,
}

struct BusInner<T> {
    latest: Option<T>,
    subscribers: Vec<SubEntry<T>>,
    /// Ids stopped while their entries were checked out by `publish`
    tombstones: HashSet<u64>,
    next_id: u64,
}

/// Publish/subscribe channel for one tracking category.
pub struct ResultBus<T> {
    inner: Arc<Mutex<BusInner<T>>>,
}

impl<T> Clone for ResultBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for ResultBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultBus").finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Default for ResultBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> ResultBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                latest: None,
                subscribers: Vec::new(),
                tombstones: HashSet::new(),
                next_id: 0,
            })),
        }
    }

    /// Store `value` as latest and synchronously invoke every subscriber.
    ///
    /// Callbacks run outside the bus lock, so a subscriber may call
    /// `latest()` or `subscribe()` reentrantly without deadlocking.
    pub fn publish(&self, value: T) {
        let mut entries = {
            let mut inner = self.inner.lock().expect("result bus lock poisoned");
            inner.latest = Some(value.clone());
            std::mem::take(&mut inner.subscribers)
        };

        let mut survivors = Vec::with_capacity(entries.len());
        for mut entry in entries.drain(..) {
            if !entry.active.load(Ordering::SeqCst) {
                continue;
            }
            let ok = catch_unwind(AssertUnwindSafe(|| (entry.callback)(&value))).is_ok();
            if ok {
                survivors.push(entry);
            } else {
                entry.active.store(false, Ordering::SeqCst);
                tracing::warn!(id = entry.id, "subscriber panicked, dropping it");
            }
        }

        let mut inner = self.inner.lock().expect("result bus lock poisoned");
        // Filter anything stopped while checked out, then re-attach ahead
        // of subscribers added during the callbacks.
        let tombstones = std::mem::take(&mut inner.tombstones);
        survivors.retain(|e| !tombstones.contains(&e.id));
        let added_during_publish = std::mem::take(&mut inner.subscribers);
        survivors.extend(added_during_publish);
        inner.subscribers = survivors;
    }

    /// Register a subscriber. If a value has already been published, it is
    /// replayed to the new subscriber before this call returns.
    pub fn subscribe(&self, mut callback: impl FnMut(&T) + Send + 'static) -> Subscription {
        let replay = {
            let inner = self.inner.lock().expect("result bus lock poisoned");
            inner.latest.clone()
        };

        if let Some(value) = replay {
            if catch_unwind(AssertUnwindSafe(|| callback(&value))).is_err() {
                tracing::warn!("subscriber panicked during replay, not registering it");
                return Subscription { cancel: None };
            }
        }

        let active = Arc::new(AtomicBool::new(true));
        let id = {
            let mut inner = self.inner.lock().expect("result bus lock poisoned");
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push(SubEntry {
                id,
                active: Arc::clone(&active),
                callback: Box::new(callback),
            });
            id
        };

        let bus = Arc::clone(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                active.store(false, Ordering::SeqCst);
                let mut inner = bus.lock().expect("result bus lock poisoned");
                let before = inner.subscribers.len();
                inner.subscribers.retain(|e| e.id != id);
                if inner.subscribers.len() == before {
                    // Entry is checked out by a publish in progress
                    inner.tombstones.insert(id);
                }
            })),
        }
    }

    /// Last published value, if any.
    pub fn latest(&self) -> Option<T> {
        self.inner
            .lock()
            .expect("result bus lock poisoned")
            .latest
            .clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .expect("result bus lock poisoned")
            .subscribers
            .len()
    }
}

/// Handle owning exactly one `stop()` capability for a subscription.
///
/// Dropping the handle stops the subscription; `detach()` keeps it alive
/// for the lifetime of the bus instead.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Unsubscribe. Calling this a second time is a no-op.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Leave the subscription registered forever.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("stopped", &self.cancel.is_none())
            .finish()
    }
}
