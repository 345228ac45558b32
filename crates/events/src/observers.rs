//! Ordered, synchronous observer list.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use crate::bus::Subscription;

/// Handle returned by [`Observers::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Callback<M> = Arc<dyn Fn(&M) + Send + Sync>;

enum Observer<M> {
    Callback(Callback<M>),
    Channel(mpsc::Sender<M>),
}

impl<M> Clone for Observer<M> {
    fn clone(&self) -> Self {
        match self {
            Observer::Callback(f) => Observer::Callback(Arc::clone(f)),
            Observer::Channel(tx) => Observer::Channel(tx.clone()),
        }
    }
}

/// In-process observer list.
///
/// - No IO / no async
/// - Registration-order delivery on the publishing call
/// - Observers may subscribe/unsubscribe from inside a callback; the change
///   takes effect from the next publish
pub struct Observers<M> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ObserverId, Observer<M>)>>,
}

impl<M> Observers<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Returns a handle usable with [`Self::unsubscribe`].
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        self.push(Observer::Callback(Arc::new(observer)))
    }

    /// Remove a previously registered observer. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    /// Drop every observer.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, observer: Observer<M>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));

        // A poisoned list still hands out an id; the observer just never fires.
        match self.entries.lock() {
            Ok(mut entries) => entries.push((id, observer)),
            Err(_) => tracing::warn!("observer list poisoned; subscription ignored"),
        }

        id
    }
}

impl<M: Clone> Observers<M> {
    /// Deliver `message` to every observer, in registration order.
    pub fn publish(&self, message: &M) {
        // Snapshot so callbacks can touch the list without deadlocking.
        let snapshot: Vec<(ObserverId, Observer<M>)> = match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(_) => {
                tracing::warn!("observer list poisoned; message dropped");
                return;
            }
        };

        let mut dead = Vec::new();
        for (id, observer) in snapshot {
            match observer {
                Observer::Callback(f) => f(message),
                Observer::Channel(tx) => {
                    if tx.send(message.clone()).is_err() {
                        dead.push(id);
                    }
                }
            }
        }

        if !dead.is_empty() {
            if let Ok(mut entries) = self.entries.lock() {
                entries.retain(|(id, _)| !dead.contains(id));
            }
        }
    }

    /// Subscribe through a channel instead of a callback.
    pub fn channel(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        self.push(Observer::Channel(tx));
        Subscription::new(rx)
    }
}

impl<M> Default for Observers<M> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<M> core::fmt::Debug for Observers<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Observers").field("len", &self.len()).finish()
    }
}
