//! User-facing notifications about authorization-relevant changes.
//!
//! Purely informational: nothing in here is ever consulted by a gate.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use consorcia_events::Observers;

use crate::events::AuthEvent;
use crate::storage::KeyValueStore;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PendingApproval,
    Approved,
    RoleChanged,
    PermissionsChanged,
    Info,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    pub read: bool,
    /// Where the UI should navigate when the notification is opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        priority: NotificationPriority,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            priority,
            title: title.into(),
            message: message.into(),
            read: false,
            route: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }
}

/// Ordered, persisted notification list (newest first), bounded to
/// `max_entries`.
pub struct ChangeNotifier {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    max_entries: usize,
    entries: Mutex<Option<Vec<Notification>>>,
    events: Arc<Observers<AuthEvent>>,
}

impl ChangeNotifier {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        max_entries: usize,
        events: Arc<Observers<AuthEvent>>,
    ) -> Self {
        Self {
            storage,
            key: key.into(),
            max_entries: max_entries.max(1),
            entries: Mutex::new(None),
            events,
        }
    }

    pub fn list(&self) -> Vec<Notification> {
        self.with_entries(|entries| (entries.clone(), false))
    }

    pub fn unread_count(&self) -> usize {
        self.with_entries(|entries| (entries.iter().filter(|n| !n.read).count(), false))
    }

    pub fn push(&self, notification: Notification) {
        tracing::debug!(kind = ?notification.kind, "notification pushed");
        let max = self.max_entries;
        self.with_entries(|entries| {
            entries.insert(0, notification);
            entries.truncate(max);
            ((), true)
        })
    }

    /// Returns `false` for unknown ids or already-read notifications.
    pub fn mark_read(&self, id: Uuid) -> bool {
        self.with_entries(|entries| match entries.iter_mut().find(|n| n.id == id && !n.read) {
            Some(n) => {
                n.read = true;
                (true, true)
            }
            None => (false, false),
        })
    }

    pub fn mark_all_read(&self) {
        self.with_entries(|entries| {
            let changed = entries.iter().any(|n| !n.read);
            entries.iter_mut().for_each(|n| n.read = true);
            ((), changed)
        })
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.with_entries(|entries| {
            let before = entries.len();
            entries.retain(|n| n.id != id);
            let removed = entries.len() != before;
            (removed, removed)
        })
    }

    pub fn clear(&self) {
        self.with_entries(|entries| {
            let changed = !entries.is_empty();
            entries.clear();
            ((), changed)
        })
    }

    /// Run `f` over the (lazily hydrated) list. `f` reports whether it
    /// mutated; mutations are persisted and announced after the lock drops.
    fn with_entries<T>(&self, f: impl FnOnce(&mut Vec<Notification>) -> (T, bool)) -> T {
        let (out, unread) = {
            let mut guard = match self.entries.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let entries = guard.get_or_insert_with(|| self.hydrate());

            let (out, mutated) = f(entries);
            if !mutated {
                return out;
            }

            self.persist(entries);
            (out, entries.iter().filter(|n| !n.read).count())
        };

        self.events.publish(&AuthEvent::NotificationsChanged { unread });
        out
    }

    fn hydrate(&self) -> Vec<Notification> {
        let Some(raw) = self.storage.get(&self.key) else {
            return Vec::new();
        };

        match serde_json::from_str::<Vec<Notification>>(&raw) {
            Ok(mut entries) => {
                entries.truncate(self.max_entries);
                entries
            }
            Err(err) => {
                tracing::warn!("discarding corrupt persisted notifications: {err}");
                if let Err(err) = self.storage.remove(&self.key) {
                    tracing::warn!("failed to remove corrupt notifications: {err}");
                }
                Vec::new()
            }
        }
    }

    fn persist(&self, entries: &[Notification]) {
        match serde_json::to_string(entries) {
            Ok(json) => {
                if let Err(err) = self.storage.set(&self.key, &json) {
                    tracing::warn!("failed to persist notifications: {err}");
                }
            }
            Err(err) => tracing::warn!("failed to serialize notifications: {err}"),
        }
    }
}

impl core::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("key", &self.key)
            .field("max_entries", &self.max_entries)
            .finish()
    }
}
