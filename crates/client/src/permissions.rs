//! Synchronously readable permission cache with a persisted mirror.
//!
//! # Invariants
//! - Readers always see a whole grant set (pre- or post-replace, never a mix).
//! - The cache is stamped with the principal id it was fetched for; it is
//!   never served for anyone else.
//! - A load result is applied only while its ticket is current: no
//!   invalidation happened since it started, no load for another principal
//!   started since, and the session still belongs to that principal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use consorcia_auth::{explain, Action, AuthorizationExplanation, GrantSet, ModuleGrant, PrincipalId};
use consorcia_events::Observers;

use crate::events::AuthEvent;
use crate::storage::KeyValueStore;

/// Persisted form of the cache, stored under one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRecord {
    pub principal_id: PrincipalId,
    pub grants: Vec<ModuleGrant>,
}

#[derive(Debug, Clone)]
struct Entry {
    principal_id: PrincipalId,
    grants: GrantSet,
}

#[derive(Debug, Default)]
struct CacheState {
    entry: Option<Entry>,
    /// Bumped by every invalidation and by loads for a new principal.
    epoch: u64,
    /// Bumped by invalidations only.
    generation: u64,
    latest_request: Option<PrincipalId>,
}

/// Proof that a load was started; checked again when its result arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    epoch: u64,
    principal_id: PrincipalId,
}

impl LoadTicket {
    pub fn principal_id(&self) -> &PrincipalId {
        &self.principal_id
    }
}

/// Result of [`PermissionCache::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// The cache now holds the new set; `previous` is what it replaced for
    /// the same principal (empty if nothing was cached for them).
    Applied { previous: GrantSet },
    Stale,
}

pub struct PermissionCache {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    state: RwLock<CacheState>,
    in_flight: AtomicUsize,
    events: Arc<Observers<AuthEvent>>,
}

impl PermissionCache {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        events: Arc<Observers<AuthEvent>>,
    ) -> Self {
        Self {
            storage,
            key: key.into(),
            state: RwLock::new(CacheState::default()),
            in_flight: AtomicUsize::new(0),
            events,
        }
    }

    // ── reads ──────────────────────────────────────────────────────────────

    /// Whole grant set currently cached (possibly empty).
    pub fn snapshot(&self) -> GrantSet {
        self.read(|s| s.entry.as_ref().map(|e| e.grants.clone()).unwrap_or_default())
    }

    /// Principal the cache is stamped for.
    pub fn stamp(&self) -> Option<PrincipalId> {
        self.read(|s| s.entry.as_ref().map(|e| e.principal_id.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.read(|s| s.entry.as_ref().is_none_or(|e| e.grants.is_empty()))
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.snapshot().has_module(module)
    }

    pub fn can(&self, module: &str, action: Action) -> bool {
        let granted = self.snapshot().can(module, action);
        tracing::trace!(module, %action, granted, "permission lookup");
        granted
    }

    pub fn explain(&self, module: &str, action: Action) -> AuthorizationExplanation {
        explain(&self.snapshot(), module, action)
    }

    /// Navigation menu entries: granted modules in display order.
    pub fn menu(&self) -> Vec<ModuleGrant> {
        self.snapshot().iter().cloned().collect()
    }

    /// Whether a backend fetch is currently outstanding.
    pub fn load_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Changes whenever the cache is invalidated.
    pub(crate) fn generation(&self) -> u64 {
        self.read(|s| s.generation)
    }

    fn read<T>(&self, f: impl FnOnce(&CacheState) -> T) -> T {
        match self.state.read() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut CacheState) -> T) -> T {
        match self.state.write() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    // ── hydration ──────────────────────────────────────────────────────────

    /// Populate an empty cache from the persisted record for `principal_id`.
    ///
    /// A record that fails to parse or is stamped for someone else is removed
    /// and treated as absent. Returns whether the cache now holds an entry
    /// for `principal_id` (which may legitimately have no modules).
    pub fn hydrate(&self, principal_id: &PrincipalId) -> bool {
        let stamped = self.read(|s| (s.entry.as_ref().map(|e| e.principal_id.clone()), s.epoch));
        let epoch = match stamped {
            (Some(stamp), _) if &stamp == principal_id => return true,
            (Some(stamp), _) => {
                tracing::warn!(cached = %stamp, current = %principal_id, "dropping permissions cached for another principal");
                self.invalidate();
                self.read(|s| s.epoch)
            }
            (None, epoch) => epoch,
        };

        let Some(raw) = self.storage.get(&self.key) else {
            tracing::debug!("no persisted permissions to hydrate");
            return false;
        };

        let record: PermissionRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!("discarding corrupt persisted permissions: {err}");
                self.remove_persisted();
                return false;
            }
        };

        if &record.principal_id != principal_id {
            tracing::warn!(
                persisted = %record.principal_id,
                current = %principal_id,
                "discarding persisted permissions stamped for another principal"
            );
            self.remove_persisted();
            return false;
        }

        let grants = GrantSet::new(record.grants);
        let modules = grants.len();

        let installed = self.write(|s| {
            // A load or an invalidation may have landed while we were
            // reading storage.
            if s.entry.is_some() || s.epoch != epoch {
                return false;
            }
            s.entry = Some(Entry {
                principal_id: principal_id.clone(),
                grants,
            });
            true
        });

        if installed {
            tracing::debug!(principal_id = %principal_id, modules, "hydrated permissions from storage");
            self.events.publish(&AuthEvent::PermissionsReplaced {
                principal_id: principal_id.clone(),
                modules,
            });
        }

        self.stamp().as_ref() == Some(principal_id)
    }

    // ── loads ──────────────────────────────────────────────────────────────

    /// Register a load for `principal_id`.
    ///
    /// Starting a load for a different principal than the last one requested
    /// retires every earlier ticket.
    pub fn begin_load(&self, principal_id: &PrincipalId) -> LoadTicket {
        self.write(|s| {
            if s.latest_request.as_ref() != Some(principal_id) {
                s.epoch += 1;
                s.latest_request = Some(principal_id.clone());
            }
            LoadTicket {
                epoch: s.epoch,
                principal_id: principal_id.clone(),
            }
        })
    }

    pub(crate) fn in_flight_guard(&self) -> InFlightGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard { cache: self }
    }

    /// Atomically replace the cache with `grants` if `ticket` is still current
    /// and `session_principal` is the ticket's principal.
    pub fn apply(
        &self,
        ticket: &LoadTicket,
        session_principal: Option<&PrincipalId>,
        grants: GrantSet,
    ) -> ApplyResult {
        let modules = grants.len();
        let record = PermissionRecord {
            principal_id: ticket.principal_id.clone(),
            grants: grants.as_slice().to_vec(),
        };

        let outcome = self.write(|s| {
            let current = s.epoch == ticket.epoch
                && s.latest_request.as_ref() == Some(&ticket.principal_id)
                && session_principal == Some(&ticket.principal_id);
            if !current {
                return ApplyResult::Stale;
            }

            let previous = match s.entry.take() {
                Some(e) if e.principal_id == ticket.principal_id => e.grants,
                _ => GrantSet::empty(),
            };
            s.entry = Some(Entry {
                principal_id: ticket.principal_id.clone(),
                grants,
            });

            // Persist under the lock so an invalidate cannot interleave
            // between the memory swap and the mirror write.
            self.persist(&record);

            ApplyResult::Applied { previous }
        });

        match &outcome {
            ApplyResult::Applied { .. } => {
                tracing::info!(principal_id = %ticket.principal_id, modules, "permissions replaced");
                self.events.publish(&AuthEvent::PermissionsReplaced {
                    principal_id: ticket.principal_id.clone(),
                    modules,
                });
            }
            ApplyResult::Stale => {
                tracing::debug!(principal_id = %ticket.principal_id, "discarding stale permission load");
            }
        }

        outcome
    }

    // ── invalidation ───────────────────────────────────────────────────────

    /// Clear memory and the persisted mirror; retire in-flight loads.
    pub fn invalidate(&self) {
        self.clear_quiet();
        self.events.publish(&AuthEvent::PermissionsInvalidated);
    }

    /// Clear without publishing; the caller publishes once its own locks
    /// are released.
    pub(crate) fn clear_quiet(&self) {
        self.write(|s| {
            s.entry = None;
            s.epoch += 1;
            s.generation += 1;
            s.latest_request = None;
            self.remove_persisted();
        });
        tracing::debug!("permission cache invalidated");
    }

    fn persist(&self, record: &PermissionRecord) {
        match serde_json::to_string(record) {
            Ok(json) => {
                if let Err(err) = self.storage.set(&self.key, &json) {
                    tracing::warn!("failed to persist permissions: {err}");
                }
            }
            Err(err) => tracing::warn!("failed to serialize permissions: {err}"),
        }
    }

    fn remove_persisted(&self) {
        if let Err(err) = self.storage.remove(&self.key) {
            tracing::warn!("failed to remove persisted permissions: {err}");
        }
    }
}

impl core::fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PermissionCache")
            .field("key", &self.key)
            .field("stamp", &self.stamp())
            .field("in_flight", &self.load_in_flight())
            .finish()
    }
}

pub(crate) struct InFlightGuard<'a> {
    cache: &'a PermissionCache,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.cache.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
