//! Persisted session: current principal + bearer credential.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use consorcia_auth::{Credential, Principal, PrincipalId};
use consorcia_events::Observers;

use crate::events::AuthEvent;
use crate::permissions::PermissionCache;
use crate::storage::KeyValueStore;

/// The one persisted unit holding both halves of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: Credential,
    pub principal: Principal,
}

#[derive(Debug, Default)]
struct SessionState {
    hydrated: bool,
    current: Option<SessionRecord>,
}

/// Single source of truth for who is signed in.
///
/// Reads are synchronous and never touch storage after the first one.
/// Writes persist the whole record and keep the permission cache in step:
/// a session for a different principal never sees the previous principal's
/// grants.
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    state: RwLock<SessionState>,
    permissions: Arc<PermissionCache>,
    events: Arc<Observers<AuthEvent>>,
}

impl SessionStore {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        permissions: Arc<PermissionCache>,
        events: Arc<Observers<AuthEvent>>,
    ) -> Self {
        Self {
            storage,
            key: key.into(),
            state: RwLock::new(SessionState::default()),
            permissions,
            events,
        }
    }

    /// Store `credential` and `principal` as one record, replacing any prior
    /// session and any cached permissions.
    pub fn set_session(&self, credential: Credential, principal: Principal) {
        let record = SessionRecord {
            token: credential,
            principal: principal.clone(),
        };

        let dropped = self.with_state(|s| {
            s.hydrated = true;
            let had_session = s.current.replace(record.clone()).is_some();
            self.persist(&record);

            // Grants never outlive the login they were fetched for, even for
            // the same identity: the role may have changed in between.
            let had_grants = self.permissions.stamp().is_some();
            self.permissions.clear_quiet();
            had_session || had_grants
        });

        tracing::info!(principal_id = %principal.id, role = %principal.role, "session set");

        if dropped {
            self.events.publish(&AuthEvent::PermissionsInvalidated);
        }
        self.events.publish(&AuthEvent::PrincipalChanged(Some(principal)));
    }

    /// Swap in a refreshed principal while keeping the credential.
    ///
    /// Returns `false` (and changes nothing) when there is no session or the
    /// refreshed principal is a different identity.
    pub fn replace_principal(&self, principal: Principal) -> bool {
        let replaced = self.with_state(|s| {
            let Some(current) = s.current.as_mut() else {
                return false;
            };
            if current.principal.id != principal.id {
                return false;
            }
            current.principal = principal.clone();
            let record = current.clone();
            self.persist(&record);
            true
        });

        if replaced {
            tracing::debug!(principal_id = %principal.id, "principal refreshed");
            self.events.publish(&AuthEvent::PrincipalChanged(Some(principal)));
        }
        replaced
    }

    /// Remove credential, principal and cached permissions together.
    pub fn clear_session(&self) {
        let had_session = self.with_state(|s| {
            s.hydrated = true;
            let had = s.current.take().is_some();
            if let Err(err) = self.storage.remove(&self.key) {
                tracing::warn!("failed to remove persisted session: {err}");
            }
            self.permissions.clear_quiet();
            had
        });

        if had_session {
            tracing::info!("session cleared");
        }
        self.events.publish(&AuthEvent::PermissionsInvalidated);
        self.events.publish(&AuthEvent::PrincipalChanged(None));
    }

    pub fn current_principal(&self) -> Option<Principal> {
        self.read(|r| r.map(|r| r.principal.clone()))
    }

    pub fn current_principal_id(&self) -> Option<PrincipalId> {
        self.read(|r| r.map(|r| r.principal.id.clone()))
    }

    pub fn current_credential(&self) -> Option<Credential> {
        self.read(|r| r.map(|r| r.token.clone()))
    }

    /// A credential is present and not past its embedded expiry.
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Utc::now())
    }

    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        self.read(|r| r.is_some_and(|r| !r.token.is_expired_at(now)))
    }

    fn read<T>(&self, f: impl FnOnce(Option<&SessionRecord>) -> T) -> T {
        self.ensure_hydrated();
        match self.state.read() {
            Ok(state) => f(state.current.as_ref()),
            Err(poisoned) => f(poisoned.into_inner().current.as_ref()),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SessionState) -> T) -> T {
        match self.state.write() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Load the persisted record once. A corrupt record means "no session".
    fn ensure_hydrated(&self) {
        let hydrated = match self.state.read() {
            Ok(state) => state.hydrated,
            Err(poisoned) => poisoned.into_inner().hydrated,
        };
        if hydrated {
            return;
        }

        self.with_state(|s| {
            if s.hydrated {
                return;
            }
            s.hydrated = true;

            let Some(raw) = self.storage.get(&self.key) else {
                return;
            };

            match serde_json::from_str::<SessionRecord>(&raw) {
                Ok(record) => {
                    tracing::debug!(principal_id = %record.principal.id, "session hydrated from storage");
                    s.current = Some(record);
                }
                Err(err) => {
                    tracing::warn!("discarding corrupt persisted session: {err}");
                    if let Err(err) = self.storage.remove(&self.key) {
                        tracing::warn!("failed to remove corrupt session record: {err}");
                    }
                }
            }
        });
    }

    fn persist(&self, record: &SessionRecord) {
        match serde_json::to_string(record) {
            Ok(json) => {
                if let Err(err) = self.storage.set(&self.key, &json) {
                    tracing::warn!("failed to persist session: {err}");
                }
            }
            Err(err) => tracing::warn!("failed to serialize session: {err}"),
        }
    }
}

impl core::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionStore")
            .field("key", &self.key)
            .field("principal_id", &self.current_principal_id())
            .finish()
    }
}
