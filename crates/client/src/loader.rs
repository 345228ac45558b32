//! Permission loader: backend fetch → atomic cache replacement.

use std::sync::Arc;

use thiserror::Error;

use consorcia_auth::{GrantSet, PrincipalId};

use crate::backend::{AuthBackend, BackendError};
use crate::permissions::{ApplyResult, PermissionCache};
use crate::session::SessionStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoaderError {
    #[error("no session for the requested principal")]
    NoSession,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// What a `load` did to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The cache now holds `current`; `previous` is what it held for the same
    /// principal before (empty on first load).
    Applied { previous: GrantSet, current: GrantSet },
    /// The result arrived after logout, account switch or invalidation and was
    /// dropped.
    Discarded,
    /// Fetch failed; the cache is unchanged.
    Failed(LoaderError),
}

impl LoadOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, LoadOutcome::Applied { .. })
    }
}

pub struct PermissionLoader {
    backend: Arc<dyn AuthBackend>,
    session: Arc<SessionStore>,
    cache: Arc<PermissionCache>,
}

impl PermissionLoader {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        session: Arc<SessionStore>,
        cache: Arc<PermissionCache>,
    ) -> Self {
        Self {
            backend,
            session,
            cache,
        }
    }

    /// Fetch the grant set for `principal_id` and apply it if it still
    /// belongs to the current session when it arrives.
    pub async fn load(&self, principal_id: &PrincipalId) -> LoadOutcome {
        let credential = match (self.session.current_principal_id(), self.session.current_credential()) {
            (Some(current), Some(credential)) if &current == principal_id => credential,
            _ => {
                tracing::debug!(principal_id = %principal_id, "load requested without a matching session");
                return LoadOutcome::Failed(LoaderError::NoSession);
            }
        };

        let ticket = self.cache.begin_load(principal_id);
        let fetched = {
            let _in_flight = self.cache.in_flight_guard();
            self.backend.fetch_modules(&credential).await
        };

        let grants = match fetched {
            Ok(response) => response.into_grants(),
            Err(err) => {
                tracing::warn!(principal_id = %principal_id, "permission fetch failed; keeping cached permissions: {err}");
                return LoadOutcome::Failed(LoaderError::Backend(err));
            }
        };

        let session_principal = self.session.current_principal_id();
        match self.cache.apply(&ticket, session_principal.as_ref(), grants.clone()) {
            ApplyResult::Applied { previous } => LoadOutcome::Applied {
                previous,
                current: grants,
            },
            ApplyResult::Stale => LoadOutcome::Discarded,
        }
    }
}

impl core::fmt::Debug for PermissionLoader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PermissionLoader")
            .field("cache", &self.cache)
            .finish()
    }
}
