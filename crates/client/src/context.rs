//! Explicitly constructed authorization context.
//!
//! Owns the session store, permission cache, loader and notifier for one
//! application instance. Gatekeepers and the view gate borrow it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use consorcia_auth::{Action, Credential, Principal, PrincipalId};
use consorcia_events::{ObserverId, Observers, Subscription};

use crate::backend::{AuthBackend, BackendError};
use crate::config::ClientConfig;
use crate::events::AuthEvent;
use crate::loader::{LoadOutcome, LoaderError, PermissionLoader};
use crate::notifier::{ChangeNotifier, Notification, NotificationKind, NotificationPriority};
use crate::permissions::PermissionCache;
use crate::session::SessionStore;
use crate::storage::KeyValueStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no active session")]
    NoSession,

    #[error("session changed while the profile was in flight")]
    SessionChanged,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct AuthorizationContext {
    config: ClientConfig,
    events: Arc<Observers<AuthEvent>>,
    session: Arc<SessionStore>,
    permissions: Arc<PermissionCache>,
    loader: Arc<PermissionLoader>,
    notifier: Arc<ChangeNotifier>,
    backend: Arc<dyn AuthBackend>,
    /// Principal and cache generation of the scheduled background load.
    background_load: Arc<Mutex<Option<(PrincipalId, u64)>>>,
    disposed: AtomicBool,
}

impl AuthorizationContext {
    /// Build a context and hydrate the session and permissions from storage.
    pub fn new(
        config: ClientConfig,
        storage: Arc<dyn KeyValueStore>,
        backend: Arc<dyn AuthBackend>,
    ) -> Arc<Self> {
        let events: Arc<Observers<AuthEvent>> = Arc::new(Observers::new());
        let keys = &config.storage_keys;

        let permissions = Arc::new(PermissionCache::new(
            storage.clone(),
            keys.permissions.clone(),
            events.clone(),
        ));
        let session = Arc::new(SessionStore::new(
            storage.clone(),
            keys.session.clone(),
            permissions.clone(),
            events.clone(),
        ));
        let notifier = Arc::new(ChangeNotifier::new(
            storage,
            keys.notifications.clone(),
            config.max_notifications,
            events.clone(),
        ));
        let loader = Arc::new(PermissionLoader::new(
            backend.clone(),
            session.clone(),
            permissions.clone(),
        ));

        let ctx = Arc::new(Self {
            config,
            events,
            session,
            permissions,
            loader,
            notifier,
            backend,
            background_load: Arc::new(Mutex::new(None)),
            disposed: AtomicBool::new(false),
        });

        ctx.hydrate();
        ctx
    }

    /// Restore permissions persisted for the persisted principal, if any.
    fn hydrate(&self) {
        match self.session.current_principal_id() {
            Some(principal_id) => {
                self.permissions.hydrate(&principal_id);
            }
            // Without a session, any persisted grants are orphans.
            None => self.permissions.clear_quiet(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn permissions(&self) -> &PermissionCache {
        &self.permissions
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn loader(&self) -> &PermissionLoader {
        &self.loader
    }

    /// Shorthand for `permissions().can(..)`.
    pub fn can(&self, module: &str, action: Action) -> bool {
        self.permissions.can(module, action)
    }

    // ── observers ──────────────────────────────────────────────────────────

    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn channel(&self) -> Subscription<AuthEvent> {
        self.events.channel()
    }

    // ── lifecycle ──────────────────────────────────────────────────────────

    /// Record a successful authentication. Permissions load lazily on the
    /// first protected navigation.
    pub fn login(&self, credential: Credential, principal: Principal) {
        let pending = !principal.is_cleared();
        self.session.set_session(credential, principal);

        if pending {
            self.notifier.push(
                Notification::new(
                    NotificationKind::PendingApproval,
                    NotificationPriority::Normal,
                    "Cuenta pendiente de aprobación",
                    "Un administrador debe aprobar tu cuenta antes de continuar.",
                )
                .with_route(self.config.routes.pending_approval_path.clone()),
            );
        }
    }

    pub fn logout(&self) {
        self.session.clear_session();
    }

    /// Drop every observer and stop spawning background loads.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.events.clear();
        tracing::debug!("authorization context disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    // ── permission loading ─────────────────────────────────────────────────

    /// Load permissions for the current principal and wait for the outcome.
    pub async fn load_permissions(&self) -> LoadOutcome {
        let Some(principal_id) = self.session.current_principal_id() else {
            return LoadOutcome::Failed(LoaderError::NoSession);
        };
        load_and_notify(&self.loader, &self.notifier, &principal_id).await
    }

    /// Make permissions available without blocking the caller.
    ///
    /// Hydrates from storage when nothing is cached for the current principal;
    /// if still nothing, spawns a background load on the ambient tokio runtime.
    pub fn ensure_permissions(&self) {
        let Some(principal_id) = self.session.current_principal_id() else {
            return;
        };

        if self.permissions.hydrate(&principal_id) {
            return;
        }

        if self.is_disposed() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no async runtime; permission load deferred");
            return;
        };

        // One load per principal per cache generation. A load left hanging
        // by a previous login never blocks the next one.
        let key = (principal_id.clone(), self.permissions.generation());
        {
            let mut scheduled = lock(&self.background_load);
            if scheduled.as_ref() == Some(&key) {
                tracing::trace!("permission load already scheduled");
                return;
            }
            *scheduled = Some(key.clone());
        }

        let loader = Arc::clone(&self.loader);
        let notifier = Arc::clone(&self.notifier);
        let scheduled = Arc::clone(&self.background_load);

        handle.spawn(async move {
            let outcome = load_and_notify(&loader, &notifier, &principal_id).await;
            {
                let mut scheduled = lock(&scheduled);
                if scheduled.as_ref() == Some(&key) {
                    *scheduled = None;
                }
            }
            tracing::debug!(principal_id = %principal_id, applied = outcome.is_applied(), "background permission load finished");
        });
    }

    // ── profile refresh ────────────────────────────────────────────────────

    /// Re-read the principal from the backend and react to role or approval
    /// changes.
    pub async fn refresh_profile(&self) -> Result<Principal, RefreshError> {
        let (Some(before), Some(credential)) = (
            self.session.current_principal(),
            self.session.current_credential(),
        ) else {
            return Err(RefreshError::NoSession);
        };

        let fresh = self.backend.fetch_profile(&credential).await?;

        // Logout or account switch while the request was out.
        if self.session.current_credential().as_ref() != Some(&credential) {
            return Err(RefreshError::SessionChanged);
        }

        if fresh.id != before.id {
            tracing::warn!(before = %before.id, after = %fresh.id, "profile identity changed; resetting session");
            self.session.set_session(credential, fresh.clone());
            return Ok(fresh);
        }

        self.session.replace_principal(fresh.clone());

        if !before.approved && fresh.approved {
            self.notifier.push(Notification::new(
                NotificationKind::Approved,
                NotificationPriority::High,
                "Cuenta aprobada",
                "Tu cuenta fue aprobada. Ya podés acceder al sistema.",
            ));
        }

        if before.role != fresh.role {
            tracing::info!(from = %before.role, to = %fresh.role, "role changed; reloading permissions");
            self.permissions.invalidate();
            self.notifier.push(Notification::new(
                NotificationKind::RoleChanged,
                NotificationPriority::High,
                "Tu rol cambió",
                format!("Tu rol ahora es {}.", fresh.role),
            ));
            match self.load_permissions().await {
                LoadOutcome::Applied { current, .. } => {
                    tracing::debug!(principal_id = %fresh.id, modules = current.len(), "permissions reloaded after role change");
                }
                LoadOutcome::Discarded => {
                    tracing::debug!(principal_id = %fresh.id, "permission reload after role change discarded");
                }
                LoadOutcome::Failed(err) => {
                    tracing::warn!(principal_id = %fresh.id, "permission reload after role change failed: {err}");
                }
            }
        }

        Ok(fresh)
    }
}

/// Run a load and turn a changed grant set into a notification.
async fn load_and_notify(
    loader: &PermissionLoader,
    notifier: &ChangeNotifier,
    principal_id: &PrincipalId,
) -> LoadOutcome {
    let outcome = loader.load(principal_id).await;

    if let LoadOutcome::Applied { previous, current } = &outcome {
        if !previous.is_empty() {
            let changed = previous.changed_modules(current);
            if !changed.is_empty() {
                let names: Vec<&str> = changed.iter().map(|k| k.as_str()).collect();
                notifier.push(Notification::new(
                    NotificationKind::PermissionsChanged,
                    NotificationPriority::Normal,
                    "Tus permisos cambiaron",
                    format!("Módulos afectados: {}", names.join(", ")),
                ));
            }
        }
    }

    outcome
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl core::fmt::Debug for AuthorizationContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthorizationContext")
            .field("session", &self.session)
            .field("permissions", &self.permissions)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
