//! `consorcia-client`
//!
//! **Responsibility:** client-side, module-scoped authorization engine.
//!
//! This crate provides:
//! - A persisted session store (principal + bearer credential)
//! - A synchronously readable permission cache with a persisted mirror
//! - A permission loader that applies backend results only while they still
//!   belong to the current principal
//! - Navigation gatekeepers, a render-time view gate and a change notifier
//!
//! Everything hangs off an explicitly constructed [`AuthorizationContext`].

pub mod backend;
pub mod config;
pub mod context;
pub mod events;
pub mod gatekeeper;
pub mod loader;
pub mod notifier;
pub mod permissions;
pub mod session;
pub mod storage;
pub mod view_gate;

pub use backend::{AuthBackend, BackendError, HttpBackend};
pub use config::{ClientConfig, GateRoutes, StorageKeys};
pub use context::{AuthorizationContext, RefreshError};
pub use events::AuthEvent;
pub use gatekeeper::{
    evaluate, AuthenticationGatekeeper, DenialKind, GateDecision, Gatekeeper, ModuleGatekeeper,
    Redirect, RoleGatekeeper, RouteData, RouteRequest,
};
pub use loader::{LoadOutcome, LoaderError, PermissionLoader};
pub use notifier::{ChangeNotifier, Notification, NotificationKind, NotificationPriority};
pub use permissions::{PermissionCache, PermissionRecord};
pub use session::{SessionRecord, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
