//! Authorization state-change events.

use consorcia_auth::{Principal, PrincipalId};

/// Published on the context's observer list, synchronously and in
/// registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A session was set (`Some`) or cleared (`None`).
    PrincipalChanged(Option<Principal>),
    /// The permission cache was atomically replaced.
    PermissionsReplaced {
        principal_id: PrincipalId,
        modules: usize,
    },
    /// The permission cache was emptied (logout, role change, account switch).
    PermissionsInvalidated,
    NotificationsChanged { unread: usize },
}

impl AuthEvent {
    /// Whether a view gate should re-evaluate after this event.
    pub fn affects_permissions(&self) -> bool {
        matches!(
            self,
            AuthEvent::PermissionsReplaced { .. } | AuthEvent::PermissionsInvalidated
        )
    }
}
