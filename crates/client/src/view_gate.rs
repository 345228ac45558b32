//! Render-time capability check.
//!
//! A view gate must never take down the view it protects: malformed input is
//! a denial plus a diagnostic, never a panic or an error.

use std::sync::Arc;

use consorcia_auth::Capability;
use consorcia_events::ObserverId;

use crate::context::AuthorizationContext;
use crate::permissions::PermissionCache;

/// May a subtree gated on `capability` (`"<module>:<action>"`) be rendered?
pub fn allows(cache: &PermissionCache, capability: &str) -> bool {
    match capability.parse::<Capability>() {
        Ok(cap) => allows_capability(cache, &cap),
        Err(err) => {
            tracing::warn!("view gate denied malformed capability: {err}");
            false
        }
    }
}

pub fn allows_capability(cache: &PermissionCache, capability: &Capability) -> bool {
    cache.can(capability.module.as_str(), capability.action)
}

/// Re-evaluate `capability` whenever the permission cache is replaced or
/// invalidated, and once immediately. `on_change` receives the fresh answer.
///
/// Returns the observer id; pass it to [`AuthorizationContext::unsubscribe`]
/// when the gated view goes away.
pub fn watch<F>(ctx: &Arc<AuthorizationContext>, capability: &str, on_change: F) -> ObserverId
where
    F: Fn(bool) + Send + Sync + 'static,
{
    let parsed = match capability.parse::<Capability>() {
        Ok(cap) => Some(cap),
        Err(err) => {
            tracing::warn!("view gate watching malformed capability: {err}");
            None
        }
    };

    let evaluate = {
        let ctx = Arc::downgrade(ctx);
        move || match (&parsed, ctx.upgrade()) {
            (Some(cap), Some(ctx)) => allows_capability(ctx.permissions(), cap),
            _ => false,
        }
    };

    on_change(evaluate());

    ctx.subscribe(move |event| {
        if event.affects_permissions() {
            on_change(evaluate());
        }
    })
}
