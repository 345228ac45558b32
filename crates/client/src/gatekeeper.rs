//! Navigation-time gatekeepers.
//!
//! Each gatekeeper is a synchronous decision over the context's current
//! state and the route's declared requirements. None of them waits: a
//! permission set that has not arrived yet means "deny" for module checks,
//! not "hold the navigation".

use serde::{Deserialize, Serialize};

use consorcia_auth::{Action, GlobalRole, ModuleKey};

use crate::context::AuthorizationContext;

/// Requirements a route declares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteData {
    /// Allowed global roles; empty means any role.
    #[serde(default)]
    pub roles: Vec<GlobalRole>,
    #[serde(default)]
    pub module: Option<ModuleKey>,
    /// Defaults to [`Action::View`] when a module is declared.
    #[serde(default)]
    pub action: Option<Action>,
}

impl RouteData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roles(mut self, roles: impl IntoIterator<Item = GlobalRole>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn module(mut self, module: ModuleKey) -> Self {
        self.module = Some(module);
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }
}

/// A navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub path: String,
    pub data: RouteData,
}

impl RouteRequest {
    pub fn new(path: impl Into<String>, data: RouteData) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Redirect {
    pub fn to(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    Unauthenticated,
    PendingApproval,
    InsufficientRole,
    InsufficientModulePermission,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny { reason: DenialKind, redirect: Redirect },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }

    pub fn redirect(&self) -> Option<&Redirect> {
        match self {
            GateDecision::Allow => None,
            GateDecision::Deny { redirect, .. } => Some(redirect),
        }
    }

    pub fn reason(&self) -> Option<DenialKind> {
        match self {
            GateDecision::Allow => None,
            GateDecision::Deny { reason, .. } => Some(*reason),
        }
    }
}

/// Decision contract shared by all gatekeepers.
pub trait Gatekeeper {
    fn name(&self) -> &'static str;

    fn check(&self, ctx: &AuthorizationContext, route: &RouteRequest) -> GateDecision;
}

/// Requires a live credential and an approved, active principal.
#[derive(Debug, Default, Copy, Clone)]
pub struct AuthenticationGatekeeper;

/// Requires the principal's global role to be in the route's allow-list.
#[derive(Debug, Default, Copy, Clone)]
pub struct RoleGatekeeper;

/// Requires the route's `(module, action)` grant.
#[derive(Debug, Default, Copy, Clone)]
pub struct ModuleGatekeeper;

impl Gatekeeper for AuthenticationGatekeeper {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn check(&self, ctx: &AuthorizationContext, route: &RouteRequest) -> GateDecision {
        let routes = &ctx.config().routes;
        let session = ctx.session();

        if !session.is_authenticated() {
            tracing::debug!(path = %route.path, "unauthenticated; redirecting to login");
            return GateDecision::Deny {
                reason: DenialKind::Unauthenticated,
                redirect: Redirect::to(routes.login_path.clone())
                    .with_query(routes.return_param.clone(), route.path.clone()),
            };
        }

        match session.current_principal() {
            Some(principal) if principal.is_cleared() => {}
            Some(principal) => {
                tracing::info!(
                    principal_id = %principal.id,
                    approved = principal.approved,
                    active = principal.active,
                    "principal not cleared; redirecting to pending approval"
                );
                return GateDecision::Deny {
                    reason: DenialKind::PendingApproval,
                    redirect: Redirect::to(routes.pending_approval_path.clone()),
                };
            }
            None => {
                return GateDecision::Deny {
                    reason: DenialKind::Unauthenticated,
                    redirect: Redirect::to(routes.login_path.clone())
                        .with_query(routes.return_param.clone(), route.path.clone()),
                };
            }
        }

        // Side effect only; this decision does not wait for it.
        ctx.ensure_permissions();

        GateDecision::Allow
    }
}

impl Gatekeeper for RoleGatekeeper {
    fn name(&self) -> &'static str {
        "role"
    }

    fn check(&self, ctx: &AuthorizationContext, route: &RouteRequest) -> GateDecision {
        let allowed = &route.data.roles;
        if allowed.is_empty() {
            return GateDecision::Allow;
        }

        let routes = &ctx.config().routes;
        let Some(principal) = ctx.session().current_principal() else {
            return GateDecision::Deny {
                reason: DenialKind::Unauthenticated,
                redirect: Redirect::to(routes.login_path.clone())
                    .with_query(routes.return_param.clone(), route.path.clone()),
            };
        };

        if allowed.contains(&principal.role) {
            return GateDecision::Allow;
        }

        tracing::warn!(
            principal_id = %principal.id,
            role = %principal.role,
            path = %route.path,
            "role not allowed for route"
        );
        GateDecision::Deny {
            reason: DenialKind::InsufficientRole,
            redirect: Redirect::to(routes.landing_path.clone()),
        }
    }
}

impl Gatekeeper for ModuleGatekeeper {
    fn name(&self) -> &'static str {
        "module"
    }

    fn check(&self, ctx: &AuthorizationContext, route: &RouteRequest) -> GateDecision {
        // Unannotated routes stay open.
        let Some(module) = &route.data.module else {
            return GateDecision::Allow;
        };
        let action = route.data.action.unwrap_or(Action::View);

        if ctx.permissions().can(module.as_str(), action) {
            return GateDecision::Allow;
        }

        tracing::warn!(
            module = %module,
            %action,
            path = %route.path,
            loading = ctx.permissions().load_in_flight(),
            "module permission missing for route"
        );
        GateDecision::Deny {
            reason: DenialKind::InsufficientModulePermission,
            redirect: Redirect::to(ctx.config().routes.landing_path.clone()),
        }
    }
}

/// Run authentication → role → module; the first denial wins.
pub fn evaluate(ctx: &AuthorizationContext, route: &RouteRequest) -> GateDecision {
    let chain: [&dyn Gatekeeper; 3] = [&AuthenticationGatekeeper, &RoleGatekeeper, &ModuleGatekeeper];

    for gate in chain {
        let decision = gate.check(ctx, route);
        if !decision.is_allowed() {
            tracing::debug!(gate = gate.name(), path = %route.path, "navigation denied");
            return decision;
        }
    }

    GateDecision::Allow
}
