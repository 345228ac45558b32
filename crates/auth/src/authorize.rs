use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::{Action, ModuleGrant, ModuleKey};

/// Ordered, immutable set of module grants.
///
/// Cloning is cheap (shared slice), so readers can hold a whole set while the
/// cache swaps in a new one.
///
/// - No IO
/// - No panics
/// - Default-deny on every miss
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GrantSet {
    grants: Arc<[ModuleGrant]>,
}

impl GrantSet {
    /// Build a set from raw grants.
    ///
    /// Grants without `view` are dropped, duplicates keep their first
    /// occurrence, and the result is stably sorted by `order`.
    pub fn new(grants: impl IntoIterator<Item = ModuleGrant>) -> Self {
        let mut seen: HashSet<ModuleKey> = HashSet::new();
        let mut grants: Vec<ModuleGrant> = grants
            .into_iter()
            .filter(ModuleGrant::is_visible)
            .filter(|g| seen.insert(g.module_key.clone()))
            .collect();
        grants.sort_by_key(|g| g.order);

        Self {
            grants: grants.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[ModuleGrant] {
        &self.grants
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleGrant> {
        self.grants.iter()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn get(&self, module: &str) -> Option<&ModuleGrant> {
        self.grants.iter().find(|g| g.module_key.as_str() == module)
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.get(module).is_some_and(ModuleGrant::is_visible)
    }

    pub fn can(&self, module: &str, action: Action) -> bool {
        self.get(module).is_some_and(|g| g.allows(action))
    }

    /// Keys whose grant was added, removed or changed between `self` and `next`.
    pub fn changed_modules(&self, next: &GrantSet) -> Vec<ModuleKey> {
        let mut changed: Vec<ModuleKey> = Vec::new();

        for grant in next.iter() {
            if self.get(grant.module_key.as_str()) != Some(grant) {
                changed.push(grant.module_key.clone());
            }
        }
        for grant in self.iter() {
            if next.get(grant.module_key.as_str()).is_none() {
                changed.push(grant.module_key.clone());
            }
        }

        changed.sort();
        changed
    }
}

impl From<Vec<ModuleGrant>> for GrantSet {
    fn from(value: Vec<ModuleGrant>) -> Self {
        Self::new(value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (debugging aid)
// ─────────────────────────────────────────────────────────────────────────────

/// Why a module check came out the way it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationExplanation {
    pub module: String,
    pub action: Action,
    pub granted: bool,
    pub reason: String,
    /// Actions the principal does hold on this module.
    pub granted_actions: Vec<Action>,
    pub denial: Option<ModuleDenial>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleDenial {
    EmptyCache,
    ModuleAbsent,
    ActionNotGranted,
}

/// Explain a `can(module, action)` decision against `grants`.
pub fn explain(grants: &GrantSet, module: &str, action: Action) -> AuthorizationExplanation {
    let Some(grant) = grants.get(module) else {
        let (denial, reason) = if grants.is_empty() {
            (
                ModuleDenial::EmptyCache,
                "no permissions are loaded for the current principal".to_string(),
            )
        } else {
            (
                ModuleDenial::ModuleAbsent,
                format!("module '{module}' is not granted to the current principal"),
            )
        };

        return AuthorizationExplanation {
            module: module.to_string(),
            action,
            granted: false,
            reason,
            granted_actions: Vec::new(),
            denial: Some(denial),
        };
    };

    let granted_actions: Vec<Action> = Action::ALL
        .into_iter()
        .filter(|a| grant.allows(*a))
        .collect();
    let granted = grant.allows(action);

    AuthorizationExplanation {
        module: module.to_string(),
        action,
        granted,
        reason: if granted {
            format!("module '{module}' grants '{action}'")
        } else {
            format!(
                "module '{module}' does not grant '{action}'; granted: {:?}",
                granted_actions
            )
        },
        granted_actions,
        denial: (!granted).then_some(ModuleDenial::ActionNotGranted),
    }
}
