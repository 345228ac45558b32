use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ModuleKey;

/// Operation a principal may perform inside a module.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[serde(alias = "ver")]
    View,
    #[serde(alias = "crear")]
    Create,
    #[serde(alias = "editar")]
    Edit,
    #[serde(alias = "eliminar")]
    Delete,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Create, Action::Edit, Action::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }

    /// Token used by the backend and by route annotations (`ver`, `crear`, ...).
    pub fn backend_token(self) -> &'static str {
        match self {
            Action::View => "ver",
            Action::Create => "crear",
            Action::Edit => "editar",
            Action::Delete => "eliminar",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Action {
    type Err = UnknownAction;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "view" | "ver" => Ok(Action::View),
            "create" | "crear" => Ok(Action::Create),
            "edit" | "editar" => Ok(Action::Edit),
            "delete" | "eliminar" => Ok(Action::Delete),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Per-module grant for the current principal.
///
/// Field names match the persisted permission record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleGrant {
    pub module_key: ModuleKey,
    pub view: bool,
    pub create: bool,
    pub edit: bool,
    pub delete: bool,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub requires_consortium_context: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl ModuleGrant {
    /// View-only grant with no display metadata.
    pub fn view_only(module_key: ModuleKey) -> Self {
        Self {
            module_key,
            view: true,
            create: false,
            edit: false,
            delete: false,
            order: 0,
            requires_consortium_context: false,
            name: None,
            icon: None,
        }
    }

    /// A grant without `view` is treated as absent, whatever else it carries.
    pub fn is_visible(&self) -> bool {
        self.view
    }

    pub fn allows(&self, action: Action) -> bool {
        if !self.is_visible() {
            return false;
        }

        match action {
            Action::View => self.view,
            Action::Create => self.create,
            Action::Edit => self.edit,
            Action::Delete => self.delete,
        }
    }
}
