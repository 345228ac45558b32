use serde::{Deserialize, Serialize};

use crate::{GlobalRole, PrincipalId};

/// The authenticated identity as the backend describes it.
///
/// Replaced wholesale on re-authentication or profile refresh; never patched
/// field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    #[serde(rename = "nombre")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "rol")]
    pub role: GlobalRole,
    #[serde(rename = "aprobado")]
    pub approved: bool,
    #[serde(rename = "activo")]
    pub active: bool,
}

impl Principal {
    /// Both server-supplied flags must hold before any protected page opens.
    pub fn is_cleared(&self) -> bool {
        self.approved && self.active
    }
}
