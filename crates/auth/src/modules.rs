//! Backend module listing (`GET /modulos/mis-modulos`) and its normalization
//! into grants.

use serde::{Deserialize, Serialize};

use crate::{GrantSet, ModuleGrant, ModuleKey};

/// Response envelope of the module listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MyModulesResponse {
    pub success: bool,
    #[serde(default)]
    pub rol: Option<String>,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub data: Vec<ApiModule>,
}

/// A module as the backend describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiModule {
    /// Raw module key; validated when mapped to a grant.
    pub clave: String,
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub icono: Option<String>,
    #[serde(default)]
    pub orden: i32,
    #[serde(default = "default_true")]
    pub activo: bool,
    #[serde(default)]
    pub requiere_consorcio: bool,
    #[serde(default)]
    pub modulo_roles: Vec<ApiModuleRole>,
}

/// Permission row for the caller's current role (the backend sends one).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiModuleRole {
    #[serde(default)]
    pub puede_ver: bool,
    #[serde(default)]
    pub puede_crear: bool,
    #[serde(default)]
    pub puede_editar: bool,
    #[serde(default)]
    pub puede_eliminar: bool,
}

fn default_true() -> bool {
    true
}

impl ApiModule {
    /// Map to a grant, or `None` when the module must not reach the client:
    /// inactive, without a role row, without `puede_ver`, or with a key that
    /// is not a valid module key.
    pub fn to_grant(&self) -> Option<ModuleGrant> {
        if !self.activo {
            return None;
        }

        let module_key = match ModuleKey::new(self.clave.as_str()) {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(clave = %self.clave, "dropping module with unusable key: {err}");
                return None;
            }
        };

        let role = self.modulo_roles.first()?;
        if !role.puede_ver {
            return None;
        }

        Some(ModuleGrant {
            module_key,
            view: role.puede_ver,
            create: role.puede_crear,
            edit: role.puede_editar,
            delete: role.puede_eliminar,
            order: self.orden,
            requires_consortium_context: self.requiere_consorcio,
            name: self.nombre.clone(),
            icon: self.icono.clone(),
        })
    }
}

impl MyModulesResponse {
    /// Normalize the listing into an ordered grant set.
    pub fn into_grants(self) -> GrantSet {
        let total = self.data.len();
        let grants: Vec<ModuleGrant> = self.data.iter().filter_map(ApiModule::to_grant).collect();

        if grants.len() != total {
            tracing::debug!(
                kept = grants.len(),
                dropped = total - grants.len(),
                "filtered module listing"
            );
        }

        GrantSet::new(grants)
    }
}
