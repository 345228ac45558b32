use serde::{Deserialize, Serialize};

/// Global role of a principal.
///
/// The set is closed: the backend assigns exactly one of these per account.
/// Wire names match the backend's `rol` column.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlobalRole {
    #[serde(rename = "super_admin")]
    GlobalAdmin,
    #[serde(rename = "admin")]
    TenantAdmin,
    #[serde(rename = "admin_consorcio")]
    ConsortiumAdmin,
    #[serde(rename = "admin_edificio")]
    BuildingAdmin,
    #[serde(rename = "propietario")]
    Owner,
    #[serde(rename = "inquilino")]
    TenantOccupant,
    #[serde(rename = "proveedor")]
    Provider,
}

impl GlobalRole {
    pub const ALL: [GlobalRole; 7] = [
        GlobalRole::GlobalAdmin,
        GlobalRole::TenantAdmin,
        GlobalRole::ConsortiumAdmin,
        GlobalRole::BuildingAdmin,
        GlobalRole::Owner,
        GlobalRole::TenantOccupant,
        GlobalRole::Provider,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GlobalRole::GlobalAdmin => "super_admin",
            GlobalRole::TenantAdmin => "admin",
            GlobalRole::ConsortiumAdmin => "admin_consorcio",
            GlobalRole::BuildingAdmin => "admin_edificio",
            GlobalRole::Owner => "propietario",
            GlobalRole::TenantOccupant => "inquilino",
            GlobalRole::Provider => "proveedor",
        }
    }
}

impl core::fmt::Display for GlobalRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for GlobalRole {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        GlobalRole::ALL
            .into_iter()
            .find(|role| role.as_str() == value)
            .ok_or(())
    }
}
