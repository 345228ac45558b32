//! `consorcia-auth`: pure module-scoped authorization model.
//!
//! This crate is intentionally decoupled from HTTP, storage and async.

pub mod authorize;
pub mod capability;
pub mod claims;
pub mod modules;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{explain, AuthorizationExplanation, GrantSet, ModuleDenial};
pub use capability::{Capability, CapabilityParseError};
pub use claims::{Credential, CredentialError, TokenClaims};
pub use modules::{ApiModule, ApiModuleRole, MyModulesResponse};
pub use permissions::{Action, ModuleGrant, UnknownAction};
pub use principal::Principal;
pub use roles::GlobalRole;

pub use consorcia_core::{ModuleKey, PrincipalId};
