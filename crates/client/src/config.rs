//! Client configuration (routes, storage keys, backend location).

use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Navigation targets used by the gatekeepers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateRoutes {
    pub login_path: String,
    pub pending_approval_path: String,
    /// Where authenticated but insufficiently privileged principals land.
    pub landing_path: String,
    /// Query parameter carrying the originally requested path to the login page.
    pub return_param: String,
}

impl Default for GateRoutes {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            pending_approval_path: "/pending-approval".to_string(),
            landing_path: "/dashboard".to_string(),
            return_param: "returnUrl".to_string(),
        }
    }
}

/// Keys of the independent persisted records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub session: String,
    pub permissions: String,
    pub notifications: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            session: "consorcia.session".to_string(),
            permissions: "consorcia.permissions".to_string(),
            notifications: "consorcia.notifications".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the backend API (no trailing slash).
    pub api_url: String,
    /// Directory for the file-backed store; `None` uses the OS data dir.
    pub data_dir: Option<PathBuf>,
    pub routes: GateRoutes,
    pub storage_keys: StorageKeys,
    pub max_notifications: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000/api".to_string(),
            data_dir: None,
            routes: GateRoutes::default(),
            storage_keys: StorageKeys::default(),
            max_notifications: 50,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `CONSORCIA_API_URL`, `CONSORCIA_DATA_DIR` and
    /// `CONSORCIA_MAX_NOTIFICATIONS`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Self::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("CONSORCIA_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }

        if let Some(dir) = lookup("CONSORCIA_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(max) = lookup("CONSORCIA_MAX_NOTIFICATIONS") {
            config.max_notifications = max
                .parse()
                .with_context(|| format!("CONSORCIA_MAX_NOTIFICATIONS is not a number: {max:?}"))?;
        }

        Ok(config)
    }
}
