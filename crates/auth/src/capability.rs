//! `"<module>:<action>"` capability strings used by the render-time view gate.

use thiserror::Error;

use crate::{Action, ModuleKey};

/// A parsed `"<module>:<action>"` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability {
    pub module: ModuleKey,
    pub action: Action,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityParseError {
    #[error("capability '{0}' has no ':' separator")]
    MissingSeparator(String),

    #[error("capability '{0}' has an empty or invalid module")]
    InvalidModule(String),

    #[error("capability '{0}' has an empty action")]
    EmptyAction(String),

    #[error("capability '{input}' names unknown action '{action}'")]
    UnknownAction { input: String, action: String },
}

impl Capability {
    pub fn new(module: ModuleKey, action: Action) -> Self {
        Self { module, action }
    }
}

impl core::str::FromStr for Capability {
    type Err = CapabilityParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (module, action) = input
            .split_once(':')
            .ok_or_else(|| CapabilityParseError::MissingSeparator(input.to_string()))?;

        let module = ModuleKey::new(module.trim())
            .map_err(|_| CapabilityParseError::InvalidModule(input.to_string()))?;

        let action = action.trim();
        if action.is_empty() {
            return Err(CapabilityParseError::EmptyAction(input.to_string()));
        }

        let action = action
            .parse::<Action>()
            .map_err(|e| CapabilityParseError::UnknownAction {
                input: input.to_string(),
                action: e.0,
            })?;

        Ok(Self { module, action })
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.module, self.action)
    }
}
