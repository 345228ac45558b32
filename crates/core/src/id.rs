//! Strongly-typed identifiers shared by the authorization crates.

use core::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DomainError;

/// Identity of an authenticated principal, as issued by the backend.
///
/// The backend is free to use numeric or string identifiers; both are
/// normalized into their decimal/string form so that the permission cache
/// stamp and the session principal can be compared directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

/// Stable key of a functional module (e.g. `"consorcios"`, `"tickets"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleKey(String);

macro_rules! impl_string_newtype {
    ($t:ident, $name:literal, $valid:expr) => {
        impl $t {
            /// Validate and wrap an identifier.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                let check: fn(&str) -> bool = $valid;
                if value.is_empty() || !check(&value) {
                    return Err(DomainError::invalid_id(format!("{}: {:?}", $name, value)));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_string_newtype!(PrincipalId, "PrincipalId", |s| !s.chars().any(char::is_whitespace));
impl_string_newtype!(ModuleKey, "ModuleKey", |s| {
    !s.contains(':') && !s.chars().any(char::is_whitespace)
});

impl<'de> Deserialize<'de> for PrincipalId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        let raw = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Unsigned(n) => n.to_string(),
            Raw::Signed(n) => n.to_string(),
        };

        PrincipalId::new(raw).map_err(serde::de::Error::custom)
    }
}

impl From<u64> for PrincipalId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}
