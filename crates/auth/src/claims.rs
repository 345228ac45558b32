use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque bearer credential.
///
/// The engine never verifies the signature; it only decodes the payload to
/// learn when the token stops being worth presenting.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

/// The subset of token claims the client inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub subject: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("token is not a three-segment JWT")]
    Malformed,

    #[error("token payload is not valid base64url JSON")]
    UndecodablePayload,

    #[error("token payload carries no usable `exp` claim")]
    MissingExpiry,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for the request-signing collaborator only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Decode the embedded claims without verifying the signature.
    pub fn claims(&self) -> Result<TokenClaims, CredentialError> {
        let mut segments = self.0.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(CredentialError::Malformed);
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| CredentialError::UndecodablePayload)?;
        let json: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|_| CredentialError::UndecodablePayload)?;

        let expires_at = timestamp_claim(&json, "exp").ok_or(CredentialError::MissingExpiry)?;

        Ok(TokenClaims {
            expires_at,
            issued_at: timestamp_claim(&json, "iat"),
            subject: json.get("sub").and_then(|s| match s {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
        })
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims().ok().map(|c| c.expires_at)
    }

    /// Fail closed: anything that cannot be decoded counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.claims() {
            Ok(claims) => now >= claims.expires_at,
            Err(err) => {
                tracing::debug!("credential treated as expired: {err}");
                true
            }
        }
    }
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Credential").field(&"<redacted>").finish()
    }
}

fn timestamp_claim(json: &serde_json::Value, name: &str) -> Option<DateTime<Utc>> {
    let value = json.get(name)?;
    let secs = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.floor() as i64))?;
    DateTime::from_timestamp(secs, 0)
}
