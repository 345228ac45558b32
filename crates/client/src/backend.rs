//! Backend authorization service (profile + granted modules).

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use consorcia_auth::{Credential, MyModulesResponse, Principal};

use crate::config::ClientConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({0}): {1}")]
    Api(u16, String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("backend reported failure")]
    Rejected,
}

/// Remote collaborator the engine pulls canonical state from.
///
/// Transport, retries and timeouts are the implementation's business; the
/// engine only sees the final result.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// `GET /auth/profile`
    async fn fetch_profile(&self, credential: &Credential) -> Result<Principal, BackendError>;

    /// `GET /modulos/mis-modulos`
    async fn fetch_modules(&self, credential: &Credential) -> Result<MyModulesResponse, BackendError>;
}

/// `reqwest`-based backend client.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    api_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileEnvelope {
    Wrapped { data: Principal },
    Bare(Principal),
}

impl HttpBackend {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(api_url, reqwest::Client::new())
    }

    /// Client for the backend named by `config.api_url`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_url.clone())
    }

    pub fn with_client(api_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        credential: &Credential,
    ) -> Result<T, BackendError> {
        let url = format!("{}{}", self.api_url, path);

        let resp = self
            .client
            .get(&url)
            .bearer_auth(credential.expose())
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Api(status, body));
        }

        resp.json::<T>()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn fetch_profile(&self, credential: &Credential) -> Result<Principal, BackendError> {
        let envelope: ProfileEnvelope = self.get_json("/auth/profile", credential).await?;
        Ok(match envelope {
            ProfileEnvelope::Wrapped { data } => data,
            ProfileEnvelope::Bare(principal) => principal,
        })
    }

    async fn fetch_modules(&self, credential: &Credential) -> Result<MyModulesResponse, BackendError> {
        let response: MyModulesResponse = self.get_json("/modulos/mis-modulos", credential).await?;
        if !response.success {
            return Err(BackendError::Rejected);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_envelope_accepts_both_shapes() {
        let bare = r#"{"id":1,"nombre":"Ana","rol":"propietario","aprobado":true,"activo":true}"#;
        let wrapped = format!(r#"{{"success":true,"data":{bare}}}"#);

        let a: ProfileEnvelope = serde_json::from_str(bare).unwrap();
        let b: ProfileEnvelope = serde_json::from_str(&wrapped).unwrap();

        assert!(matches!(a, ProfileEnvelope::Bare(_)));
        assert!(matches!(b, ProfileEnvelope::Wrapped { .. }));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("http://localhost:3000/api/");
        assert_eq!(backend.api_url, "http://localhost:3000/api");
    }

    #[test]
    fn from_config_uses_configured_api_url() {
        let config = ClientConfig {
            api_url: "https://api.example.com/api/".to_string(),
            ..ClientConfig::default()
        };
        assert_eq!(HttpBackend::from_config(&config).api_url, "https://api.example.com/api");
    }
}
