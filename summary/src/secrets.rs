use crate::google_api::{ApiClient, ApiError};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::Deserialize;
use std::fmt;

/// Secret holding the `dataset.table` the summaries are read from.
pub const TABLE_REF_SECRET: &str = "BQ_TABLE_REF";

#[derive(thiserror::Error, Debug)]
pub enum SecretError {
    #[error("could not access secret {name}: {source}")]
    Api {
        name: String,
        #[source]
        source: ApiError,
    },
    #[error("secret {name} has an invalid payload: {source}")]
    Decode {
        name: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Fully qualified name of a secret version,
/// `projects/{project}/secrets/{secret}/versions/{version}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretVersionName(String);

impl SecretVersionName {
    pub fn latest(project_id: &str, secret: &str) -> Self {
        SecretVersionName(format!(
            "projects/{project_id}/secrets/{secret}/versions/latest"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretVersionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads secret payloads. Returns `None` when the version carries no payload.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn access(&self, name: &SecretVersionName) -> Result<Option<Bytes>, SecretError>;
}

#[derive(Deserialize)]
struct AccessSecretVersionResponse {
    payload: Option<SecretPayload>,
}

#[derive(Deserialize)]
struct SecretPayload {
    data: Option<String>,
}

/// Secret Manager v1 REST client.
pub struct SecretManagerClient {
    api: ApiClient,
}

impl SecretManagerClient {
    pub fn new(api: ApiClient) -> Self {
        SecretManagerClient { api }
    }
}

#[async_trait]
impl SecretResolver for SecretManagerClient {
    async fn access(&self, name: &SecretVersionName) -> Result<Option<Bytes>, SecretError> {
        let response: AccessSecretVersionResponse = self
            .api
            .get(&format!("v1/{name}:access"), &[])
            .await
            .map_err(|source| SecretError::Api {
                name: name.to_string(),
                source,
            })?;

        let Some(data) = response.payload.and_then(|p| p.data) else {
            return Ok(None);
        };

        let decoded = STANDARD.decode(data).map_err(|source| SecretError::Decode {
            name: name.to_string(),
            source,
        })?;

        Ok(Some(Bytes::from(decoded)))
    }
}
