use async_trait::async_trait;
use google_cloud_auth::credentials::{Builder, CacheableResource, Credentials};
use http::{Extensions, HeaderMap};

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("could not load application default credentials: {0}")]
    Unavailable(String),
    #[error("could not obtain access token: {0}")]
    Token(String),
}

/// Produces the authorization headers attached to every Google API call.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn headers(&self) -> Result<HeaderMap, AuthError>;
}

/// Application Default Credentials: the attached service account when running
/// on Google Cloud, the gcloud user credentials otherwise.
pub struct ApplicationDefaultCredentials {
    credentials: Credentials,
}

impl ApplicationDefaultCredentials {
    pub fn new() -> Result<Self, AuthError> {
        let credentials = Builder::default()
            .build()
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        Ok(ApplicationDefaultCredentials { credentials })
    }
}

#[async_trait]
impl CredentialSource for ApplicationDefaultCredentials {
    async fn headers(&self) -> Result<HeaderMap, AuthError> {
        let resource = self
            .credentials
            .headers(Extensions::new())
            .await
            .map_err(|e| AuthError::Token(e.to_string()))?;

        match resource {
            CacheableResource::New { data, .. } => Ok(data),
            // Only returned when the request carried an entity tag, which ours never does.
            CacheableResource::NotModified => {
                Err(AuthError::Token("credentials returned no headers".into()))
            }
        }
    }
}

/// Sends no credentials. Used against emulators and local mocks.
pub struct Anonymous;

#[async_trait]
impl CredentialSource for Anonymous {
    async fn headers(&self) -> Result<HeaderMap, AuthError> {
        Ok(HeaderMap::new())
    }
}
