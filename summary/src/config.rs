use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Environment variables consulted, in order, when no project id is configured.
pub const PROJECT_ID_ENV_VARS: &[&str] = &["GCP_PROJECT", "GOOGLE_CLOUD_PROJECT"];

const SECRET_MANAGER_URL: &str = "https://secretmanager.googleapis.com";
const BIGQUERY_URL: &str = "https://bigquery.googleapis.com";

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Listener and admin listener both bind {0}")]
    ListenerConflict(String),

    #[error("HTTP timeout cannot be 0")]
    InvalidTimeout,

    #[error("No project id configured and none of {} is set", PROJECT_ID_ENV_VARS.join(", "))]
    MissingProjectId,
}

/// How requests to Google APIs are authenticated.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Application Default Credentials.
    #[default]
    Adc,
    /// No credentials, for emulators and local mocks.
    #[serde(rename = "none")]
    Anonymous,
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    fn new(host: &str, port: u16) -> Self {
        Listener {
            host: host.into(),
            port,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Customer summary service configuration. Every field is optional.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener for customer summary requests
    pub listener: Listener,
    /// Listener for health and readiness probes
    pub admin_listener: Listener,
    /// Project owning the secret and running the query. Falls back to
    /// `GCP_PROJECT`, then `GOOGLE_CLOUD_PROJECT`.
    pub project_id: Option<String>,
    pub auth: AuthMode,
    pub secret_manager_url: Url,
    pub bigquery_url: Url,
    /// Applies to each upstream HTTP request. Unset means no limit.
    pub http_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::new("127.0.0.1", 8080),
            admin_listener: Listener::new("127.0.0.1", 8081),
            project_id: None,
            auth: AuthMode::default(),
            secret_manager_url: default_url(SECRET_MANAGER_URL),
            bigquery_url: default_url(BIGQUERY_URL),
            http_timeout_secs: None,
        }
    }
}

fn default_url(url: &str) -> Url {
    Url::parse(url).expect("default endpoint URLs are valid")
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.listener == self.admin_listener {
            return Err(ValidationError::ListenerConflict(format!(
                "{}:{}",
                self.listener.host, self.listener.port
            )));
        }

        if self.http_timeout_secs == Some(0) {
            return Err(ValidationError::InvalidTimeout);
        }

        Ok(())
    }

    /// The configured project id, else the first non-empty environment variable.
    pub fn resolve_project_id<F>(&self, env: F) -> Result<String, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.project_id
            .clone()
            .into_iter()
            .chain(PROJECT_ID_ENV_VARS.iter().filter_map(|key| env(key)))
            .find(|value| !value.is_empty())
            .ok_or(ValidationError::MissingProjectId)
    }
}
