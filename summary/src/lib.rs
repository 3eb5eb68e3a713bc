pub mod auth;
pub mod bigquery;
pub mod config;
pub mod google_api;
pub mod handler;
pub mod metrics_defs;
pub mod payload;
pub mod secrets;
mod service;

#[cfg(test)]
mod testutils;

use auth::{Anonymous, ApplicationDefaultCredentials, AuthError, CredentialSource};
use bigquery::BigQueryClient;
use config::{AuthMode, ValidationError};
use google_api::{ApiClient, ApiError};
use handler::RequestHandler;
use secrets::SecretManagerClient;
use service::SummaryService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum SummaryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Config(#[from] ValidationError),
    #[error("credentials error: {0}")]
    Auth(#[from] AuthError),
    #[error("could not create API client: {0}")]
    Api(#[from] ApiError),
}

pub async fn run(config: config::Config) -> Result<(), SummaryError> {
    config.validate()?;
    let project_id = config.resolve_project_id(|key| std::env::var(key).ok())?;

    let credentials: Arc<dyn CredentialSource> = match config.auth {
        AuthMode::Adc => Arc::new(ApplicationDefaultCredentials::new()?),
        AuthMode::Anonymous => {
            tracing::warn!("sending Google API requests without credentials");
            Arc::new(Anonymous)
        }
    };
    let timeout = config.http_timeout_secs.map(Duration::from_secs);

    let secrets = SecretManagerClient::new(ApiClient::new(
        &config.secret_manager_url,
        credentials.clone(),
        timeout,
    )?);
    let queries = BigQueryClient::new(
        ApiClient::new(&config.bigquery_url, credentials, timeout)?,
        project_id.clone(),
    );
    let handler = RequestHandler::new(&project_id, Arc::new(secrets), Arc::new(queries));

    tracing::info!(
        %project_id,
        host = %config.listener.host,
        port = config.listener.port,
        "serving customer summaries"
    );

    let summary_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        SummaryService::new(handler),
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::<_, SummaryError>::new(|| true),
    );

    tokio::try_join!(summary_task, admin_task)?;
    Ok(())
}
