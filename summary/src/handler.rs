use crate::bigquery::{ParameterizedQuery, QueryError, QueryExecutor, Row, TableReference};
use crate::metrics_defs::{QUERY_DURATION, REQUESTS, SECRET_ACCESS_DURATION};
use crate::payload::{CustomerQuery, Violation};
use crate::secrets::{SecretError, SecretResolver, SecretVersionName, TABLE_REF_SECRET};
use http::{Method, Response, StatusCode};
use serde_json::{Value, json};
use shared::http::{ResponseBody, make_json_response};
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

/// Why a request did not produce a summary. Each variant maps to exactly one status.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Invalid request payload")]
    InvalidPayload(Vec<Violation>),
    #[error("Customer not found")]
    NotFound,
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            HandlerError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            HandlerError::NotFound => StatusCode::NOT_FOUND,
            HandlerError::Secret(_) | HandlerError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_upstream_failure(&self) -> bool {
        matches!(self, HandlerError::Secret(_) | HandlerError::Query(_))
    }
}

/// The single response written for a request.
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl SummaryResponse {
    pub fn into_http(self) -> Response<ResponseBody> {
        make_json_response(self.status, &self.body)
    }
}

impl From<Row> for SummaryResponse {
    fn from(row: Row) -> Self {
        SummaryResponse {
            status: StatusCode::OK,
            body: Value::Object(row),
        }
    }
}

impl From<HandlerError> for SummaryResponse {
    fn from(err: HandlerError) -> Self {
        let status = err.status();
        let body = match err {
            HandlerError::InvalidPayload(violations) => json!({
                "error": "Invalid request payload",
                "details": violations,
            }),
            HandlerError::Secret(_) | HandlerError::Query(_) => json!({
                "error": "Internal Server Error",
                "details": err.to_string(),
            }),
            HandlerError::MethodNotAllowed | HandlerError::NotFound => json!({
                "error": err.to_string(),
            }),
        };

        SummaryResponse { status, body }
    }
}

/// Looks up the pre-aggregated summary of one customer.
///
/// The table reference is read from Secret Manager on every request and the
/// customer id is bound as a query parameter, never formatted into the SQL.
pub struct RequestHandler {
    secret_name: SecretVersionName,
    secrets: Arc<dyn SecretResolver>,
    queries: Arc<dyn QueryExecutor>,
}

impl RequestHandler {
    pub fn new(
        project_id: &str,
        secrets: Arc<dyn SecretResolver>,
        queries: Arc<dyn QueryExecutor>,
    ) -> Self {
        RequestHandler {
            secret_name: SecretVersionName::latest(project_id, TABLE_REF_SECRET),
            secrets,
            queries,
        }
    }

    pub async fn handle(&self, method: &Method, body: &[u8]) -> SummaryResponse {
        let response = match self.lookup(method, body).await {
            Ok(row) => SummaryResponse::from(row),
            Err(err) => {
                if err.is_upstream_failure() {
                    tracing::error!(error = %err, "customer summary lookup failed");
                } else {
                    tracing::debug!(error = %err, "customer summary request rejected");
                }
                SummaryResponse::from(err)
            }
        };

        counter!(REQUESTS, "status" => response.status.as_u16().to_string()).increment(1);
        response
    }

    async fn lookup(&self, method: &Method, body: &[u8]) -> Result<Row, HandlerError> {
        if *method != Method::POST {
            return Err(HandlerError::MethodNotAllowed);
        }

        let customer = CustomerQuery::from_slice(body).map_err(HandlerError::InvalidPayload)?;

        let started = Instant::now();
        let payload = self.secrets.access(&self.secret_name).await;
        histogram!(SECRET_ACCESS_DURATION).record(started.elapsed().as_secs_f64());
        let table = TableReference::from_payload(payload?.as_deref());

        let query = ParameterizedQuery::customer_summary(&table, &customer);
        let started = Instant::now();
        let rows = self.queries.execute(&query).await;
        histogram!(QUERY_DURATION).record(started.elapsed().as_secs_f64());

        rows?.into_iter().next().ok_or(HandlerError::NotFound)
    }
}
