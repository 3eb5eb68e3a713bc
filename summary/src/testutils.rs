use crate::bigquery::{ParameterizedQuery, QueryError, QueryExecutor, Row};
use crate::google_api::ApiError;
use crate::secrets::{SecretError, SecretResolver, SecretVersionName, TABLE_REF_SECRET};
use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

pub fn summary_row() -> Row {
    match json!({
        "total_revenue": 1000,
        "number_of_sales": 25,
        "last_sale_date": "2024-12-31",
        "open_ticket_count": 2,
        "most_frequent_category": "electronics",
    }) {
        Value::Object(row) => row,
        _ => unreachable!(),
    }
}

/// Secret resolver double returning a fixed payload and recording requested names.
pub struct StaticSecret {
    payload: Result<Option<Bytes>, String>,
    requested: Mutex<Vec<String>>,
}

impl StaticSecret {
    pub fn new(payload: &str) -> Self {
        Self::with(Ok(Some(Bytes::copy_from_slice(payload.as_bytes()))))
    }

    pub fn empty() -> Self {
        Self::with(Ok(None))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(Err(message.to_string()))
    }

    fn with(payload: Result<Option<Bytes>, String>) -> Self {
        StaticSecret {
            payload,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretResolver for StaticSecret {
    async fn access(&self, name: &SecretVersionName) -> Result<Option<Bytes>, SecretError> {
        self.requested.lock().unwrap().push(name.to_string());
        self.payload.clone().map_err(|message| SecretError::Api {
            name: name.to_string(),
            source: ApiError::Status {
                status: StatusCode::FORBIDDEN,
                message,
            },
        })
    }
}

/// Query executor double returning fixed rows and recording executed queries.
pub struct StaticRows {
    rows: Result<Vec<Row>, String>,
    executed: Mutex<Vec<ParameterizedQuery>>,
}

impl StaticRows {
    pub fn new(rows: Vec<Row>) -> Self {
        StaticRows {
            rows: Ok(rows),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        StaticRows {
            rows: Err(message.to_string()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<ParameterizedQuery> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for StaticRows {
    async fn execute(&self, query: &ParameterizedQuery) -> Result<Vec<Row>, QueryError> {
        self.executed.lock().unwrap().push(query.clone());
        self.rows.clone().map_err(QueryError::JobFailed)
    }
}

const SUMMARY_SCHEMA: &[(&str, &str)] = &[
    ("total_revenue", "FLOAT"),
    ("number_of_sales", "INTEGER"),
    ("last_sale_date", "DATE"),
    ("open_ticket_count", "INTEGER"),
    ("most_frequent_category", "STRING"),
];

#[derive(Default)]
struct MockState {
    secret: Option<String>,
    secret_requests: Vec<String>,
    rows: Vec<Value>,
    pending_polls: usize,
    omit_job_reference: bool,
    polls: usize,
    query_requests: Vec<Value>,
    query_failure: Option<String>,
}

type SharedState = Arc<Mutex<MockState>>;

/// In-process stand-in for the Secret Manager and BigQuery REST APIs.
pub struct MockGoogleApis {
    addr: SocketAddr,
    state: SharedState,
    handle: JoinHandle<()>,
}

impl MockGoogleApis {
    pub async fn spawn() -> Self {
        let state = SharedState::default();
        let app = Router::new()
            .route(
                "/v1/projects/{project}/secrets/{secret}/versions/{version}",
                get(access_secret),
            )
            .route("/bigquery/v2/projects/{project}/queries", post(run_query))
            .route(
                "/bigquery/v2/projects/{project}/queries/{job_id}",
                get(get_query_results),
            )
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockGoogleApis {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    pub fn set_secret(&self, payload: Option<&str>) {
        self.state.lock().unwrap().secret = payload.map(String::from);
    }

    /// Rows are objects keyed by summary column, with values in the REST string encoding.
    pub fn set_rows(&self, rows: Vec<Value>) {
        self.state.lock().unwrap().rows = rows;
    }

    pub fn set_pending_polls(&self, polls: usize) {
        self.state.lock().unwrap().pending_polls = polls;
    }

    /// Pending responses leave out `jobReference`, so the job cannot be polled.
    pub fn omit_job_reference(&self) {
        self.state.lock().unwrap().omit_job_reference = true;
    }

    pub fn fail_queries(&self, message: &str) {
        self.state.lock().unwrap().query_failure = Some(message.to_string());
    }

    pub fn secret_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().secret_requests.clone()
    }

    pub fn query_requests(&self) -> Vec<Value> {
        self.state.lock().unwrap().query_requests.clone()
    }

    pub fn poll_count(&self) -> usize {
        self.state.lock().unwrap().polls
    }
}

impl Drop for MockGoogleApis {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn google_error(status: StatusCode, code: &str, message: &str) -> Response {
    let body = json!({
        "error": {"code": status.as_u16(), "message": message, "status": code},
    });
    (status, Json(body)).into_response()
}

async fn access_secret(
    State(state): State<SharedState>,
    Path((project, secret, version)): Path<(String, String, String)>,
) -> Response {
    let mut state = state.lock().unwrap();
    state
        .secret_requests
        .push(format!("{project}/{secret}/{version}"));

    if secret != TABLE_REF_SECRET {
        return google_error(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("Secret [projects/{project}/secrets/{secret}] not found or has no versions."),
        );
    }

    let name = format!("projects/{project}/secrets/{secret}/versions/1");
    let body = match &state.secret {
        Some(payload) => json!({"name": name, "payload": {"data": STANDARD.encode(payload)}}),
        None => json!({"name": name}),
    };
    Json(body).into_response()
}

async fn run_query(
    State(state): State<SharedState>,
    Path(project): Path<String>,
    Json(request): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.query_requests.push(request);

    if let Some(message) = &state.query_failure {
        return google_error(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", message);
    }

    query_response(&mut state, &project)
}

async fn get_query_results(
    State(state): State<SharedState>,
    Path((project, _job_id)): Path<(String, String)>,
    Query(_params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.polls += 1;
    query_response(&mut state, &project)
}

fn query_response(state: &mut MockState, project: &str) -> Response {
    let job_reference = json!({"projectId": project, "jobId": "job_1", "location": "US"});

    if state.pending_polls > 0 {
        state.pending_polls -= 1;
        if state.omit_job_reference {
            return Json(json!({"jobComplete": false})).into_response();
        }
        return Json(json!({"jobComplete": false, "jobReference": job_reference})).into_response();
    }

    let fields: Vec<Value> = SUMMARY_SCHEMA
        .iter()
        .map(|(name, field_type)| json!({"name": name, "type": field_type, "mode": "NULLABLE"}))
        .collect();
    let rows: Vec<Value> = state
        .rows
        .iter()
        .map(|row| {
            let cells: Vec<Value> = SUMMARY_SCHEMA
                .iter()
                .map(|(name, _)| json!({"v": row.get(*name).cloned().unwrap_or(Value::Null)}))
                .collect();
            json!({"f": cells})
        })
        .collect();

    Json(json!({
        "kind": "bigquery#queryResponse",
        "jobComplete": true,
        "jobReference": job_reference,
        "schema": {"fields": fields},
        "totalRows": rows.len().to_string(),
        "rows": rows,
    }))
    .into_response()
}
