//! Parameterized queries against BigQuery through the v2 REST API.

use crate::google_api::{ApiClient, ApiError};
use crate::payload::CustomerQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

pub const QUERY_LOCATION: &str = "US";

// Server-side wait per request; jobs that outlive it are polled.
const QUERY_TIMEOUT_MS: u64 = 10_000;

// Largest integer a float can carry exactly.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// A result row keyed by column name, passed through to callers as-is.
pub type Row = Map<String, Value>;

#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("query request failed: {0}")]
    Api(#[from] ApiError),
    #[error("query job failed: {0}")]
    JobFailed(String),
    #[error("malformed query response: {0}")]
    MalformedResponse(String),
}

/// Identifier of the table summaries are read from, in `dataset.table` form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableReference(String);

impl TableReference {
    /// Decodes a secret payload. A missing payload yields an empty reference.
    pub fn from_payload(payload: Option<&[u8]>) -> Self {
        let reference = payload
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();
        TableReference(reference)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryParameter {
    pub name: String,
    pub parameter_type: &'static str,
    pub value: String,
}

impl QueryParameter {
    pub fn int64(name: &str, value: i64) -> Self {
        QueryParameter {
            name: name.to_string(),
            parameter_type: "INT64",
            value: value.to_string(),
        }
    }
}

/// SQL text plus named parameters bound out of band.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterizedQuery {
    pub sql: String,
    pub params: Vec<QueryParameter>,
    pub location: String,
}

impl ParameterizedQuery {
    /// The table comes from trusted configuration and is part of the SQL text.
    /// The customer id is user input and only ever travels as a parameter.
    pub fn customer_summary(table: &TableReference, query: &CustomerQuery) -> Self {
        let sql = format!(
            "SELECT total_revenue, number_of_sales, last_sale_date, open_ticket_count, most_frequent_category\n\
             FROM `{table}`\n\
             WHERE customer_id = @customer_id\n\
             LIMIT 1"
        );

        ParameterizedQuery {
            sql,
            params: vec![QueryParameter::int64("customer_id", query.customer_id())],
            location: QUERY_LOCATION.to_string(),
        }
    }
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &ParameterizedQuery) -> Result<Vec<Row>, QueryError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    location: &'a str,
    parameter_mode: &'static str,
    query_parameters: Vec<RestQueryParameter<'a>>,
    timeout_ms: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RestQueryParameter<'a> {
    name: &'a str,
    parameter_type: RestParameterType,
    parameter_value: RestParameterValue<'a>,
}

#[derive(Serialize)]
struct RestParameterType {
    r#type: &'static str,
}

#[derive(Serialize)]
struct RestParameterValue<'a> {
    value: &'a str,
}

/// Shared shape of `jobs.query` and `jobs.getQueryResults` responses.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    schema: Option<TableSchema>,
    job_reference: Option<JobReference>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Deserialize, Debug)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableFieldSchema>,
}

#[derive(Deserialize, Debug)]
struct TableFieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Deserialize, Debug)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Deserialize, Debug)]
struct ErrorProto {
    reason: Option<String>,
    message: String,
}

/// Runs queries as `project_id` via the BigQuery v2 REST API.
pub struct BigQueryClient {
    api: ApiClient,
    project_id: String,
}

impl BigQueryClient {
    pub fn new(api: ApiClient, project_id: String) -> Self {
        BigQueryClient { api, project_id }
    }

    async fn wait_for_job(&self, mut response: QueryResponse) -> Result<QueryResponse, QueryError> {
        while !response.job_complete {
            let job = response.job_reference.ok_or_else(|| {
                QueryError::MalformedResponse("incomplete job without a job reference".into())
            })?;
            tracing::debug!(job_id = %job.job_id, "query job still running");

            let location = job.location.as_deref().unwrap_or(QUERY_LOCATION);
            let timeout_ms = QUERY_TIMEOUT_MS.to_string();
            response = self
                .api
                .get(
                    &format!(
                        "bigquery/v2/projects/{}/queries/{}",
                        job.project_id, job.job_id
                    ),
                    &[("location", location), ("timeoutMs", timeout_ms.as_str())],
                )
                .await?;
        }
        Ok(response)
    }
}

#[async_trait]
impl QueryExecutor for BigQueryClient {
    async fn execute(&self, query: &ParameterizedQuery) -> Result<Vec<Row>, QueryError> {
        let request = QueryRequest {
            query: &query.sql,
            use_legacy_sql: false,
            location: &query.location,
            parameter_mode: "NAMED",
            query_parameters: query
                .params
                .iter()
                .map(|p| RestQueryParameter {
                    name: &p.name,
                    parameter_type: RestParameterType {
                        r#type: p.parameter_type,
                    },
                    parameter_value: RestParameterValue { value: &p.value },
                })
                .collect(),
            timeout_ms: QUERY_TIMEOUT_MS,
        };

        let response: QueryResponse = self
            .api
            .post(
                &format!("bigquery/v2/projects/{}/queries", self.project_id),
                &request,
            )
            .await?;

        let response = self.wait_for_job(response).await?;
        decode_rows(response)
    }
}

fn decode_rows(response: QueryResponse) -> Result<Vec<Row>, QueryError> {
    let Some(schema) = response.schema else {
        if let Some(error) = response.errors.first() {
            return Err(QueryError::JobFailed(match &error.reason {
                Some(reason) => format!("{reason}: {}", error.message),
                None => error.message.clone(),
            }));
        }
        if response.rows.is_empty() {
            return Ok(Vec::new());
        }
        return Err(QueryError::MalformedResponse("rows without a schema".into()));
    };

    response
        .rows
        .into_iter()
        .map(|row| {
            if row.f.len() != schema.fields.len() {
                return Err(QueryError::MalformedResponse(format!(
                    "row has {} cells, schema has {} fields",
                    row.f.len(),
                    schema.fields.len()
                )));
            }

            schema
                .fields
                .iter()
                .zip(row.f)
                .map(|(field, cell)| Ok((field.name.clone(), decode_cell(field, cell.v)?)))
                .collect::<Result<Row, QueryError>>()
        })
        .collect()
}

fn decode_cell(field: &TableFieldSchema, value: Value) -> Result<Value, QueryError> {
    let Value::String(raw) = value else {
        // NULL, and the nested encodings of RECORD and REPEATED columns.
        return Ok(value);
    };

    let malformed = || {
        QueryError::MalformedResponse(format!(
            "column {} is not a valid {}: {raw}",
            field.name, field.field_type
        ))
    };

    match field.field_type.as_str() {
        "INTEGER" | "INT64" => raw.parse::<i64>().map(Value::from).map_err(|_| malformed()),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => {
            let float = raw.parse::<f64>().map_err(|_| malformed())?;
            if float.fract() == 0.0 && float.abs() <= MAX_EXACT_FLOAT_INT {
                Ok(Value::from(float as i64))
            } else {
                // NaN and the infinities have no JSON number form.
                Ok(Number::from_f64(float)
                    .map(Value::Number)
                    .unwrap_or(Value::String(raw)))
            }
        }
        "BOOLEAN" | "BOOL" => match raw.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(malformed()),
        },
        _ => Ok(Value::String(raw)),
    }
}
