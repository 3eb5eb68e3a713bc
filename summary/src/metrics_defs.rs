//! Metrics definitions for the customer summary service.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUESTS: MetricDef = MetricDef {
    name: "customer_summary.requests",
    metric_type: MetricType::Counter,
    description: "Number of handled requests, tagged by response status",
};

pub const SECRET_ACCESS_DURATION: MetricDef = MetricDef {
    name: "secret_manager.access.duration",
    metric_type: MetricType::Histogram,
    description: "Time to read the table reference secret in seconds",
};

pub const QUERY_DURATION: MetricDef = MetricDef {
    name: "bigquery.query.duration",
    metric_type: MetricType::Histogram,
    description: "Time to run the customer summary query in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[REQUESTS, SECRET_ACCESS_DURATION, QUERY_DURATION];
