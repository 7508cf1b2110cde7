//! Prometheus metrics for the EHR FHIR server

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};

lazy_static! {
    // HTTP

    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ehr_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS_TOTAL");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "ehr_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register HTTP_REQUEST_DURATION_SECONDS");

    // FHIR interactions

    /// FHIR interactions by resource type, operation and outcome class
    pub static ref FHIR_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ehr_fhir_operations_total",
        "Total number of FHIR interactions",
        &["resource_type", "operation", "outcome"]
    )
    .expect("Failed to register FHIR_OPERATIONS_TOTAL");

    pub static ref FHIR_SEARCH_RESULTS: HistogramVec = register_histogram_vec!(
        "ehr_fhir_search_results",
        "Number of resources matched by a search",
        &["resource_type"],
        vec![0.0, 1.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 10000.0]
    )
    .expect("Failed to register FHIR_SEARCH_RESULTS");

    // Versioning

    /// Mutations rejected because another writer advanced the version first
    pub static ref VERSION_CONFLICTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ehr_version_conflicts_total",
        "Total number of optimistic concurrency conflicts",
        &["resource_type", "operation"]
    )
    .expect("Failed to register VERSION_CONFLICTS_TOTAL");

    pub static ref HISTORY_ENTRIES_PRUNED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ehr_history_entries_pruned_total",
        "Total number of history entries removed by retention",
        &["status"]
    )
    .expect("Failed to register HISTORY_ENTRIES_PRUNED_TOTAL");

    // Database pool

    pub static ref DB_CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        "ehr_db_connections_active",
        "Number of active database connections"
    )
    .expect("Failed to register DB_CONNECTIONS_ACTIVE");

    pub static ref DB_CONNECTIONS_IDLE: IntGauge = register_int_gauge!(
        "ehr_db_connections_idle",
        "Number of idle database connections"
    )
    .expect("Failed to register DB_CONNECTIONS_IDLE");
}

/// Path with ids replaced by placeholders, keeping label cardinality bounded.
pub fn sanitize_path(path: &str) -> String {
    let Some(rest) = path.strip_prefix("/fhir") else {
        return path.to_string();
    };
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

    let templated: Vec<&str> = match segments.as_slice() {
        [] => vec![],
        [rt] => vec![*rt],
        [rt, "_search"] => vec![*rt, "_search"],
        [rt, _id] => vec![*rt, "{id}"],
        [rt, _id, "_history"] => vec![*rt, "{id}", "_history"],
        [rt, _id, "_history", _vid] => vec![*rt, "{id}", "_history", "{vid}"],
        [rt, ..] => vec![*rt, "{other}"],
    };

    format!("/fhir/{}", templated.join("/"))
}

/// Resource type addressed by a `/fhir/...` path.
pub fn extract_resource_type(path: &str) -> Option<String> {
    let first = path
        .strip_prefix("/fhir/")?
        .split('/')
        .find(|s| !s.is_empty())?;
    if first.starts_with('_') || first.starts_with('$') || first == "metadata" {
        return None;
    }
    Some(first.to_string())
}

/// FHIR interaction implied by method and path.
pub fn extract_operation(method: &str, path: &str) -> Option<&'static str> {
    let rest = path.strip_prefix("/fhir/")?;
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

    let op = match (method, segments.as_slice()) {
        ("GET", [_]) | ("POST", [_, "_search"]) => "search",
        ("POST", [_]) => "create",
        ("GET", [_, _]) => "read",
        ("PUT", [_, _]) => "update",
        ("PATCH", [_, _]) => "patch",
        ("DELETE", [_, _]) => "delete",
        ("GET", [_, _, "_history"]) => "history",
        ("GET", [_, _, "_history", _]) => "vread",
        _ => return None,
    };
    Some(op)
}

pub fn record_version_conflict(resource_type: &str, operation: &str) {
    VERSION_CONFLICTS_TOTAL
        .with_label_values(&[resource_type, operation])
        .inc();
}
