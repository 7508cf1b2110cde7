//! Request span and `X-Request-Id` handling

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use opentelemetry::trace::TraceContextExt;
use std::time::Instant;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use uuid::Uuid;

/// Root span for each request.
///
/// The server always assigns its own `X-Request-Id`; a differing client id is
/// echoed back as `X-Correlation-Id`. The OpenTelemetry trace id, when
/// exporting is enabled, is returned as `X-Trace-Id`.
#[tracing::instrument(
    name = "http_request",
    skip_all,
    fields(
        http.method = %req.method(),
        http.route = %crate::metrics::sanitize_path(req.uri().path()),
        otel.kind = "server",
        http.response.status_code = tracing::field::Empty,
        fhir.resource_type = tracing::field::Empty,
        fhir.operation = tracing::field::Empty,
        request_id = tracing::field::Empty,
    )
)]
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let span = Span::current();
    let start = Instant::now();

    let client_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let request_id = Uuid::new_v4().to_string();
    span.record("request_id", request_id.as_str());

    let path = req.uri().path().to_string();
    let method = req.method().clone();
    if let Some(resource_type) = crate::metrics::extract_resource_type(&path) {
        span.record("fhir.resource_type", resource_type.as_str());
    }
    if let Some(operation) = crate::metrics::extract_operation(method.as_str(), &path) {
        span.record("fhir.operation", operation);
    }

    let mut response = next.run(req).await;

    let status = response.status();
    span.record("http.response.status_code", status.as_u16());
    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert("x-request-id", value);
    }

    let trace_id = span.context().span().span_context().trace_id();
    if trace_id != opentelemetry::trace::TraceId::INVALID {
        if let Ok(value) = HeaderValue::from_str(&trace_id.to_string()) {
            headers.insert("x-trace-id", value);
        }
    }

    if let Some(client_id) = client_id.filter(|id| *id != request_id) {
        if let Ok(value) = HeaderValue::from_str(&client_id) {
            headers.insert("x-correlation-id", value);
        }
    }

    response
}
