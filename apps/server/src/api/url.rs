//! URL helpers for building absolute FHIR base URLs.

use crate::config::FhirConfig;
use axum::http::HeaderMap;

/// Build the FHIR base URL (`{scheme}://{host}/fhir`) using forwarding headers when present.
///
/// Bundle `fullUrl`s and paging links are absolute, so behind a reverse proxy
/// the forwarded scheme and host win over the connection's own.
pub fn base_url_from_headers(headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .or_else(|| headers.get("x-forwarded-scheme"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");

    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get("host"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    format!("{}://{}/fhir", scheme, host)
}

/// Configured `fhir.base_url`, or the base derived from request headers.
pub fn fhir_base_url(config: &FhirConfig, headers: &HeaderMap) -> String {
    match config.base_url.as_deref() {
        Some(base) if !base.trim().is_empty() => base.trim_end_matches('/').to_string(),
        _ => base_url_from_headers(headers),
    }
}
