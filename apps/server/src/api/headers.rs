//! FHIR HTTP Header Handling
//!
//! Parsing and formatting of the version-related FHIR headers
//! (http://hl7.org/fhir/http.html#versioning).
//!
//! ## Request Headers
//! - `If-Match` - expected version for update/patch (`W/"3"`)
//!
//! ## Response Headers
//! - `ETag` - Version ID as weak ETag (W/"versionId")
//! - `Last-Modified` - From .meta.lastUpdated, as an HTTP-date
//! - `Location` - Resource location after create

use crate::{Error, Result};
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};
use chrono::{DateTime, Utc};

pub const FHIR_JSON: &str = "application/fhir+json; charset=utf-8";

// ============================================================================
// ETag Handling
// ============================================================================

/// Parse ETag header value to version ID
///
/// FHIR uses weak ETags in the format: `W/"3141"`. A bare `"3141"` or `3141`
/// is accepted too.
///
/// # Examples
/// ```
/// use ehr_server::api::headers::parse_etag;
/// assert_eq!(parse_etag("W/\"3141\""), Some(3141));
/// assert_eq!(parse_etag("\"23\""), Some(23));
/// assert_eq!(parse_etag("invalid"), None);
/// ```
pub fn parse_etag(etag: &str) -> Option<i32> {
    let etag = etag.trim();
    etag.strip_prefix("W/")
        .unwrap_or(etag)
        .trim_matches('"')
        .parse()
        .ok()
}

/// Format version ID as FHIR ETag header value
///
/// # Examples
/// ```
/// use ehr_server::api::headers::format_etag;
/// assert_eq!(format_etag(3141), "W/\"3141\"");
/// ```
pub fn format_etag(version: i32) -> String {
    format!("W/\"{}\"", version)
}

// ============================================================================
// Last-Modified Handling
// ============================================================================

/// Format a FHIR instant as an RFC 7231 HTTP-date
/// (`Sun, 01 Jan 2023 12:00:00 GMT`).
pub fn format_last_modified(last_updated: &DateTime<Utc>) -> String {
    last_updated
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

// ============================================================================
// Conditional Request Headers
// ============================================================================

/// Expected version from `If-Match`.
///
/// Absent header is `None`; a header that is not a version ETag fails the
/// precondition.
pub fn extract_if_match(headers: &HeaderMap) -> Result<Option<i32>> {
    let Some(value) = headers.get(header::IF_MATCH) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(parse_etag)
        .map(Some)
        .ok_or_else(|| {
            Error::PreconditionFailed(format!(
                "If-Match must be a version ETag such as W/\"1\", got {:?}",
                value
            ))
        })
}

/// Raw `Content-Type` value, if it is valid ASCII.
pub fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

// ============================================================================
// Response Header Building
// ============================================================================

/// Builder for FHIR response headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FhirResponseHeaders {
    pub location: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl FhirResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, location: String) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_etag(mut self, version_id: i32) -> Self {
        self.etag = Some(format_etag(version_id));
        self
    }

    pub fn with_last_modified(mut self, last_updated: &DateTime<Utc>) -> Self {
        self.last_modified = Some(format_last_modified(last_updated));
        self
    }

    /// Location (`/fhir/{type}/{id}`), ETag and Last-Modified for a create.
    pub fn for_create(
        resource_type: &str,
        resource_id: &str,
        version_id: i32,
        last_updated: &DateTime<Utc>,
    ) -> Self {
        Self::for_read(version_id, last_updated)
            .with_location(format!("/fhir/{}/{}", resource_type, resource_id))
    }

    /// ETag and Last-Modified for reads, vreads and updates.
    pub fn for_read(version_id: i32, last_updated: &DateTime<Utc>) -> Self {
        Self::new()
            .with_etag(version_id)
            .with_last_modified(last_updated)
    }

    pub fn to_header_array(&self) -> Vec<(header::HeaderName, HeaderValue)> {
        [
            (header::LOCATION, &self.location),
            (header::ETAG, &self.etag),
            (header::LAST_MODIFIED, &self.last_modified),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            let value = HeaderValue::from_str(value.as_deref()?).ok()?;
            Some((name, value))
        })
        .collect()
    }

    pub fn apply_to_response(&self, mut response: Response) -> Response {
        let headers = response.headers_mut();
        for (name, value) in self.to_header_array() {
            headers.insert(name, value);
        }
        response
    }
}

/// Response with a FHIR JSON body and the given headers.
pub fn fhir_response(
    status: StatusCode,
    headers: &FhirResponseHeaders,
    body: impl Into<Body>,
) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(FHIR_JSON));
    headers.apply_to_response(response)
}

/// Serialize `value` and wrap it in a FHIR JSON response.
pub fn fhir_json_response<T: serde::Serialize>(
    status: StatusCode,
    headers: &FhirResponseHeaders,
    value: &T,
) -> Result<Response> {
    let body = serde_json::to_vec(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize response: {}", e)))?;
    Ok(fhir_response(status, headers, body))
}
