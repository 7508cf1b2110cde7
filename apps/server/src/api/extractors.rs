//! Custom Axum extractors for FHIR content types.

use crate::Error;
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::header,
};
use serde_json::Value as JsonValue;

/// JSON resource body.
///
/// Accepts `application/fhir+json`, `application/json` or no `Content-Type`;
/// any other media type is rejected with 415 before the body is parsed.
pub struct FhirBody(pub JsonValue);

fn is_json_media_type(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    matches!(
        media_type.as_str(),
        "" | "application/fhir+json" | "application/json"
    )
}

#[async_trait]
impl<S> FromRequest<S> for FhirBody
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !is_json_media_type(content_type.as_deref()) {
            return Err(Error::UnsupportedMediaType(format!(
                "Unsupported Content-Type '{}'. Supported: application/fhir+json, application/json",
                content_type.unwrap_or_default()
            )));
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| Error::InvalidResource(format!("Failed to read request body: {}", e)))?;

        let value: JsonValue = serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidResource(format!("Invalid JSON in request body: {}", e)))?;

        Ok(FhirBody(value))
    }
}
