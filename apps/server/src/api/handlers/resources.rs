//! Instance and type-level interaction handlers
//!
//! - `POST   /fhir/{type}` create
//! - `GET    /fhir/{type}/{id}` read
//! - `PUT    /fhir/{type}/{id}` update
//! - `PATCH  /fhir/{type}/{id}` patch (JSON Patch or Merge Patch)
//! - `DELETE /fhir/{type}/{id}` delete

use crate::{
    api::{
        extractors::FhirBody,
        headers::{content_type, extract_if_match, fhir_json_response, FhirResponseHeaders},
    },
    models::{resource_types, StoredResource},
    state::AppState,
    Error, Result,
};
use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use ehr_fhir_rest::{PatchDocument, PatchFormat};
use serde_json::Value as JsonValue;

pub async fn create_resource(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    FhirBody(resource): FhirBody,
) -> Result<Response> {
    let def = resource_types::require(&resource_type)?;
    let row = state.resource_service.create(def.name, resource).await?;

    let headers =
        FhirResponseHeaders::for_create(def.name, &row.fhir_id, row.version_id, &row.updated_at);
    fhir_json_response(StatusCode::CREATED, &headers, &row.to_fhir())
}

pub async fn read_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Result<Response> {
    let def = resource_types::require(&resource_type)?;
    let row = state.resource_service.get_by_fhir_id(def.name, &id).await?;
    resource_response(StatusCode::OK, &row)
}

pub async fn update_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    headers: HeaderMap,
    FhirBody(resource): FhirBody,
) -> Result<Response> {
    let def = resource_types::require(&resource_type)?;
    let expected_version = extract_if_match(&headers)?;
    ensure_body_id_matches(&resource, &id)?;

    let row = state
        .resource_service
        .update(def.name, &id, resource, expected_version)
        .await?;
    resource_response(StatusCode::OK, &row)
}

/// The patch format is settled from `Content-Type` before the body is read,
/// so an unsupported media type is always 415.
pub async fn patch_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    request: Request,
) -> Result<Response> {
    let def = resource_types::require(&resource_type)?;
    let headers = request.headers();
    let format = PatchFormat::from_content_type(content_type(headers)).map_err(|e| {
        tracing::debug!(resource_type = def.name, id = %id, error = %e, "Patch rejected");
        Error::from(e)
    })?;
    let expected_version = extract_if_match(headers)?;

    let body = axum::body::to_bytes(
        request.into_body(),
        state.config.server.max_request_body_size,
    )
    .await
    .map_err(|e| Error::InvalidResource(format!("Failed to read request body: {}", e)))?;
    let patch = PatchDocument::parse(format, &body)?;

    let row = state
        .resource_service
        .patch(def.name, &id, &patch, expected_version)
        .await?;
    resource_response(StatusCode::OK, &row)
}

pub async fn delete_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Result<Response> {
    let def = resource_types::require(&resource_type)?;
    let tombstone = state.resource_service.delete(def.name, &id).await?;

    let headers = FhirResponseHeaders::for_read(tombstone.version_id, &tombstone.updated_at);
    Ok(headers.apply_to_response(StatusCode::NO_CONTENT.into_response()))
}

fn resource_response(status: StatusCode, row: &StoredResource) -> Result<Response> {
    let headers = FhirResponseHeaders::for_read(row.version_id, &row.updated_at);
    fhir_json_response(status, &headers, &row.to_fhir())
}

/// An update body must carry the id from the URL.
fn ensure_body_id_matches(resource: &JsonValue, id: &str) -> Result<()> {
    match resource.get("id").and_then(JsonValue::as_str) {
        Some(body_id) if body_id == id => Ok(()),
        Some(body_id) => Err(Error::InvalidResource(format!(
            "Resource id '{}' does not match URL id '{}'",
            body_id, id
        ))),
        None => Err(Error::InvalidResource(
            "Resource id is required for update".to_string(),
        )),
    }
}
