//! Version history handlers
//!
//! - `GET /fhir/{type}/{id}/_history` history bundle, newest first
//! - `GET /fhir/{type}/{id}/_history/{vid}` vread

use crate::{
    api::{
        headers::{fhir_json_response, fhir_response, FhirResponseHeaders},
        paging::{parse_form_urlencoded, Paging},
        url as api_url,
    },
    models::resource_types,
    state::AppState,
    Error, Result,
};
use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use ehr_fhir_rest::history_bundle;

pub async fn resource_history(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response> {
    let def = resource_types::require(&resource_type)?;
    let params = query.as_deref().map(parse_form_urlencoded).unwrap_or_default();
    let paging = Paging::from_params(&params, &state.config.fhir)?;

    let page = state
        .history_service
        .history(def.name, &id, paging.count, paging.offset)
        .await?;

    let base_url = api_url::fhir_base_url(&state.config.fhir, &headers);
    let total = usize::try_from(page.total).unwrap_or_default();
    let bundle = history_bundle(def.name, &id, &page.entries, total, &base_url)?;

    fhir_json_response(StatusCode::OK, &FhirResponseHeaders::new(), &bundle)
}

/// The body is the snapshot exactly as captured when the version was written.
pub async fn vread_resource(
    State(state): State<AppState>,
    Path((resource_type, id, vid)): Path<(String, String, String)>,
) -> Result<Response> {
    let def = resource_types::require(&resource_type)?;
    let version_id = vid
        .parse::<i32>()
        .ok()
        .filter(|v| *v >= 1)
        .ok_or_else(|| {
            Error::NotFound(format!(
                "{}/{}/_history/{} is not a valid version",
                def.name, id, vid
            ))
        })?;

    let entry = state
        .history_service
        .vread(def.name, &id, version_id)
        .await?;

    let headers = FhirResponseHeaders::for_read(entry.version_id, &entry.recorded_at);
    Ok(fhir_response(StatusCode::OK, &headers, entry.snapshot))
}
