//! Search operation handlers
//!
//! Type-level search only:
//! - `GET  /fhir/{type}?params`
//! - `POST /fhir/{type}/_search` with an `application/x-www-form-urlencoded`
//!   body, merged after the query string parameters

use crate::{
    api::{
        headers::{content_type, fhir_json_response, FhirResponseHeaders},
        paging::{parse_form_urlencoded, without_paging, Paging},
        url as api_url,
    },
    models::resource_types,
    state::AppState,
    Error, Result,
};
use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, Method, StatusCode},
    response::Response,
};
use ehr_fhir_rest::{search_bundle_with_links, SearchBundleLinks};

pub async fn search_type(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    request: Request,
) -> Result<Response> {
    let def = resource_types::require(&resource_type)?;
    let headers = request.headers().clone();
    let method = request.method().clone();
    let raw_query = request.uri().query().map(str::to_string);

    let body = axum::body::to_bytes(
        request.into_body(),
        state.config.server.max_request_body_size,
    )
    .await
    .map_err(|e| Error::Validation(format!("Failed to read request body: {}", e)))?;

    let items = extract_search_items(&method, raw_query.as_deref(), &headers, &body)?;
    let paging = Paging::from_params(&items, &state.config.fhir)?;
    let params = without_paging(&items);

    let page = state
        .resource_service
        .search(def, &params, paging.count, paging.offset)
        .await?;

    crate::metrics::FHIR_SEARCH_RESULTS
        .with_label_values(&[def.name])
        .observe(page.total as f64);

    let server_base_url = api_url::fhir_base_url(&state.config.fhir, &headers);
    let base_url = format!("{}/{}", server_base_url, def.name);
    let query = build_query_string(&items);
    let links = SearchBundleLinks {
        server_base_url: &server_base_url,
        base_url: &base_url,
        query: &query,
        count: paging.count,
        offset: paging.offset,
        total: usize::try_from(page.total).unwrap_or_default(),
    };
    let resources = page.resources.iter().map(|row| row.to_fhir()).collect();
    let bundle = search_bundle_with_links(resources, &links);

    fhir_json_response(StatusCode::OK, &FhirResponseHeaders::new(), &bundle)
}

fn extract_search_items(
    method: &Method,
    raw_query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Vec<(String, String)>> {
    let mut items = raw_query.map(parse_form_urlencoded).unwrap_or_default();

    if method == Method::POST && !body.is_empty() {
        let content_type = content_type(headers).unwrap_or("");
        if !content_type
            .to_ascii_lowercase()
            .starts_with("application/x-www-form-urlencoded")
        {
            return Err(Error::UnsupportedMediaType(format!(
                "POST search requires Content-Type: application/x-www-form-urlencoded, got: {}",
                content_type
            )));
        }
        let body = std::str::from_utf8(body)
            .map_err(|_| Error::Validation("Invalid UTF-8 in request body".to_string()))?;
        items.extend(parse_form_urlencoded(body));
    }

    Ok(items)
}

fn build_query_string(items: &[(String, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in items {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}
