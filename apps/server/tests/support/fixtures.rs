use super::{assert_status, TestApp};
use axum::{
    body::Bytes,
    http::{Method, StatusCode},
};
use serde_json::{json, Value as JsonValue};

pub fn to_json_body(value: &JsonValue) -> anyhow::Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

pub fn care_plan(patient: &str, status: &str, title: &str) -> JsonValue {
    json!({
        "resourceType": "CarePlan",
        "status": status,
        "intent": "plan",
        "title": title,
        "subject": {"reference": format!("Patient/{}", patient)}
    })
}

pub fn observation(patient: &str, system: &str, code: &str) -> JsonValue {
    json!({
        "resourceType": "Observation",
        "status": "final",
        "code": {"coding": [{"system": system, "code": code}]},
        "subject": {"reference": format!("Patient/{}", patient)}
    })
}

/// POST the resource and return the server's representation.
pub async fn create(app: &TestApp, resource: &JsonValue) -> anyhow::Result<JsonValue> {
    let resource_type = resource["resourceType"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("fixture without resourceType"))?;
    let (status, _headers, body) = app
        .request(
            Method::POST,
            &format!("/fhir/{}", resource_type),
            Some(to_json_body(resource)?),
        )
        .await?;
    assert_status(status, StatusCode::CREATED, &body);
    Ok(serde_json::from_slice(&body)?)
}

pub fn id_of(resource: &JsonValue) -> String {
    resource["id"].as_str().unwrap_or_default().to_string()
}
