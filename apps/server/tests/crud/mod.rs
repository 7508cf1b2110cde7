//! Create, read, update, patch and delete over HTTP.


use crate::support::*;
use axum::http::{Method, StatusCode};
use ehr_server::Error;
use serde_json::{json, Value as JsonValue};

#[tokio::test]
async fn create_assigns_id_and_version_headers() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let mut input = care_plan("p-1", "draft", "Diabetes plan");
            input["id"] = json!("client-chosen");

            let (status, headers, body) = app
                .request(Method::POST, "/fhir/CarePlan", Some(to_json_body(&input)?))
                .await?;
            assert_status(status, StatusCode::CREATED, &body);

            let created: JsonValue = serde_json::from_slice(&body)?;
            let id = id_of(&created);
            assert_ne!(id, "client-chosen");
            assert_version_id(&created, "1");
            assert!(created["meta"]["lastUpdated"].is_string());

            assert_etag(&headers, 1);
            assert_eq!(
                header(&headers, "location"),
                Some(format!("/fhir/CarePlan/{}", id).as_str())
            );
            assert!(header(&headers, "last-modified").is_some_and(|v| v.ends_with("GMT")));

            let (status, headers, body) = app
                .request(Method::GET, &format!("/fhir/CarePlan/{}", id), None)
                .await?;
            assert_status(status, StatusCode::OK, &body);
            assert_etag(&headers, 1);
            let read: JsonValue = serde_json::from_slice(&body)?;
            assert_eq!(read, created);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn create_rejects_mismatched_resource_type() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let body = to_json_body(&observation("p-1", "http://loinc.org", "1234-5"))?;
            let (status, _headers, body) = app
                .request(Method::POST, "/fhir/CarePlan", Some(body))
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, &body);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn read_missing_is_404() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (status, _headers, body) = app
                .request(Method::GET, "/fhir/CarePlan/does-not-exist", None)
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, &body);
            let outcome = assert_outcome(&body);
            assert_eq!(outcome["issue"][0]["code"], "not-found");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn update_increments_version_and_honors_if_match() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let created = create(app, &care_plan("p-1", "draft", "Plan")).await?;
            let id = id_of(&created);
            let path = format!("/fhir/CarePlan/{}", id);

            let mut next = created.clone();
            next["status"] = json!("active");

            let (status, headers, body) = app
                .request_with_extra_headers(
                    Method::PUT,
                    &path,
                    Some(to_json_body(&next)?),
                    &[("if-match", "W/\"1\"")],
                )
                .await?;
            assert_status(status, StatusCode::OK, &body);
            assert_etag(&headers, 2);
            let updated: JsonValue = serde_json::from_slice(&body)?;
            assert_version_id(&updated, "2");
            assert_eq!(updated["status"], "active");

            // Stale If-Match
            let (status, _headers, body) = app
                .request_with_extra_headers(
                    Method::PUT,
                    &path,
                    Some(to_json_body(&next)?),
                    &[("if-match", "W/\"1\"")],
                )
                .await?;
            assert_status(status, StatusCode::PRECONDITION_FAILED, &body);

            // Unconditional update still succeeds
            let (status, headers, body) = app
                .request(Method::PUT, &path, Some(to_json_body(&next)?))
                .await?;
            assert_status(status, StatusCode::OK, &body);
            assert_etag(&headers, 3);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn update_requires_matching_body_id() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let created = create(app, &care_plan("p-1", "draft", "Plan")).await?;
            let path = format!("/fhir/CarePlan/{}", id_of(&created));

            let mut other = created.clone();
            other["id"] = json!("someone-else");
            let (status, _headers, body) = app
                .request(Method::PUT, &path, Some(to_json_body(&other)?))
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, &body);

            let (status, _headers, body) = app
                .request(
                    Method::PUT,
                    "/fhir/CarePlan/never-created",
                    Some(to_json_body(&json!({
                        "resourceType": "CarePlan",
                        "id": "never-created",
                        "status": "draft",
                        "intent": "plan"
                    }))?),
                )
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, &body);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn delete_then_read_is_gone() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let created = create(app, &care_plan("p-1", "active", "Plan")).await?;
            let path = format!("/fhir/CarePlan/{}", id_of(&created));

            let (status, headers, body) = app.request(Method::DELETE, &path, None).await?;
            assert_status(status, StatusCode::NO_CONTENT, &body);
            assert!(body.is_empty());
            assert_etag(&headers, 2);
            let deleted_at = header(&headers, "last-modified")
                .expect("Last-Modified on delete")
                .to_string();
            assert!(deleted_at.ends_with("GMT"));

            let (status, headers, body) = app.request(Method::GET, &path, None).await?;
            assert_status(status, StatusCode::NOT_FOUND, &body);
            assert_etag(&headers, 2);
            let outcome = assert_outcome(&body);
            assert_eq!(outcome["issue"][0]["code"], "deleted");

            // Repeating the delete returns the same tombstone
            let (status, headers, body) = app.request(Method::DELETE, &path, None).await?;
            assert_status(status, StatusCode::NO_CONTENT, &body);
            assert_etag(&headers, 2);
            assert_eq!(header(&headers, "last-modified"), Some(deleted_at.as_str()));

            let mut revived = created.clone();
            revived["status"] = json!("revoked");
            let (status, _headers, body) = app
                .request(Method::PUT, &path, Some(to_json_body(&revived)?))
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, &body);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn delete_missing_is_404() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (status, _headers, body) = app
                .request(Method::DELETE, "/fhir/CarePlan/never-created", None)
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, &body);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn concurrent_updates_from_same_version_one_conflicts() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let created = create(app, &care_plan("p-1", "draft", "Plan")).await?;
            let id = id_of(&created);
            let service = &app.state.resource_service;

            // Hold the row so both writers read version 1 before either can write.
            let mut blocker = app.state.db_pool.begin().await?;
            sqlx::query("SELECT 1 FROM resources WHERE resource_type = 'CarePlan' AND fhir_id = $1 FOR UPDATE")
                .bind(&id)
                .execute(&mut *blocker)
                .await?;

            let mut active = created.clone();
            active["status"] = json!("active");
            let mut revoked = created.clone();
            revoked["status"] = json!("revoked");

            let release = async move {
                tokio::time::sleep(std::time::Duration::from_millis(300)).await;
                blocker.commit().await
            };
            let (a, b, released) = tokio::join!(
                service.update("CarePlan", &id, active, None),
                service.update("CarePlan", &id, revoked, None),
                release
            );
            released?;

            let results = [a, b];
            let won: Vec<i32> = results
                .iter()
                .filter_map(|r| r.as_ref().ok().map(|row| row.version_id))
                .collect();
            assert_eq!(won, vec![2]);
            assert_eq!(
                results
                    .iter()
                    .filter(|r| matches!(r, Err(Error::VersionConflict { expected: 1, .. })))
                    .count(),
                1
            );

            let (status, headers, body) = app
                .request(Method::GET, &format!("/fhir/CarePlan/{}", id), None)
                .await?;
            assert_status(status, StatusCode::OK, &body);
            assert_etag(&headers, 2);

            let (_status, _headers, body) = app
                .request(Method::GET, &format!("/fhir/CarePlan/{}/_history", id), None)
                .await?;
            let bundle: JsonValue = serde_json::from_slice(&body)?;
            assert_eq!(bundle["total"], 2);
            Ok(())
        })
    })
    .await
}
