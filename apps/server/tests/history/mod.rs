//! `_history`, vread and the version tracker's concurrency guarantees.

mod tracker;

use crate::support::*;
use axum::http::{Method, StatusCode};
use ehr_server::AppState;
use serde_json::{json, Value as JsonValue};

#[tokio::test]
async fn history_lists_versions_newest_first() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let created = create(app, &care_plan("p-1", "draft", "Plan")).await?;
            let id = id_of(&created);
            let path = format!("/fhir/CarePlan/{}", id);

            let mut next = created.clone();
            next["status"] = json!("active");
            let (status, _headers, body) = app
                .request(Method::PUT, &path, Some(to_json_body(&next)?))
                .await?;
            assert_status(status, StatusCode::OK, &body);

            let (status, _headers, body) = app.request(Method::DELETE, &path, None).await?;
            assert_status(status, StatusCode::NO_CONTENT, &body);

            let (status, _headers, body) = app
                .request(Method::GET, &format!("{}/_history", path), None)
                .await?;
            assert_status(status, StatusCode::OK, &body);
            let bundle: JsonValue = serde_json::from_slice(&body)?;
            assert_bundle_type(&bundle, "history");
            assert_eq!(bundle["total"], 3);

            let entries = get_bundle_entries(&bundle);
            let methods: Vec<&str> = entries
                .iter()
                .filter_map(|e| e["request"]["method"].as_str())
                .collect();
            assert_eq!(methods, vec!["DELETE", "PUT", "POST"]);
            assert!(entries[0].get("resource").is_none());
            assert_eq!(entries[1]["resource"]["status"], "active");
            assert_eq!(entries[2]["resource"]["status"], "draft");
            assert_eq!(entries[2]["response"]["etag"], "W/\"1\"");

            // Paged
            let (_status, _headers, body) = app
                .request(Method::GET, &format!("{}/_history?_count=1&_offset=1", path), None)
                .await?;
            let page: JsonValue = serde_json::from_slice(&body)?;
            assert_eq!(page["total"], 3);
            let entries = get_bundle_entries(&page);
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0]["request"]["method"], "PUT");

            let (_status, _headers, body) = app
                .request(Method::GET, &format!("{}/_history?_offset=10", path), None)
                .await?;
            let past_end: JsonValue = serde_json::from_slice(&body)?;
            assert_eq!(past_end["total"], 3);
            assert!(get_bundle_entries(&past_end).is_empty());
            assert!(link_url(&past_end, "self")
                .is_some_and(|l| l.ends_with(&format!("/fhir/CarePlan/{}/_history", id))));
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn vread_returns_the_recorded_snapshot() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let created = create(app, &care_plan("p-1", "draft", "Plan")).await?;
            let path = format!("/fhir/CarePlan/{}", id_of(&created));
            let v1_path = format!("{}/_history/1", path);

            let (status, headers, first) = app.request(Method::GET, &v1_path, None).await?;
            assert_status(status, StatusCode::OK, &first);
            assert_etag(&headers, 1);
            assert!(header(&headers, "last-modified").is_some());
            assert_eq!(serde_json::from_slice::<JsonValue>(&first)?, created);

            let mut next = created.clone();
            next["title"] = json!("Revised");
            let (status, _headers, body) = app
                .request(Method::PUT, &path, Some(to_json_body(&next)?))
                .await?;
            assert_status(status, StatusCode::OK, &body);

            let (status, _headers, again) = app.request(Method::GET, &v1_path, None).await?;
            assert_status(status, StatusCode::OK, &again);
            assert_eq!(first, again);

            let (status, _headers, v2) = app
                .request(Method::GET, &format!("{}/_history/2", path), None)
                .await?;
            assert_status(status, StatusCode::OK, &v2);
            assert_eq!(serde_json::from_slice::<JsonValue>(&v2)?["title"], "Revised");

            let (status, _headers, body) = app
                .request(Method::GET, &format!("{}/_history/9", path), None)
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, &body);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn vread_of_tombstone_is_deleted() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let created = create(app, &care_plan("p-1", "draft", "Plan")).await?;
            let path = format!("/fhir/CarePlan/{}", id_of(&created));
            app.request(Method::DELETE, &path, None).await?;

            let (status, _headers, body) = app
                .request(Method::GET, &format!("{}/_history/2", path), None)
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, &body);
            assert_eq!(assert_outcome(&body)["issue"][0]["code"], "deleted");

            let (status, _headers, body) = app
                .request(Method::GET, &format!("{}/_history/1", path), None)
                .await?;
            assert_status(status, StatusCode::OK, &body);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn history_of_unknown_resource_is_404() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (status, _headers, body) = app
                .request(Method::GET, "/fhir/CarePlan/never-created/_history", None)
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, &body);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn untracked_resource_reports_current_version() -> anyhow::Result<()> {
    with_test_app_with_config(
        |config| config.history.enabled = false,
        |app| {
            Box::pin(async move {
                assert!(app.state.version_tracker.is_none());

                let created = create(app, &care_plan("p-1", "draft", "Plan")).await?;
                let path = format!("/fhir/CarePlan/{}", id_of(&created));
                let mut next = created.clone();
                next["status"] = json!("active");
                app.request(Method::PUT, &path, Some(to_json_body(&next)?))
                    .await?;

                let (status, _headers, body) = app
                    .request(Method::GET, &format!("{}/_history", path), None)
                    .await?;
                assert_status(status, StatusCode::OK, &body);
                let bundle: JsonValue = serde_json::from_slice(&body)?;
                assert_eq!(bundle["total"], 1);
                let entries = get_bundle_entries(&bundle);
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0]["request"]["method"], "POST");
                assert_eq!(entries[0]["response"]["etag"], "W/\"2\"");
                assert_eq!(entries[0]["resource"]["status"], "active");

                let (status, _headers, body) = app
                    .request(Method::GET, &format!("{}/_history/2", path), None)
                    .await?;
                assert_status(status, StatusCode::OK, &body);

                let (status, _headers, body) = app
                    .request(Method::GET, &format!("{}/_history/1", path), None)
                    .await?;
                assert_status(status, StatusCode::NOT_FOUND, &body);
                Ok(())
            })
        },
    )
    .await
}

#[tokio::test]
async fn tracking_enabled_after_create_continues_from_current_version() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let mut untracked_config = (*app.state.config).clone();
            untracked_config.history.enabled = false;
            let untracked = AppState::from_pool(untracked_config, app.state.db_pool.clone());

            let created = untracked
                .resource_service
                .create("CarePlan", care_plan("p-1", "draft", "Plan"))
                .await?;
            assert_eq!(created.version_id, 1);

            let mut next = created.to_fhir();
            next["status"] = json!("active");
            let path = format!("/fhir/CarePlan/{}", created.fhir_id);
            let (status, headers, body) = app
                .request(Method::PUT, &path, Some(to_json_body(&next)?))
                .await?;
            assert_status(status, StatusCode::OK, &body);
            assert_etag(&headers, 2);

            let (_status, _headers, body) = app
                .request(Method::GET, &format!("{}/_history", path), None)
                .await?;
            let bundle: JsonValue = serde_json::from_slice(&body)?;
            assert_eq!(bundle["total"], 1);
            assert_eq!(get_bundle_entries(&bundle)[0]["response"]["etag"], "W/\"2\"");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn tracking_resumes_after_untracked_updates() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let created = create(app, &care_plan("p-1", "draft", "Plan")).await?;
            let id = id_of(&created);

            let mut untracked_config = (*app.state.config).clone();
            untracked_config.history.enabled = false;
            let untracked = AppState::from_pool(untracked_config, app.state.db_pool.clone());
            let mut next = created.clone();
            next["status"] = json!("active");
            let row = untracked
                .resource_service
                .update("CarePlan", &id, next.clone(), None)
                .await?;
            assert_eq!(row.version_id, 2);

            next["status"] = json!("completed");
            let path = format!("/fhir/CarePlan/{}", id);
            let (status, headers, body) = app
                .request(Method::PUT, &path, Some(to_json_body(&next)?))
                .await?;
            assert_status(status, StatusCode::OK, &body);
            assert_etag(&headers, 3);

            let (_status, _headers, body) = app
                .request(Method::GET, &format!("{}/_history", path), None)
                .await?;
            let bundle: JsonValue = serde_json::from_slice(&body)?;
            let etags: Vec<String> = get_bundle_entries(&bundle)
                .iter()
                .filter_map(|e| e["response"]["etag"].as_str().map(str::to_string))
                .collect();
            assert_eq!(etags, vec!["W/\"3\"", "W/\"1\""]);
            Ok(())
        })
    })
    .await
}
