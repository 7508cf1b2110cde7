use crate::support::*;
use chrono::{Duration, Utc};
use ehr_server::{db::VersionTracker, Error};
use serde_json::json;
use std::sync::Arc;

fn tracker(app: &TestApp) -> anyhow::Result<Arc<dyn VersionTracker>> {
    app.state
        .version_tracker
        .clone()
        .ok_or_else(|| anyhow::anyhow!("history tracking is disabled"))
}

#[tokio::test]
async fn concurrent_updates_from_same_version_conflict() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let tracker = tracker(app)?;
            let pool = &app.state.db_pool;
            let doc = json!({"resourceType": "CarePlan", "id": "race", "status": "draft"});

            let mut tx = pool.begin().await?;
            tracker
                .record_create(&mut *tx, "CarePlan", "race", &doc, Utc::now())
                .await?;
            tx.commit().await?;

            let write = |status: &'static str| {
                let tracker = tracker.clone();
                async move {
                    let mut tx = pool.begin().await?;
                    let doc = json!({"resourceType": "CarePlan", "id": "race", "status": status});
                    let result = tracker
                        .record_update(&mut *tx, "CarePlan", "race", 1, &doc, Utc::now())
                        .await;
                    if result.is_ok() {
                        tx.commit().await?;
                    }
                    anyhow::Ok(result)
                }
            };

            let (a, b) = tokio::join!(write("active"), write("revoked"));
            let results = [a?, b?];

            let won: Vec<i32> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
            assert_eq!(won, vec![2]);
            assert_eq!(
                results
                    .iter()
                    .filter(|r| matches!(r, Err(Error::VersionConflict { expected: 1, .. })))
                    .count(),
                1
            );

            let (entries, total) = tracker.list_versions("CarePlan", "race", 10, 0).await?;
            assert_eq!(total, 2);
            assert_eq!(
                entries.iter().map(|e| e.version_id).collect::<Vec<_>>(),
                vec![2, 1]
            );
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn stale_version_is_rejected_without_writing() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let tracker = tracker(app)?;
            let pool = &app.state.db_pool;
            let doc = json!({"resourceType": "CarePlan", "id": "stale"});

            let mut tx = pool.begin().await?;
            tracker
                .record_create(&mut *tx, "CarePlan", "stale", &doc, Utc::now())
                .await?;
            tracker
                .record_update(&mut *tx, "CarePlan", "stale", 1, &doc, Utc::now())
                .await?;
            tx.commit().await?;

            let mut tx = pool.begin().await?;
            let result = tracker
                .record_delete(&mut *tx, "CarePlan", "stale", 1, Utc::now())
                .await;
            assert!(matches!(result, Err(Error::VersionConflict { .. })));
            drop(tx);

            let (_, total) = tracker.list_versions("CarePlan", "stale", 10, 0).await?;
            assert_eq!(total, 2);

            // A second create for the same resource is refused.
            let mut tx = pool.begin().await?;
            let result = tracker
                .record_create(&mut *tx, "CarePlan", "stale", &doc, Utc::now())
                .await;
            assert!(matches!(result, Err(Error::VersionConflict { .. })));
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn version_ahead_of_head_is_rejected_without_gap() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let tracker = tracker(app)?;
            let pool = &app.state.db_pool;
            let doc = json!({"resourceType": "CarePlan", "id": "gap"});

            let mut tx = pool.begin().await?;
            tracker
                .record_create(&mut *tx, "CarePlan", "gap", &doc, Utc::now())
                .await?;
            tx.commit().await?;

            let mut tx = pool.begin().await?;
            let result = tracker
                .record_update(&mut *tx, "CarePlan", "gap", 5, &doc, Utc::now())
                .await;
            assert!(matches!(
                result,
                Err(Error::VersionConflict { expected: 5, .. })
            ));
            drop(tx);

            let (entries, total) = tracker.list_versions("CarePlan", "gap", 10, 0).await?;
            assert_eq!(total, 1);
            assert_eq!(
                entries.iter().map(|e| e.version_id).collect::<Vec<_>>(),
                vec![1]
            );
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn sync_head_only_moves_forward() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let tracker = tracker(app)?;
            let pool = &app.state.db_pool;
            let doc = json!({"resourceType": "CarePlan", "id": "sync"});

            let mut tx = pool.begin().await?;
            tracker
                .record_create(&mut *tx, "CarePlan", "sync", &doc, Utc::now())
                .await?;
            tracker.sync_head(&mut *tx, "CarePlan", "sync", 3).await?;
            assert_eq!(
                tracker
                    .record_update(&mut *tx, "CarePlan", "sync", 3, &doc, Utc::now())
                    .await?,
                4
            );
            // Behind the head: no effect, the stale version still conflicts.
            tracker.sync_head(&mut *tx, "CarePlan", "sync", 2).await?;
            tx.commit().await?;

            let mut tx = pool.begin().await?;
            let result = tracker
                .record_update(&mut *tx, "CarePlan", "sync", 2, &doc, Utc::now())
                .await;
            assert!(matches!(result, Err(Error::VersionConflict { .. })));
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn rolled_back_write_leaves_no_history() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let tracker = tracker(app)?;
            let doc = json!({"resourceType": "CarePlan", "id": "rollback"});

            let mut tx = app.state.db_pool.begin().await?;
            let version = tracker
                .record_create(&mut *tx, "CarePlan", "rollback", &doc, Utc::now())
                .await?;
            assert_eq!(version, 1);
            tx.rollback().await?;

            assert!(tracker
                .get_version("CarePlan", "rollback", 1)
                .await?
                .is_none());
            let (entries, total) = tracker.list_versions("CarePlan", "rollback", 10, 0).await?;
            assert!(entries.is_empty());
            assert_eq!(total, 0);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn pruning_keeps_latest_version() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let tracker = tracker(app)?;
            let doc = json!({"resourceType": "CarePlan", "id": "old"});
            let long_ago = Utc::now() - Duration::days(400);

            let mut tx = app.state.db_pool.begin().await?;
            tracker
                .record_create(&mut *tx, "CarePlan", "old", &doc, long_ago)
                .await?;
            tracker
                .record_update(&mut *tx, "CarePlan", "old", 1, &doc, long_ago)
                .await?;
            tx.commit().await?;

            let removed =
                ehr_server::background::prune_history_once(tracker.as_ref(), 30).await?;
            assert_eq!(removed, 1);

            let (entries, total) = tracker.list_versions("CarePlan", "old", 10, 0).await?;
            assert_eq!(total, 1);
            assert_eq!(entries[0].version_id, 2);
            Ok(())
        })
    })
    .await
}
