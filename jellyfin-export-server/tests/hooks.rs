use anyhow::Result;
use axum::http::StatusCode;
use jellyfin_export_core::{
    api::routes::v1, export_map::ExportStatus, tree::DriveEntity,
};
use jellyfin_export_server::infra::workers::WorkerTick;
use serde_json::{Value, json};

mod common;
use common::{TestApp, id};

#[tokio::test]
async fn pushed_file_is_exported_then_removed_on_trash() -> Result<()> {
    let app = TestApp::new().await?;
    app.store_settings(true).await?;
    app.seed_drive().await?;
    app.state
        .entities()
        .save(&DriveEntity::folder("heat", "Heat (1995)", Some(id("movies"))))
        .await?;
    let file = app.drive_file("heat-mkv", "Heat.mkv", "heat").await?;

    let response = app
        .server
        .post(v1::hooks::DRIVE_ENTITY)
        .json(&json!({"entity": "heat-mkv", "event": "changed", "snapshot": file}))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    assert!(response.json::<Value>()["data"]["job_id"].is_string());

    let ticks = app.drain().await?;
    assert_eq!(ticks.len(), 1);
    assert!(matches!(ticks[0], WorkerTick::Completed(_)));

    let exported = app.export_root.join("Movies/Heat (1995)/Heat.mkv");
    assert!(tokio::fs::try_exists(&exported).await?);

    let listed = app
        .server
        .get(v1::exports::LIST)
        .add_query_param("library", "Movies")
        .add_query_param("status", "exported")
        .await
        .json::<Value>();
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
    assert_eq!(listed["data"][0]["drive_entity"], "heat-mkv");

    app.server
        .post(v1::hooks::DRIVE_ENTITY)
        .json(&json!({"entity": "heat-mkv", "event": "trashed"}))
        .await
        .assert_status(StatusCode::ACCEPTED);
    app.drain().await?;

    assert!(!tokio::fs::try_exists(&exported).await?);
    let record = app.state.exports().get(&id("heat-mkv")).await?.unwrap();
    assert_eq!(record.status, ExportStatus::Deleted);
    Ok(())
}

#[tokio::test]
async fn entity_outside_libraries_queues_nothing() -> Result<()> {
    let app = TestApp::new().await?;
    app.store_settings(true).await?;
    app.seed_drive().await?;
    let stray = app.drive_file("stray", "Stray.mkv", "root").await?;

    let response = app
        .server
        .post(v1::hooks::DRIVE_ENTITY)
        .json(&json!({"entity": "stray", "event": "changed", "snapshot": stray}))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    assert!(response.json::<Value>()["data"]["job_id"].is_null());
    assert!(app.drain().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn mismatched_snapshot_is_rejected() -> Result<()> {
    let app = TestApp::new().await?;
    let other = DriveEntity::folder("other", "Other", None);

    app.server
        .post(v1::hooks::DRIVE_ENTITY)
        .json(&json!({"entity": "heat", "event": "changed", "snapshot": other}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    assert!(app.state.entities().get(&id("other")).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn failed_job_is_recorded() -> Result<()> {
    let app = TestApp::new().await?;
    app.store_settings(true).await?;
    app.seed_drive().await?;

    // Libraries disabled between the click and the worker run.
    app.state.sync.sync_all().await?;
    let mut settings = app.settings(true);
    for lib in &mut settings.libraries {
        lib.enabled = false;
    }
    app.state.settings().save(&settings).await?;

    let messages: Vec<String> = app
        .drain()
        .await?
        .into_iter()
        .map(|tick| match tick {
            WorkerTick::Failed(_, message) => message,
            other => panic!("expected failure, got {other:?}"),
        })
        .collect();
    assert_eq!(
        messages,
        [
            "Library not found or disabled: Movies",
            "Library not found or disabled: Shows"
        ]
    );

    let overview = app
        .server
        .get(v1::jobs::OVERVIEW)
        .await
        .json::<Value>();
    assert_eq!(overview["data"]["snapshot"]["queues"]["long"]["failed"], 2);
    assert_eq!(
        overview["data"]["recent"][0]["last_error"],
        "Library not found or disabled: Shows"
    );
    Ok(())
}
