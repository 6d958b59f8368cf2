use anyhow::Result;
use axum::http::StatusCode;
use jellyfin_export_core::{
    api::routes::{utils::replace_param, v1},
    actions::RemoteMethod,
};
use serde_json::{Value, json};

mod common;
use common::TestApp;

fn method_path(method: RemoteMethod) -> String {
    replace_param(v1::method::CALL, "{method}", method.name())
}

#[tokio::test]
async fn ping_and_health_respond() -> Result<()> {
    let app = TestApp::new().await?;

    let ping = app.server.get("/ping").await;
    ping.assert_status_ok();
    assert_eq!(ping.json::<Value>()["status"], "ok");

    let health = app.server.get("/health").await;
    health.assert_status_ok();
    let body = health.json::<Value>();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"]["type"], "memory");
    Ok(())
}

#[tokio::test]
async fn settings_form_lists_three_buttons() -> Result<()> {
    let app = TestApp::new().await?;

    let response = app.server.get(v1::settings::FORM).await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    let labels: Vec<&str> = body["data"]["buttons"]
        .as_array()
        .unwrap()
        .iter()
        .map(|button| button["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, ["Sync All", "Sync Movies", "Sync Shows"]);
    assert_eq!(
        body["data"]["buttons"][1]["call"]["args"]["library_name"],
        "Movies"
    );
    Ok(())
}

#[tokio::test]
async fn sync_all_is_rejected_while_disabled() -> Result<()> {
    let app = TestApp::new().await?;
    app.store_settings(false).await?;

    let response = app.server.post(&method_path(RemoteMethod::SyncAll)).await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(
        response.json::<Value>()["error"]["message"],
        "Jellyfin Export is disabled."
    );
    assert!(app.state.queue().recent(10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn sync_all_queues_one_job_per_library() -> Result<()> {
    let app = TestApp::new().await?;
    app.store_settings(true).await?;

    let response = app.server.post(&method_path(RemoteMethod::SyncAll)).await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Queued");
    assert_eq!(body["data"]["jobs"].as_array().unwrap().len(), 2);

    let overview = app.server.get(v1::jobs::OVERVIEW).await.json::<Value>();
    assert_eq!(overview["data"]["snapshot"]["queues"]["long"]["queued"], 2);
    Ok(())
}

#[tokio::test]
async fn sync_library_validates_arguments() -> Result<()> {
    let app = TestApp::new().await?;
    app.store_settings(true).await?;
    let path = method_path(RemoteMethod::SyncLibrary);

    app.server
        .post(&path)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let missing = app
        .server
        .post(&path)
        .json(&json!({"library_name": "Anime"}))
        .await;
    missing.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(
        missing.json::<Value>()["error"]["message"],
        "Library not found or disabled: Anime"
    );

    let queued = app
        .server
        .post(&path)
        .json(&json!({"library_name": "Shows"}))
        .await;
    queued.assert_status_ok();
    let job_id = queued.json::<Value>()["data"]["jobs"][0]
        .as_str()
        .unwrap()
        .to_string();

    let job = app
        .server
        .get(&replace_param(v1::jobs::ITEM, "{id}", &job_id))
        .await;
    job.assert_status_ok();
    let job = job.json::<Value>();
    assert_eq!(job["data"]["payload"]["kind"], "export_library");
    assert_eq!(job["data"]["payload"]["payload"]["export_subdir"], "TV");
    assert_eq!(job["data"]["timeout"], 3600);
    Ok(())
}

#[tokio::test]
async fn unknown_method_and_job_are_not_found() -> Result<()> {
    let app = TestApp::new().await?;

    app.server
        .post(&replace_param(v1::method::CALL, "{method}", "frappe.client.delete"))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    app.server
        .get(&replace_param(
            v1::jobs::ITEM,
            "{id}",
            "0190a5b4-6f1e-7c3a-9d2e-000000000000",
        ))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn settings_round_trip_and_validation() -> Result<()> {
    let app = TestApp::new().await?;

    let invalid = json!({"enabled": true, "export_root": "", "libraries": []});
    app.server
        .put(v1::settings::DOCUMENT)
        .json(&invalid)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let settings = app.settings(true);
    app.server
        .put(v1::settings::DOCUMENT)
        .json(&settings)
        .await
        .assert_status_ok();

    let stored = app.server.get(v1::settings::DOCUMENT).await.json::<Value>();
    assert_eq!(stored["data"]["enabled"], true);
    assert_eq!(stored["data"]["libraries"][1]["export_subdir"], "TV");
    assert_eq!(stored["data"]["link_mode"], "hardlink");
    Ok(())
}
