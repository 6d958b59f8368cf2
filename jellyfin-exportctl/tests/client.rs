use std::{net::SocketAddr, sync::Arc};

use jellyfin_export_core::{
    EntityId,
    actions::{ActionOutcome, SettingsForm},
    api::types::ExportsQuery,
    settings::{ExportSettings, LibrarySettings},
};
use jellyfin_export_server::{
    AppState, create_app,
    infra::{app_state::Backends, config::Config},
};
use jellyfin_exportctl::{ClientError, ExportClient};

async fn spawn_server() -> (ExportClient, AppState) {
    let state = AppState::new(Arc::new(Config::default()), Backends::in_memory());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(state.clone()).into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = ExportClient::new(&format!("http://{addr}")).unwrap();
    (client, state)
}

fn settings(enabled: bool) -> ExportSettings {
    ExportSettings {
        enabled,
        export_root: "/srv/jellyfin".into(),
        libraries: vec![
            LibrarySettings::new("Movies", EntityId::new("movies")),
            LibrarySettings::new("Shows", EntityId::new("shows")),
        ],
        ..ExportSettings::default()
    }
}

#[tokio::test]
async fn form_clicks_reach_the_server() {
    let (client, state) = spawn_server().await;
    client.put_settings(&settings(true)).await.unwrap();
    let form = SettingsForm::new();

    let outcome = form.click("Sync All", &client).await.unwrap();
    assert_eq!(
        outcome,
        ActionOutcome::Succeeded {
            message: "Queued full sync.".into()
        }
    );

    let outcome = form.click("Sync Shows", &client).await.unwrap();
    assert_eq!(outcome.message(), "Queued Shows sync.");

    let kinds: Vec<&str> = state
        .queue()
        .recent(10)
        .await
        .unwrap()
        .iter()
        .map(|job| job.payload.name())
        .collect();
    assert_eq!(kinds, ["export_library", "sync_library", "sync_library"]);
}

#[tokio::test]
async fn server_rejection_becomes_failed_outcome() {
    let (client, _state) = spawn_server().await;
    client.put_settings(&settings(false)).await.unwrap();

    let outcome = SettingsForm::new()
        .click("Sync All", &client)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ActionOutcome::Failed {
            message: "Sync failed: Jellyfin Export is disabled.".into()
        }
    );
}

#[tokio::test]
async fn read_models_decode() {
    let (client, _state) = spawn_server().await;
    client.put_settings(&settings(true)).await.unwrap();
    client
        .call_method(&jellyfin_export_core::actions::RemoteCall::sync_all())
        .await
        .unwrap();

    let overview = client.jobs(Some(5)).await.unwrap();
    assert_eq!(overview.recent.len(), 2);
    let job = client.job(overview.recent[0].id.0).await.unwrap();
    assert_eq!(job.id, overview.recent[0].id);

    let exports = client.exports(&ExportsQuery::default()).await.unwrap();
    assert!(exports.is_empty());

    let stored = client.settings().await.unwrap();
    assert_eq!(stored.libraries.len(), 2);
}

#[tokio::test]
async fn invalid_settings_surface_server_message() {
    let (client, _state) = spawn_server().await;
    let err = client
        .put_settings(&ExportSettings {
            enabled: true,
            ..ExportSettings::default()
        })
        .await
        .unwrap_err();
    match err {
        ClientError::Server { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "export_root is required when the export is enabled");
        }
        other => panic!("unexpected error {other:?}"),
    }
}
