#![allow(dead_code)]

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Result, anyhow};
use axum_test::TestServer;
use jellyfin_export_core::{
    EntityId,
    settings::{ExportSettings, LibrarySettings},
    tree::DriveEntity,
};
use jellyfin_export_server::{
    AppState, create_app,
    infra::{
        app_state::Backends,
        config::Config,
        workers::{WorkerPool, WorkerTick},
    },
};
use tempfile::TempDir;

/// In-memory application with a scratch drive and export root.
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub drive: PathBuf,
    pub export_root: PathBuf,
    _dir: TempDir,
}

pub fn id(value: &str) -> EntityId {
    EntityId::new(value)
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let drive = dir.path().join("drive");
        let export_root = dir.path().join("jellyfin");
        tokio::fs::create_dir_all(&drive).await?;
        tokio::fs::create_dir_all(&export_root).await?;

        let config = Config {
            dev_mode: true,
            ..Config::default()
        };
        let state = AppState::new(Arc::new(config), Backends::in_memory());

        let make_service =
            create_app(state.clone()).into_make_service_with_connect_info::<SocketAddr>();
        let server = TestServer::builder()
            .http_transport()
            .build(make_service)
            .map_err(|err| anyhow!(err.to_string()))?;

        Ok(Self {
            server,
            state,
            drive,
            export_root,
            _dir: dir,
        })
    }

    /// Export enabled with Movies and Shows rooted at `movies` and `shows`.
    pub fn settings(&self, enabled: bool) -> ExportSettings {
        ExportSettings {
            enabled,
            export_root: self.export_root.clone(),
            libraries: vec![
                LibrarySettings::new("Movies", id("movies")),
                LibrarySettings {
                    export_subdir: Some("TV".into()),
                    ..LibrarySettings::new("Shows", id("shows"))
                },
            ],
            ..ExportSettings::default()
        }
    }

    pub async fn store_settings(&self, enabled: bool) -> Result<()> {
        self.state.settings().save(&self.settings(enabled)).await?;
        Ok(())
    }

    /// Drive root with the two library folders.
    pub async fn seed_drive(&self) -> Result<()> {
        for entity in [
            DriveEntity::folder("root", "My Drive", None),
            DriveEntity::folder("movies", "Movies", Some(id("root"))),
            DriveEntity::folder("shows", "Shows", Some(id("root"))),
        ] {
            self.state.entities().save(&entity).await?;
        }
        Ok(())
    }

    /// Write a source file and return the entity describing it.
    pub async fn drive_file(
        &self,
        entity: &str,
        title: &str,
        parent: &str,
    ) -> Result<DriveEntity> {
        let path = self.drive.join(entity);
        tokio::fs::write(&path, entity.as_bytes()).await?;
        Ok(DriveEntity::file(
            entity,
            title,
            Some(id(parent)),
            path.to_string_lossy(),
        ))
    }

    pub async fn drain(&self) -> Result<Vec<WorkerTick>> {
        Ok(WorkerPool::from_state(&self.state).drain("test-worker").await?)
    }
}
