//! # Jellyfin Export Core
//!
//! Keeps a Jellyfin-friendly view of the media stored in a drive: one
//! directory per library mirroring the drive's folder tree, filled with
//! hardlinks (or copies, or symlinks) of the video, subtitle and image files.
//! Jellyfin scans that view on its own schedule.
//!
//! ## Overview
//!
//! - **Settings form**: the three sync buttons of the settings screen and the
//!   remote methods behind them ([`actions`])
//! - **Sync triggers**: manual syncs, drive entity hooks and the nightly
//!   resync turn into queued jobs ([`sync`])
//! - **Export engine**: walks the drive tree and maintains the export view
//!   plus its bookkeeping map ([`exporter`], [`export_map`], [`tree`])
//! - **Jobs and locks**: queue port with in-memory and Postgres adapters,
//!   named locks with in-process and Redis adapters ([`jobs`], [`lock`])
//!
//! ## Feature Flags
//!
//! - `database`: Postgres repositories and queue (SQLx) plus Redis locks
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use jellyfin_export_core::{
//!     jobs::InMemoryQueue,
//!     settings::InMemorySettingsRepository,
//!     sync::SyncService,
//!     tree::InMemoryEntityStore,
//! };
//!
//! async fn queue_everything() -> Result<(), Box<dyn std::error::Error>> {
//!     let sync = SyncService::new(
//!         Arc::new(InMemorySettingsRepository::new()),
//!         Arc::new(InMemoryEntityStore::new()),
//!         Arc::new(InMemoryQueue::new()),
//!     );
//!     let accepted = sync.sync_all().await?;
//!     println!("{} ({} jobs)", accepted.message, accepted.jobs.len());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod actions;
pub mod api;

#[cfg(feature = "database")]
#[cfg_attr(docsrs, doc(cfg(feature = "database")))]
pub mod database;

#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub mod error;
pub mod export_map;
pub mod exporter;
pub mod fsops;
pub mod jobs;
pub mod lock;
pub mod naming;
pub mod runner;
pub mod settings;
pub mod sync;
pub mod tree;
pub mod types;

pub use error::{ExportError, Result};
pub use types::{EntityId, JobId, QueueName};
