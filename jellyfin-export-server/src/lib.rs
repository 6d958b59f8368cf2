//! # Jellyfin Export Server
//!
//! HTTP front and job workers of Jellyfin Export.
//!
//! ## Overview
//!
//! - **Remote methods**: the settings form triggers full and per-library syncs
//! - **Drive hooks**: entity changes and trash events queue export updates
//! - **Workers**: queued jobs heal the drive tree and refresh the export view
//! - **Scheduler**: a periodic resync catches anything the hooks missed
//!
//! ## Architecture
//!
//! The server is built on Axum and uses:
//! - PostgreSQL for settings, drive entities, the export map and the job queue
//! - Redis for cross-process export locks
//!
//! Without `DATABASE_URL` everything runs in memory, which suits tests and
//! demos.

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
pub use routes::create_app;
