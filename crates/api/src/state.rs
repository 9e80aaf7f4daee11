use std::sync::Arc;

use autotune_cloud::{ArtifactStore, BatchScheduler};
use autotune_notify::Mailer;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the cloud clients and mailer sit behind `Arc` so tests
/// can swap in fakes.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: autotune_db::DbPool,
    pub config: Arc<ServerConfig>,
    pub scheduler: Arc<dyn BatchScheduler>,
    pub store: Arc<dyn ArtifactStore>,
    pub mailer: Arc<dyn Mailer>,
}
