//! Route definitions for the `/jobs` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                -> submit_job
/// DELETE /?url=&email=    -> delete_jobs
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(jobs::submit_job).delete(jobs::delete_jobs))
}
