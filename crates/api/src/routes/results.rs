//! Route definitions for `/results`.
//!
//! Not authenticated by the caller's identity: the completion callback
//! carries the shared key in its query string.

use axum::routing::get;
use axum::Router;

use crate::handlers::results;
use crate::state::AppState;

/// Routes mounted at `/results`.
///
/// ```text
/// GET    /job-finished?id=&key=&commit=   -> job_finished
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/job-finished", get(results::job_finished))
}
