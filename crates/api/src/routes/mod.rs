pub mod health;
pub mod jobs;
pub mod results;

use axum::routing::get;
use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                       submit (POST), delete by url+email (DELETE)
/// /about                      last recorded tool commit
/// /results/job-finished       completion callback (GET, shared key)
/// ```
///
/// `timeout` wraps every route except the completion callback. Cutting that
/// one short between the email and the terminal write would make the upload
/// task retry and the user receive a second email.
pub fn api_routes(timeout: TimeoutLayer) -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .route("/about", get(handlers::about::about))
        .layer(timeout)
        .nest("/results", results::router())
}
