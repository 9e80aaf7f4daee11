//! Completion webhook called by each job's upload task.

use autotune_core::types::DbId;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use crate::engine::completion::handle_job_finished;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct JobFinishedQuery {
    pub id: DbId,
    pub key: String,
    /// Commit of the tuning tool that ran the job.
    pub commit: Option<String>,
}

/// GET /api/v1/results/job-finished?id=&key=&commit=
///
/// Always answers with an empty 200 once the job has been handled, whatever
/// its outcome, so the upload task is not marked failed.
///
/// The work runs on its own task: once the email has gone out, the terminal
/// write must happen even if the caller hangs up.
pub async fn job_finished(
    State(state): State<AppState>,
    Query(query): Query<JobFinishedQuery>,
) -> AppResult<StatusCode> {
    let JobFinishedQuery { id, key, commit } = query;
    tokio::spawn(async move { handle_job_finished(&state, id, &key, commit.as_deref()).await })
        .await
        .map_err(|e| AppError::InternalError(format!("Completion task for job {id} failed: {e}")))??;
    Ok(StatusCode::OK)
}
