//! Completion flow, driven by the upload task's callback.
//!
//! Every problem met while reading the job's output is folded into a
//! [`CompletionOutcome::Failure`] so the user still gets an email and the
//! record still reaches its terminal state. Only an email or database
//! failure before the terminal write is returned to the caller, which makes
//! the upload task retry the callback.

use autotune_cloud::{BlobRef, CloudError, TaskStatus};
use autotune_core::error::CoreError;
use autotune_core::hashing::secrets_match;
use autotune_core::naming::{job_name, COMPUTE_TASK_ID, PRIMARY_RESULT_BLOB_NAME};
use autotune_core::recommendations::{
    parse_recommendations, RecommendationParseError, Recommendations,
};
use autotune_core::types::DbId;
use autotune_db::models::job::{Job, JobCompletion};
use autotune_db::repositories::{JobRepo, SettingRepo};
use autotune_notify::EmailAttachment;

use crate::engine::notifier;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Result of a finished tuning run, as reported to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Success {
        recommendations: Recommendations,
        /// The recommendations log as downloaded; persisted as the result.
        raw_log: String,
    },
    /// The run failed, or its output could not be used. `reason` is set when
    /// something other than the tool itself went wrong.
    Failure { reason: Option<String> },
}

impl CompletionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Text stored as the job's result.
    pub fn result_text(&self) -> String {
        match self {
            Self::Success { raw_log, .. } => raw_log.clone(),
            Self::Failure { reason } => reason.clone().unwrap_or_default(),
        }
    }
}

/// What the callback did with a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackDisposition {
    Processed { failed: bool },
    /// The job had already been completed by an earlier callback.
    AlreadyFinished,
}

/// Problems reading a successful run's output.
#[derive(Debug, thiserror::Error)]
pub enum ResultProcessingError {
    #[error("Failed to download results: {0}")]
    Download(#[from] CloudError),

    #[error("Failed to parse results: {0}")]
    Parse(#[from] RecommendationParseError),

    #[error("Failed to read job request: {0}")]
    Record(#[from] CoreError),
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Process the completion callback for `job_id`.
///
/// A wrong `key` is reported exactly like an unknown job, and touches
/// nothing. A job that is already finished is left alone.
pub async fn handle_job_finished(
    state: &AppState,
    job_id: DbId,
    key: &str,
    commit: Option<&str>,
) -> AppResult<CallbackDisposition> {
    let not_found = || {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        })
    };

    if !secrets_match(key, &state.config.results_callback_key) {
        tracing::warn!(job_id, "Completion callback rejected: invalid key");
        return Err(not_found());
    }

    let job = JobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or_else(not_found)?;

    if job.is_finished() {
        tracing::info!(job_id, "Completion callback for finished job ignored");
        return Ok(CallbackDisposition::AlreadyFinished);
    }

    let name = job_name(job.id);
    let (status, outcome) = match state.scheduler.task_status(&name, COMPUTE_TASK_ID).await {
        Ok(status) if status.succeeded() => {
            let outcome = fetch_results(state, &job, &name).await;
            (status, outcome)
        }
        Ok(status) => {
            tracing::info!(job_id, exit_code = ?status.exit_code, "Compute task did not succeed");
            (status, CompletionOutcome::Failure { reason: None })
        }
        Err(err) => {
            tracing::warn!(job_id, error = %err, "Could not read compute task status");
            let reason = format!("Failed to read compute task status: {err}");
            (
                TaskStatus::default(),
                CompletionOutcome::Failure {
                    reason: Some(reason),
                },
            )
        }
    };

    let attachments = collect_attachments(state, &name).await;
    notifier::send_results(
        state.mailer.as_ref(),
        &job.email_results_to,
        &outcome,
        attachments,
    )
    .await?;

    let failed = !outcome.is_success();
    let completion = JobCompletion {
        processing_started: status.start_time,
        processing_completed: status.end_time,
        result: outcome.result_text(),
        failed,
    };
    if !JobRepo::update_completion(&state.pool, job.id, &completion).await? {
        tracing::warn!(job_id, "Job was completed concurrently, outcome not stored");
    }

    if let Some(commit) = commit.map(str::trim).filter(|c| !c.is_empty()) {
        record_commit(state, job_id, commit).await;
    }

    tracing::info!(job_id, failed, "Job completion processed");
    Ok(CallbackDisposition::Processed { failed })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn fetch_results(state: &AppState, job: &Job, name: &str) -> CompletionOutcome {
    match try_fetch_results(state, job, name).await {
        Ok((recommendations, raw_log)) => CompletionOutcome::Success {
            recommendations,
            raw_log,
        },
        Err(err) => {
            tracing::warn!(job_id = job.id, error = %err, "Result processing failed");
            CompletionOutcome::Failure {
                reason: Some(err.to_string()),
            }
        }
    }
}

async fn try_fetch_results(
    state: &AppState,
    job: &Job,
    name: &str,
) -> Result<(Recommendations, String), ResultProcessingError> {
    let request = job.to_request()?;
    let raw_log = state
        .store
        .download_text(&BlobRef::new(name, PRIMARY_RESULT_BLOB_NAME))
        .await?;
    let recommendations = parse_recommendations(&raw_log, &request)?;
    Ok((recommendations, raw_log))
}

/// The job is already terminal here, so a failed settings write must not
/// fail the callback: a retry would find the job finished and skip it.
async fn record_commit(state: &AppState, job_id: DbId, commit: &str) {
    match SettingRepo::set_last_commit(&state.pool, commit).await {
        Ok(version) => tracing::debug!(commit, version, "Recorded tool commit"),
        Err(err) => {
            tracing::warn!(job_id, commit, error = %err, "Failed to record tool commit");
        }
    }
}

/// Secondary logs to attach. Any failure yields no attachments at all.
async fn collect_attachments(state: &AppState, name: &str) -> Vec<EmailAttachment> {
    match try_collect_attachments(state, name).await {
        Ok(attachments) => attachments,
        Err(err) => {
            tracing::warn!(job_name = name, error = %err, "Could not collect log attachments");
            Vec::new()
        }
    }
}

async fn try_collect_attachments(
    state: &AppState,
    name: &str,
) -> Result<Vec<EmailAttachment>, CloudError> {
    let blobs = state.store.list_secondary_artifacts(name).await?;
    let mut attachments = Vec::with_capacity(blobs.len());
    for blob in blobs {
        let content = state.store.download(&blob).await?;
        attachments.push(EmailAttachment {
            file_name: blob.name,
            content,
        });
    }
    Ok(attachments)
}
