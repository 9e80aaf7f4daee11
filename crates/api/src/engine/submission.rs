//! Submission flow: dedup, stage, dispatch.

use autotune_cloud::{ComputeCommand, JobSubmission};
use autotune_core::hashing::sha256_hex;
use autotune_core::naming::{job_name, COMPUTE_TASK_ID};
use autotune_core::request::JobRequest;
use autotune_core::types::{DbId, Timestamp};
use autotune_db::models::job::{CreateJob, JobCompletion};
use autotune_db::repositories::JobRepo;
use chrono::NaiveDate;
use reqwest::Url;
use serde::Serialize;

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Path of the completion webhook, relative to the public base URL.
pub const JOB_FINISHED_PATH: &str = "/api/v1/results/job-finished";

/// What a submission did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    /// A new job was recorded and handed to the scheduler.
    Queued {
        job_id: DbId,
        job_name: String,
        queue_position: usize,
    },
    /// An identical request is still in flight. Carries its start time once
    /// it is running, otherwise the current queue length.
    AlreadyRunning {
        job_id: DbId,
        #[serde(skip_serializing_if = "Option::is_none")]
        started_at: Option<Timestamp>,
        #[serde(skip_serializing_if = "Option::is_none")]
        queue_position: Option<usize>,
    },
}

/// Record `request` and dispatch it, unless an identical request is
/// already unfinished. `today` anchors the analysed date window.
pub async fn submit_job(
    state: &AppState,
    request: &JobRequest,
    today: NaiveDate,
) -> AppResult<SubmissionOutcome> {
    let key = request.dedup_key()?;
    let input = CreateJob::from_request(request)?;
    let (job, created) = JobRepo::find_or_create(&state.pool, &input).await?;
    let name = job_name(job.id);

    if !created {
        tracing::info!(
            job_id = job.id,
            target_url = %key.target_url,
            uam_as_basal = key.uam_as_basal,
            "Identical request already in flight",
        );
        return already_running(state, job.id, &name).await;
    }

    match dispatch(state, request, &key.profile_json, job.id, &name, today).await {
        Ok(queue_position) => {
            tracing::info!(
                job_id = job.id,
                job_name = %name,
                queue_position,
                profile_sha256 = %sha256_hex(key.profile_json.as_bytes()),
                "Job queued",
            );
            Ok(SubmissionOutcome::Queued {
                job_id: job.id,
                job_name: name,
                queue_position,
            })
        }
        Err(err) => {
            // A record that never reached the scheduler would block every
            // identical request, so close it out as failed.
            let completion = JobCompletion {
                processing_started: None,
                processing_completed: None,
                result: format!("Submission failed: {err}"),
                failed: true,
            };
            if let Err(db_err) = JobRepo::update_completion(&state.pool, job.id, &completion).await {
                tracing::error!(job_id = job.id, error = %db_err, "Failed to close out undispatched job");
            }
            Err(err)
        }
    }
}

/// Stage the profile and submit the task graph. Returns the queue position.
async fn dispatch(
    state: &AppState,
    request: &JobRequest,
    profile_json: &str,
    job_id: DbId,
    name: &str,
    today: NaiveDate,
) -> AppResult<usize> {
    state.store.create_container(name).await?;
    let input_url = state.store.stage_input(name, profile_json).await?;
    let output_container_url = state.store.container_write_url(name)?;

    let (start_date, end_date) = request.date_window(today);
    let submission = JobSubmission {
        job_name: name.to_string(),
        compute: ComputeCommand {
            target_url: request.target_url.clone(),
            start_date,
            end_date,
            uam_as_basal: request.uam_as_basal,
        },
        timezone: request.timezone.clone(),
        input_url,
        output_container_url,
        callback_url: callback_url(&state.config, job_id)?,
    };

    Ok(state.scheduler.submit(&submission).await?)
}

async fn already_running(
    state: &AppState,
    job_id: DbId,
    name: &str,
) -> AppResult<SubmissionOutcome> {
    let started_at = match state.scheduler.task_status(name, COMPUTE_TASK_ID).await {
        Ok(status) => status.start_time,
        Err(err) => {
            // The first submission may not have reached the scheduler yet.
            tracing::warn!(job_id, error = %err, "Could not read compute task status");
            None
        }
    };

    let queue_position = match started_at {
        Some(_) => None,
        None => Some(state.scheduler.active_job_count().await?),
    };

    Ok(SubmissionOutcome::AlreadyRunning {
        job_id,
        started_at,
        queue_position,
    })
}

/// Webhook URL the upload task calls, carrying the job id and shared key.
pub fn callback_url(config: &ServerConfig, job_id: DbId) -> AppResult<String> {
    let mut url = Url::parse(&format!("{}{JOB_FINISHED_PATH}", config.public_base_url))
        .map_err(|e| AppError::InternalError(format!("Invalid PUBLIC_BASE_URL: {e}")))?;
    url.query_pairs_mut()
        .append_pair("id", &job_id.to_string())
        .append_pair("key", &config.results_callback_key);
    Ok(url.into())
}
