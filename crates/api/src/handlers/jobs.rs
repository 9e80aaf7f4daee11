//! Handlers for the `/jobs` resource.

use autotune_core::error::CoreError;
use autotune_core::profile::{OapsProfile, ProfileOverrides};
use autotune_core::request::{
    clamp_days, validate_pump_basal_increment, validate_target_url, validate_timezone, JobRequest,
};
use autotune_db::repositories::JobRepo;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::engine::submission::{submit_job as run_submission, SubmissionOutcome};
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobRequest {
    #[validate(length(min = 1, max = 2048))]
    pub target_url: String,
    /// Profile document as fetched from the data source.
    pub profile: serde_json::Value,
    #[validate(length(min = 1, max = 16))]
    pub units: String,
    #[validate(length(min = 1, max = 64))]
    pub timezone: String,
    #[serde(default)]
    pub uam_as_basal: bool,
    pub pump_basal_increment: f64,
    pub days: i32,
    #[validate(email)]
    pub email: String,
    /// Overrides the profile's `min_5m_carbimpact`.
    pub min_5m_carb_impact: Option<f64>,
    /// Overrides the profile's insulin curve.
    pub curve: Option<String>,
}

impl SubmitJobRequest {
    /// Validate every field and build the request that gets persisted.
    pub fn into_job_request(self) -> Result<JobRequest, CoreError> {
        let target_url = validate_target_url(&self.target_url)?;
        validate_timezone(&self.timezone)?;
        validate_pump_basal_increment(self.pump_basal_increment)?;
        let days = clamp_days(self.days)?;

        let profile: OapsProfile = serde_json::from_value(self.profile)
            .map_err(|e| CoreError::Validation(format!("Invalid profile: {e}")))?;
        let overrides = ProfileOverrides::parse(self.min_5m_carb_impact, self.curve.as_deref())?;
        if !overrides.is_empty() {
            tracing::debug!(?overrides, "Applying profile overrides");
        }

        Ok(JobRequest {
            target_url,
            profile: overrides.apply(profile),
            units: self.units,
            timezone: self.timezone,
            uam_as_basal: self.uam_as_basal,
            pump_basal_increment: self.pump_basal_increment,
            days,
            email_results_to: self.email,
        })
    }
}

/// Query of `DELETE /api/v1/jobs`.
#[derive(Debug, Deserialize, Validate)]
pub struct DeleteJobsQuery {
    pub url: String,
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteJobsResponse {
    pub deleted: u64,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Returns 201 when a new job was queued, or 200 when an identical request
/// is still in flight.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let request = input.into_job_request()?;

    let outcome = run_submission(&state, &request, Utc::now().date_naive()).await?;
    let status = match outcome {
        SubmissionOutcome::Queued { .. } => StatusCode::CREATED,
        SubmissionOutcome::AlreadyRunning { .. } => StatusCode::OK,
    };

    Ok((status, Json(DataResponse { data: outcome })))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /api/v1/jobs?url=&email=
///
/// Remove every record of jobs run against `url` for `email`.
pub async fn delete_jobs(
    State(state): State<AppState>,
    Query(query): Query<DeleteJobsQuery>,
) -> AppResult<impl IntoResponse> {
    query.validate()?;
    let target_url = validate_target_url(&query.url)?;

    let deleted = JobRepo::delete_by_target_and_email(&state.pool, &target_url, &query.email).await?;
    tracing::info!(target_url = %target_url, deleted, "Job records deleted");

    Ok(Json(DataResponse {
        data: DeleteJobsResponse { deleted },
    }))
}
