//! Job record model and DTOs.

use autotune_core::error::CoreError;
use autotune_core::profile::OapsProfile;
use autotune_core::request::JobRequest;
use autotune_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `jobs` table.
///
/// Created once at submission, written once more when the completion
/// callback arrives, and only ever removed by an explicit delete.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub target_url: String,
    pub profile: serde_json::Value,
    pub units: String,
    pub timezone: String,
    pub uam_as_basal: bool,
    pub pump_basal_increment: f64,
    pub days_duration: i32,
    pub email_results_to: String,
    pub created_at: Timestamp,
    pub processing_started: Option<Timestamp>,
    pub processing_completed: Option<Timestamp>,
    pub result: Option<String>,
    pub failed: bool,
}

impl Job {
    /// A job is finished once its processing end has been recorded.
    pub fn is_finished(&self) -> bool {
        self.processing_completed.is_some()
    }

    /// Rebuild the request this record was created from.
    pub fn to_request(&self) -> Result<JobRequest, CoreError> {
        let profile: OapsProfile = serde_json::from_value(self.profile.clone()).map_err(|e| {
            CoreError::Internal(format!("Stored profile for job {} is unreadable: {e}", self.id))
        })?;

        Ok(JobRequest {
            target_url: self.target_url.clone(),
            profile,
            units: self.units.clone(),
            timezone: self.timezone.clone(),
            uam_as_basal: self.uam_as_basal,
            pump_basal_increment: self.pump_basal_increment,
            days: self.days_duration,
            email_results_to: self.email_results_to.clone(),
        })
    }
}

/// Insert DTO derived from a validated [`JobRequest`].
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub target_url: String,
    pub profile: serde_json::Value,
    pub units: String,
    pub timezone: String,
    pub uam_as_basal: bool,
    pub pump_basal_increment: f64,
    pub days_duration: i32,
    pub email_results_to: String,
}

impl CreateJob {
    pub fn from_request(request: &JobRequest) -> Result<Self, CoreError> {
        let profile = serde_json::to_value(&request.profile)
            .map_err(|e| CoreError::Internal(format!("Failed to serialize profile: {e}")))?;

        Ok(Self {
            target_url: request.target_url.clone(),
            profile,
            units: request.units.clone(),
            timezone: request.timezone.clone(),
            uam_as_basal: request.uam_as_basal,
            pump_basal_increment: request.pump_basal_increment,
            days_duration: request.days,
            email_results_to: request.email_results_to.clone(),
        })
    }
}

/// The single terminal write applied when a job completes.
#[derive(Debug, Clone)]
pub struct JobCompletion {
    pub processing_started: Option<Timestamp>,
    /// `None` when the scheduler could not report an end time; the
    /// repository substitutes the time of the write.
    pub processing_completed: Option<Timestamp>,
    pub result: String,
    pub failed: bool,
}
