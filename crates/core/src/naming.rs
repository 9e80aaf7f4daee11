//! Naming conventions shared between submission and completion.
//!
//! The batch job, its storage container and the callback all locate each
//! other by these names, so they live in one place.

use crate::types::DbId;

/// Id of the task that runs the tuning computation.
pub const COMPUTE_TASK_ID: &str = "Autotune";

/// Id of the task that reports completion back to this service.
pub const UPLOAD_TASK_ID: &str = "Upload";

/// Blob holding the staged profile inside a job container.
pub const INPUT_BLOB_NAME: &str = "profile.json";

/// Blob holding the primary recommendations table.
pub const PRIMARY_RESULT_BLOB_NAME: &str = "autotune_recommendations.log";

/// Output pattern for the primary result, relative to the task working dir.
pub const PRIMARY_RESULT_PATTERN: &str = "autotune/autotune_recommendations.log";

/// Output pattern for secondary diagnostic logs.
pub const SECONDARY_LOG_PATTERN: &str = "autotune/autotune.*.log";

/// Compute-task exit code that still satisfies the upload dependency.
pub const SOFT_FAILURE_EXIT_CODE: i32 = 1;

/// Retries granted to the upload task on transient failure.
pub const UPLOAD_TASK_MAX_RETRIES: i32 = 2;

/// Derive the batch job (and storage container) name for a job record.
///
/// ```
/// use autotune_core::naming::job_name;
///
/// assert_eq!(job_name(1), "autotune-job-1");
/// ```
pub fn job_name(id: DbId) -> String {
    format!("autotune-job-{id}")
}

/// Whether a blob is one of the secondary artifacts attached to the email.
pub fn is_secondary_artifact(blob_name: &str) -> bool {
    blob_name != PRIMARY_RESULT_BLOB_NAME && blob_name != INPUT_BLOB_NAME
}
