//! Validated tuning-job request and the rules applied before it is persisted.

use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;

use crate::error::CoreError;
use crate::profile::OapsProfile;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Longest window of history a job may analyse.
pub const MAX_DAYS: i32 = 30;

/// Shortest window of history a job may analyse.
pub const MIN_DAYS: i32 = 1;

/// Target URLs and timezones are interpolated into a shell command line,
/// so quotes, whitespace and shell metacharacters are rejected outright.
static TARGET_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[A-Za-z0-9.\-]+(:[0-9]{1,5})?(/[A-Za-z0-9._~%/\-]*)?$")
        .expect("target URL pattern is valid")
});

static TIMEZONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_+\-]+(/[A-Za-z0-9_+\-]+)*$").expect("timezone pattern is valid"));

// ---------------------------------------------------------------------------
// JobRequest
// ---------------------------------------------------------------------------

/// Everything needed to run one tuning job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    /// Base URL of the data source the tool reads from.
    pub target_url: String,
    pub profile: OapsProfile,
    /// Glucose units shown in the results (`mg/dL` or `mmol/L`).
    pub units: String,
    /// IANA timezone of the data source.
    pub timezone: String,
    pub uam_as_basal: bool,
    /// Smallest basal rate step the pump supports, U/h.
    pub pump_basal_increment: f64,
    /// Days of history to analyse, already clamped to [`MAX_DAYS`].
    pub days: i32,
    pub email_results_to: String,
}

/// Composite key identifying "the same job request".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub target_url: String,
    pub profile_json: String,
    pub uam_as_basal: bool,
}

impl JobRequest {
    pub fn dedup_key(&self) -> Result<DedupKey, CoreError> {
        Ok(DedupKey {
            target_url: self.target_url.clone(),
            profile_json: self.profile.to_json()?,
            uam_as_basal: self.uam_as_basal,
        })
    }

    /// Inclusive `(start, end)` dates analysed when the job runs on `today`.
    ///
    /// The window ends yesterday so only complete days are tuned against.
    pub fn date_window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let days = u64::try_from(self.days).unwrap_or(0);
        let start = today.checked_sub_days(Days::new(days)).unwrap_or(today);
        let end = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        (start, end)
    }
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// Reject windows shorter than a day, and clamp long ones to [`MAX_DAYS`].
pub fn clamp_days(days: i32) -> Result<i32, CoreError> {
    if days < MIN_DAYS {
        return Err(CoreError::Validation(format!(
            "days must be at least {MIN_DAYS}, got {days}"
        )));
    }
    Ok(days.min(MAX_DAYS))
}

/// Normalise and validate the target URL (trailing slashes are dropped).
pub fn validate_target_url(url: &str) -> Result<String, CoreError> {
    let trimmed = url.trim().trim_end_matches('/');
    if !TARGET_URL_RE.is_match(trimmed) {
        return Err(CoreError::Validation(format!(
            "Target URL '{url}' must be an absolute http(s) URL"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_timezone(timezone: &str) -> Result<(), CoreError> {
    if TIMEZONE_RE.is_match(timezone) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid timezone '{timezone}'"
        )))
    }
}

pub fn validate_pump_basal_increment(increment: f64) -> Result<(), CoreError> {
    if increment.is_finite() && increment > 0.0 {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "pump_basal_increment must be a positive number, got {increment}"
        )))
    }
}
