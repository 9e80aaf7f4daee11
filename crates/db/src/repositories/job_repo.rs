//! Repository for the `jobs` table.
//!
//! Deduplication relies on the `uq_jobs_active_request` partial unique
//! index: two concurrent submissions of the same request race on the
//! insert, and exactly one of them wins.

use autotune_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::{CreateJob, Job, JobCompletion};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, target_url, profile, units, timezone, uam_as_basal, \
    pump_basal_increment, days_duration, email_results_to, created_at, \
    processing_started, processing_completed, result, failed";

/// How many times `find_or_create` retries when the conflicting job
/// finishes between its insert and its lookup.
const MAX_DEDUP_ATTEMPTS: usize = 3;

/// Provides persistence for tuning job records.
pub struct JobRepo;

impl JobRepo {
    /// Return the unfinished job matching `input`'s dedup key, or insert a
    /// new one.
    ///
    /// The boolean is `true` when the returned job was created by this call.
    pub async fn find_or_create(
        pool: &PgPool,
        input: &CreateJob,
    ) -> Result<(Job, bool), sqlx::Error> {
        for _ in 0..MAX_DEDUP_ATTEMPTS {
            let existing =
                Self::find_active(pool, &input.target_url, &input.profile, input.uam_as_basal)
                    .await?;
            if let Some(existing) = existing {
                return Ok((existing, false));
            }

            if let Some(created) = Self::insert_if_absent(pool, input).await? {
                tracing::debug!(job_id = created.id, "Job record created");
                return Ok((created, true));
            }
        }

        Err(sqlx::Error::Protocol(format!(
            "Could not resolve active job for {} after {MAX_DEDUP_ATTEMPTS} attempts",
            input.target_url
        )))
    }

    async fn find_active(
        pool: &PgPool,
        target_url: &str,
        profile: &serde_json::Value,
        uam_as_basal: bool,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE target_url = $1 \
               AND md5(profile::text) = md5($2::jsonb::text) \
               AND uam_as_basal = $3 \
               AND processing_completed IS NULL \
             ORDER BY id \
             LIMIT 1"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(target_url)
            .bind(profile)
            .bind(uam_as_basal)
            .fetch_optional(pool)
            .await
    }

    /// Compare-and-insert: returns `None` when an unfinished job with the
    /// same key already exists.
    async fn insert_if_absent(
        pool: &PgPool,
        input: &CreateJob,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs \
                 (target_url, profile, units, timezone, uam_as_basal, \
                  pump_basal_increment, days_duration, email_results_to) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (target_url, (md5(profile::text)), uam_as_basal) \
                 WHERE processing_completed IS NULL \
                 DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.target_url)
            .bind(&input.profile)
            .bind(&input.units)
            .bind(&input.timezone)
            .bind(input.uam_as_basal)
            .bind(input.pump_basal_increment)
            .bind(input.days_duration)
            .bind(&input.email_results_to)
            .fetch_optional(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Apply the terminal write for a job.
    ///
    /// Only an unfinished job is updated. Returns `false` when the job is
    /// missing or already finished, in which case nothing was written.
    pub async fn update_completion(
        pool: &PgPool,
        id: DbId,
        completion: &JobCompletion,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET processing_started = $2, \
                 processing_completed = COALESCE($3, NOW()), \
                 result = $4, \
                 failed = $5 \
             WHERE id = $1 AND processing_completed IS NULL",
        )
        .bind(id)
        .bind(completion.processing_started)
        .bind(completion.processing_completed)
        .bind(&completion.result)
        .bind(completion.failed)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every job recorded for a target URL and notification address.
    ///
    /// Returns the number of deleted rows.
    pub async fn delete_by_target_and_email(
        pool: &PgPool,
        target_url: &str,
        email: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE target_url = $1 AND email_results_to = $2")
            .bind(target_url)
            .bind(email)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
