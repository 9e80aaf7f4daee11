//! Integration tests for the job record store and settings.
//!
//! Exercises the repository layer against a real database:
//! - Deduplication of unfinished requests
//! - Terminal completion write (including the at-most-once guard)
//! - Deletion by target and address
//! - Versioned settings row

use autotune_core::profile::OapsProfile;
use autotune_core::request::JobRequest;
use autotune_db::models::job::{CreateJob, JobCompletion};
use autotune_db::repositories::{JobRepo, SettingRepo};
use chrono::{TimeZone, Utc};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_job(target: &str, profile: &str, uam: bool) -> CreateJob {
    let request = JobRequest {
        target_url: target.to_string(),
        profile: OapsProfile::from_json(profile).unwrap(),
        units: "mg/dL".to_string(),
        timezone: "Europe/London".to_string(),
        uam_as_basal: uam,
        pump_basal_increment: 0.05,
        days: 30,
        email_results_to: "someone@example.com".to_string(),
    };
    CreateJob::from_request(&request).unwrap()
}

fn completion(failed: bool) -> JobCompletion {
    JobCompletion {
        processing_started: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()),
        processing_completed: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 20, 0).unwrap()),
        result: "ok".to_string(),
        failed,
    }
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn identical_unfinished_request_is_reused(pool: PgPool) {
    let input = new_job("https://x.example", r#"{"dia":3}"#, true);

    let (first, created) = JobRepo::find_or_create(&pool, &input).await.unwrap();
    assert!(created);

    let (second, created) = JobRepo::find_or_create(&pool, &input).await.unwrap();
    assert!(!created);
    assert_eq!(second.id, first.id);

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn different_uam_flag_is_a_different_job(pool: PgPool) {
    let (a, _) = JobRepo::find_or_create(&pool, &new_job("https://x.example", r#"{"dia":3}"#, true))
        .await
        .unwrap();
    let (b, created) =
        JobRepo::find_or_create(&pool, &new_job("https://x.example", r#"{"dia":3}"#, false))
            .await
            .unwrap();

    assert!(created);
    assert_ne!(a.id, b.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn finished_job_does_not_block_resubmission(pool: PgPool) {
    let input = new_job("https://x.example", r#"{"dia":3}"#, true);
    let (first, _) = JobRepo::find_or_create(&pool, &input).await.unwrap();
    JobRepo::update_completion(&pool, first.id, &completion(false))
        .await
        .unwrap();

    let (second, created) = JobRepo::find_or_create(&pool, &input).await.unwrap();
    assert!(created);
    assert_ne!(second.id, first.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_submissions_create_one_record(pool: PgPool) {
    let input = new_job("https://race.example", r#"{"dia":4}"#, false);

    let (a, b) = tokio::join!(
        JobRepo::find_or_create(&pool, &input),
        JobRepo::find_or_create(&pool, &input)
    );
    let (a, a_created) = a.unwrap();
    let (b, b_created) = b.unwrap();

    assert_eq!(a.id, b.id);
    assert!(a_created ^ b_created, "exactly one call must create the record");
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn completion_is_written_once(pool: PgPool) {
    let (job, _) =
        JobRepo::find_or_create(&pool, &new_job("https://x.example", r#"{"dia":3}"#, true))
            .await
            .unwrap();

    assert!(JobRepo::update_completion(&pool, job.id, &completion(false))
        .await
        .unwrap());

    let mut second = completion(true);
    second.result = "overwritten".to_string();
    assert!(!JobRepo::update_completion(&pool, job.id, &second)
        .await
        .unwrap());

    let stored = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert!(stored.is_finished());
    assert!(!stored.failed);
    assert_eq!(stored.result.as_deref(), Some("ok"));
    assert_eq!(
        stored.processing_completed,
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 20, 0).unwrap())
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn missing_end_time_still_finishes_job(pool: PgPool) {
    let (job, _) =
        JobRepo::find_or_create(&pool, &new_job("https://x.example", r#"{"dia":3}"#, true))
            .await
            .unwrap();

    let completion = JobCompletion {
        processing_started: None,
        processing_completed: None,
        result: "scheduler unavailable".to_string(),
        failed: true,
    };
    JobRepo::update_completion(&pool, job.id, &completion)
        .await
        .unwrap();

    let stored = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert!(stored.processing_completed.is_some());
    assert!(stored.failed);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stored_record_rebuilds_request(pool: PgPool) {
    let (job, _) = JobRepo::find_or_create(
        &pool,
        &new_job("https://x.example", r#"{"dia":3,"autosens_max":1.2}"#, true),
    )
    .await
    .unwrap();

    let request = job.to_request().unwrap();
    assert_eq!(request.days, 30);
    assert_eq!(request.profile.dia, Some(3.0));
    assert_eq!(request.profile.extra["autosens_max"], 1.2);
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_matches_target_and_email(pool: PgPool) {
    JobRepo::find_or_create(&pool, &new_job("https://x.example", r#"{"dia":3}"#, true))
        .await
        .unwrap();
    JobRepo::find_or_create(&pool, &new_job("https://x.example", r#"{"dia":4}"#, true))
        .await
        .unwrap();
    JobRepo::find_or_create(&pool, &new_job("https://y.example", r#"{"dia":3}"#, true))
        .await
        .unwrap();

    let deleted =
        JobRepo::delete_by_target_and_email(&pool, "https://x.example", "someone@example.com")
            .await
            .unwrap();
    assert_eq!(deleted, 2);

    let deleted =
        JobRepo::delete_by_target_and_email(&pool, "https://y.example", "other@example.com")
            .await
            .unwrap();
    assert_eq!(deleted, 0);
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn last_commit_overwrites_and_bumps_version(pool: PgPool) {
    assert_eq!(SettingRepo::get_last_commit(&pool).await.unwrap(), None);

    let v1 = SettingRepo::set_last_commit(&pool, "abc1234").await.unwrap();
    let v2 = SettingRepo::set_last_commit(&pool, "def5678").await.unwrap();

    assert_eq!(v2, v1 + 1);
    assert_eq!(
        SettingRepo::get_last_commit(&pool).await.unwrap().as_deref(),
        Some("def5678")
    );
}
