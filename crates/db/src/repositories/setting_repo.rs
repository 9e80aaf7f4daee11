//! Repository for the `settings` table.
//!
//! Settings are informational only: concurrent writers race and the last
//! one wins, but every write bumps `version` so readers can tell rows apart.

use sqlx::PgPool;

use crate::models::setting::{Setting, SETTING_COMMIT};

/// Provides access to named settings rows.
pub struct SettingRepo;

impl SettingRepo {
    /// Fetch a setting row by name.
    pub async fn find(pool: &PgPool, name: &str) -> Result<Option<Setting>, sqlx::Error> {
        sqlx::query_as::<_, Setting>(
            "SELECT name, value, version, updated_at FROM settings WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(pool)
        .await
    }

    /// Write a setting, creating the row if needed. Returns the new version.
    pub async fn set(pool: &PgPool, name: &str, value: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO settings (name, value, version, updated_at) \
             VALUES ($1, $2, 1, NOW()) \
             ON CONFLICT (name) DO UPDATE \
                 SET value = EXCLUDED.value, \
                     version = settings.version + 1, \
                     updated_at = NOW() \
             RETURNING version",
        )
        .bind(name)
        .bind(value)
        .fetch_one(pool)
        .await
    }

    /// The tool version reported by the most recently completed job.
    pub async fn get_last_commit(pool: &PgPool) -> Result<Option<String>, sqlx::Error> {
        Ok(Self::find(pool, SETTING_COMMIT).await?.and_then(|s| s.value))
    }

    pub async fn set_last_commit(pool: &PgPool, commit: &str) -> Result<i64, sqlx::Error> {
        Self::set(pool, SETTING_COMMIT, commit).await
    }
}
