//! Settings rows.

use autotune_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// Name of the row recording the tool version used by the latest job.
pub const SETTING_COMMIT: &str = "commit";

/// A row from the `settings` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Setting {
    pub name: String,
    pub value: Option<String>,
    /// Incremented on every write.
    pub version: i64,
    pub updated_at: Timestamp,
}
