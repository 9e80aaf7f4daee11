//! Handler for `/about`.

use autotune_db::repositories::SettingRepo;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AboutResponse {
    /// Tool commit reported by the most recently completed job.
    pub commit: Option<String>,
}

/// GET /api/v1/about
pub async fn about(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let commit = SettingRepo::get_last_commit(&state.pool).await?;
    Ok(Json(DataResponse {
        data: AboutResponse { commit },
    }))
}
