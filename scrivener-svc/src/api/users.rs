//! User endpoints

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub user_id: String,
    pub user_name: String,
}

/// POST /api/users
///
/// Idempotent: re-posting an existing id updates the display name.
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.user_id.trim().is_empty() {
        return Err(ApiError::Validation("user_id is required".to_string()));
    }
    if req.user_name.trim().is_empty() {
        return Err(ApiError::Validation("user_name is required".to_string()));
    }

    let user = users::upsert_user(&state.db, &req.user_id, &req.user_name).await?;
    Ok(Json(user))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user = users::get_user(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User not found: {}", id)))?;

    Ok(Json(user))
}

/// DELETE /api/users/{id}
///
/// Removes the user, their transcript rows and the stored audio blobs.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let deleted = users::delete_user(&state.db, &id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("User not found: {}", id)));
    }

    Ok(Json(json!({ "message": "User and associated data deleted" })))
}
