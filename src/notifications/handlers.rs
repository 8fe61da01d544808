use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde_json::json;
use tracing::instrument;

use crate::{
    auth::extractors::CurrentUser, error::ApiError, notifications::repo::Notification,
    state::AppState,
};

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", put(mark_notification_read))
}

#[instrument(skip(state, user))]
pub async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let notifications = Notification::list_recent(&state.db, user.id)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(notifications))
}

#[instrument(skip(state, user))]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = Notification::mark_read(&state.db, user.id, id)
        .await
        .map_err(ApiError::Internal)?;
    if !updated {
        return Err(ApiError::NotFound("notification not found".into()));
    }
    Ok(Json(json!({ "status": "success" })))
}
