use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument};

use crate::{
    activity::{self, RequestContext},
    auth::extractors::CurrentUser,
    error::ApiError,
    notifications::repo::Notification,
    stages::{
        dto::{DashboardResponse, ProjectDraftPatch, ProjectSubmission, Stage1StatusResponse},
        repo::{Stage1Result, Stage2Project},
        services::{ensure_stage2_state, validate_submission},
        status::{stage1_status, stage2_status, Stage2Status},
    },
    state::AppState,
};

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/dashboard", get(get_dashboard))
}

pub fn stage1_routes() -> Router<AppState> {
    Router::new()
        .route("/stage1/start", post(start_stage1))
        .route("/stage1/complete", post(complete_stage1))
}

pub fn stage2_routes() -> Router<AppState> {
    Router::new()
        .route("/stage2/project", get(get_project).put(update_project))
        .route("/stage2/submit", post(submit_project))
}

#[instrument(skip(state, user))]
pub async fn get_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<DashboardResponse>, ApiError> {
    let stage1 = Stage1Result::find(&state.db, user.id)
        .await
        .map_err(ApiError::Internal)?;
    let stage2 = Stage2Project::find(&state.db, user.id)
        .await
        .map_err(ApiError::Internal)?;
    let notifications_count = Notification::unread_count(&state.db, user.id)
        .await
        .map_err(ApiError::Internal)?;

    let stage1_status = stage1_status(stage1.as_ref());
    let stage2_status = stage2_status(stage1.as_ref(), stage2.as_ref());

    Ok(Json(DashboardResponse {
        user,
        stage1_status,
        stage1_result: stage1,
        stage2_status,
        stage2_project: stage2,
        notifications_count,
    }))
}

#[instrument(skip(state, user, ctx))]
pub async fn start_stage1(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ctx: RequestContext,
) -> Result<Json<Stage1StatusResponse>, ApiError> {
    let (result, created) = Stage1Result::start(&state.db, user.id)
        .await
        .map_err(ApiError::Internal)?;

    if created {
        info!(user_id = user.id, "stage 1 assessment started");
        activity::record(&state.db, user.id, "stage1_start", json!({}), &ctx).await;
    }

    Ok(Json(Stage1StatusResponse {
        stage1_status: stage1_status(Some(&result)),
        stage1_result: result,
    }))
}

#[instrument(skip(state, user, ctx))]
pub async fn complete_stage1(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ctx: RequestContext,
) -> Result<Json<Stage1StatusResponse>, ApiError> {
    let mut tx = state.db.begin().await?;

    let existing = Stage1Result::find_for_update(&mut tx, user.id)
        .await
        .map_err(ApiError::Internal)?;
    match existing {
        None => {
            return Err(ApiError::InvalidState("stage 1 not started".into()));
        }
        Some(r) if r.completed_at.is_some() => {
            return Err(ApiError::InvalidState("stage 1 already completed".into()));
        }
        Some(_) => {}
    }

    let result = Stage1Result::complete(&mut tx, user.id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::InvalidState("stage 1 already completed".into()))?;
    tx.commit().await?;

    info!(user_id = user.id, "stage 1 assessment completed");
    activity::record(&state.db, user.id, "stage1_complete", json!({}), &ctx).await;

    Ok(Json(Stage1StatusResponse {
        stage1_status: stage1_status(Some(&result)),
        stage1_result: result,
    }))
}

#[instrument(skip(state, user))]
pub async fn get_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Stage2Project>, ApiError> {
    let stage1 = Stage1Result::find(&state.db, user.id)
        .await
        .map_err(ApiError::Internal)?;
    let project = Stage2Project::find(&state.db, user.id)
        .await
        .map_err(ApiError::Internal)?;

    if stage2_status(stage1.as_ref(), project.as_ref()) == Stage2Status::Locked {
        return Err(ApiError::InvalidState(
            "stage 2 is locked until stage 1 qualification".into(),
        ));
    }

    let project = match project {
        Some(p) => p,
        None => Stage2Project::ensure_draft(&state.db, user.id)
            .await
            .map_err(ApiError::Internal)?,
    };
    Ok(Json(project))
}

#[instrument(skip(state, user, patch))]
pub async fn update_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(patch): Json<ProjectDraftPatch>,
) -> Result<Json<Stage2Project>, ApiError> {
    let mut tx = state.db.begin().await?;

    let stage1 = Stage1Result::find_for_update(&mut tx, user.id)
        .await
        .map_err(ApiError::Internal)?;
    let project = Stage2Project::find_for_update(&mut tx, user.id)
        .await
        .map_err(ApiError::Internal)?;
    ensure_stage2_state(stage1.as_ref(), project.as_ref(), Stage2Status::Available)?;

    if project.is_none() {
        Stage2Project::create_draft(&mut *tx, user.id)
            .await
            .map_err(ApiError::Internal)?;
    }

    let tech_stack = patch
        .tech_stack
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| ApiError::Internal(e.into()))?;
    let project = Stage2Project::update_draft(
        &mut tx,
        user.id,
        patch.project_title.as_deref(),
        patch.project_description.as_deref(),
        patch.github_repo_url.as_deref(),
        patch.live_demo_url.as_deref(),
        tech_stack.as_ref(),
    )
    .await
    .map_err(ApiError::Internal)?
    .ok_or_else(|| ApiError::InvalidState("project already submitted".into()))?;
    tx.commit().await?;

    Ok(Json(project))
}

#[instrument(skip(state, user, ctx, payload))]
pub async fn submit_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ctx: RequestContext,
    Json(payload): Json<ProjectSubmission>,
) -> Result<Json<Stage2Project>, ApiError> {
    validate_submission(&payload)?;

    let mut tx = state.db.begin().await?;

    let stage1 = Stage1Result::find_for_update(&mut tx, user.id)
        .await
        .map_err(ApiError::Internal)?;
    let project = Stage2Project::find_for_update(&mut tx, user.id)
        .await
        .map_err(ApiError::Internal)?;
    ensure_stage2_state(stage1.as_ref(), project.as_ref(), Stage2Status::Available)?;

    let project = Stage2Project::submit(&mut tx, user.id, &payload)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::InvalidState("project already submitted".into()))?;

    Notification::create(
        &mut *tx,
        user.id,
        "Project submitted!",
        "Your Stage 2 project has been received. Results will follow after judging.",
        "stage2_submitted",
    )
    .await
    .map_err(ApiError::Internal)?;

    tx.commit().await?;

    info!(user_id = user.id, "stage 2 project submitted");
    activity::record(
        &state.db,
        user.id,
        "stage2_submit",
        json!({ "project_title": project.project_title }),
        &ctx,
    )
    .await;

    Ok(Json(project))
}
