use axum::{
    extract::{FromRef, State},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    activity::{self, RequestContext},
    auth::{
        dto::{GoogleAuthRequest, ProfilePatch, TokenResponse},
        extractors::CurrentUser,
        jwt::JwtKeys,
        repo::User,
    },
    error::ApiError,
    notifications::repo::Notification,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/google", post(google_auth))
        .route("/auth/me", get(get_me))
        .route("/auth/profile", put(update_profile))
}

/// Sign in with a Google ID token. Verification of the external token happens
/// strictly before the database transaction begins; user creation and the
/// welcome notification commit or roll back together.
#[instrument(skip(state, ctx, payload))]
pub async fn google_auth(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<GoogleAuthRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let identity = state.identity.verify(&payload.token).await.map_err(|e| {
        warn!(error = %e, "external identity verification failed");
        ApiError::InvalidIdentity("invalid identity token".into())
    })?;

    let mut tx = state.db.begin().await?;
    let (user, created) = User::resolve_or_create(&mut tx, &identity)
        .await
        .map_err(ApiError::Internal)?;
    if created {
        Notification::create(
            &mut *tx,
            user.id,
            "Welcome to Coding Ka Big Boss!",
            "Complete your profile to get started with the hackathon.",
            "welcome",
        )
        .await
        .map_err(ApiError::Internal)?;
    }
    tx.commit().await?;

    activity::record(&state.db, user.id, "login", json!({"method": "google"}), &ctx).await;

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys
        .sign_session(user.id, &user.email)
        .map_err(ApiError::Internal)?;

    info!(user_id = user.id, email = %user.email, created, "user authenticated");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".into(),
        user,
    }))
}

#[instrument(skip(user))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

#[instrument(skip(state, user, ctx, patch))]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ctx: RequestContext,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<User>, ApiError> {
    let updated = User::apply_patch(&state.db, user.id, &patch)
        .await
        .map_err(ApiError::Internal)?;

    let details = serde_json::to_value(&patch).unwrap_or_else(|_| json!({}));
    activity::record(&state.db, user.id, "profile_update", details, &ctx).await;

    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_serializes_bearer_kind() {
        let response = TokenResponse {
            access_token: "abc.def.ghi".into(),
            token_type: "bearer".into(),
            user: User {
                id: 1,
                email: "test@example.com".into(),
                full_name: "Test User".into(),
                phone: None,
                college_name: None,
                branch: None,
                year_of_study: None,
                github_url: None,
                linkedin_url: None,
                profile_picture_url: None,
                created_at: time::OffsetDateTime::now_utc(),
            },
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"token_type\":\"bearer\""));
        assert!(json.contains("test@example.com"));
    }
}
