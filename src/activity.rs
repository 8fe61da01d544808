use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use sqlx::PgPool;
use std::convert::Infallible;
use tracing::warn;

/// Request metadata captured for the audit trail.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Infallible> {
        let ip = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string())
            });
        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        Ok(Self { ip, user_agent })
    }
}

/// Appends one activity-log row. Best-effort: a failure here must never fail
/// the primary operation, so errors are logged and swallowed.
pub async fn record(
    db: &PgPool,
    user_id: i64,
    activity_type: &str,
    details: serde_json::Value,
    ctx: &RequestContext,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO activity_logs (user_id, activity_type, details, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(activity_type)
    .bind(details)
    .bind(&ctx.ip)
    .bind(&ctx.user_agent)
    .execute(db)
    .await;

    if let Err(e) = result {
        warn!(error = %e, user_id, activity_type, "failed to record activity");
    }
}
