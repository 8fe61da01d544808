use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub is_read: bool,
    pub created_at: OffsetDateTime,
}

impl Notification {
    pub async fn create<'e, E>(
        db: E,
        user_id: i64,
        title: &str,
        message: &str,
        kind: &str,
    ) -> anyhow::Result<Notification>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (user_id, title, message, type)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, title, message, type, is_read, created_at
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(kind)
        .fetch_one(db)
        .await?;
        Ok(notification)
    }

    /// The 20 most recent notifications for a user, newest first.
    pub async fn list_recent(db: &PgPool, user_id: i64) -> anyhow::Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, title, message, type, is_read, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 20
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn unread_count(db: &PgPool, user_id: i64) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE user_id = $1 AND is_read = FALSE
            "#,
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    /// Flips is_read for a notification owned by the caller. Returns false
    /// when the row does not exist or belongs to someone else.
    pub async fn mark_read(db: &PgPool, user_id: i64, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET is_read = TRUE
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
