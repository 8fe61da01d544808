use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;

use crate::auth::dto::ProfilePatch;
use crate::auth::identity::ExternalIdentity;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub college_name: Option<String>,
    pub branch: Option<String>,
    pub year_of_study: Option<i32>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub profile_picture_url: Option<String>,
    pub created_at: OffsetDateTime,
}

const USER_COLUMNS: &str = "id, email, full_name, phone, college_name, branch, year_of_study, \
                            github_url, linkedin_url, profile_picture_url, created_at";

impl User {
    pub async fn find_by_id(db: &PgPool, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Maps a verified external identity to a user row, creating one on first
    /// sight. Returns the user and whether it was created by this call.
    ///
    /// Idempotent under concurrent duplicate calls: the UNIQUE constraint on
    /// email arbitrates the race, and the loser of an INSERT conflict
    /// refetches the winner's row.
    pub async fn resolve_or_create(
        tx: &mut Transaction<'_, Postgres>,
        identity: &ExternalIdentity,
    ) -> anyhow::Result<(User, bool)> {
        let existing = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(&identity.email)
        .fetch_optional(&mut **tx)
        .await?;
        if let Some(user) = existing {
            return Ok((user, false));
        }

        let inserted = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, full_name, profile_picture_url)
             VALUES ($1, $2, $3)
             ON CONFLICT (email) DO NOTHING
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&identity.email)
        .bind(&identity.name)
        .bind(&identity.picture)
        .fetch_optional(&mut **tx)
        .await?;

        match inserted {
            Some(user) => Ok((user, true)),
            None => {
                // Lost the insert race: the conflicting row is committed by now.
                let user = sqlx::query_as::<_, User>(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
                ))
                .bind(&identity.email)
                .fetch_one(&mut **tx)
                .await?;
                Ok((user, false))
            }
        }
    }

    /// Applies a partial profile update: only fields present in the patch
    /// change, absent fields keep their prior values.
    pub async fn apply_patch(db: &PgPool, id: i64, patch: &ProfilePatch) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET
                phone = COALESCE($2, phone),
                college_name = COALESCE($3, college_name),
                branch = COALESCE($4, branch),
                year_of_study = COALESCE($5, year_of_study),
                github_url = COALESCE($6, github_url),
                linkedin_url = COALESCE($7, linkedin_url)
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&patch.phone)
        .bind(&patch.college_name)
        .bind(&patch.branch)
        .bind(patch.year_of_study)
        .bind(&patch.github_url)
        .bind(&patch.linkedin_url)
        .fetch_one(db)
        .await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: &str) -> ExternalIdentity {
        ExternalIdentity {
            email: email.into(),
            name: "First Login".into(),
            picture: None,
        }
    }

    #[sqlx::test]
    async fn resolve_creates_then_reuses_user(pool: PgPool) {
        let mut tx = pool.begin().await.unwrap();
        let (user, created) = User::resolve_or_create(&mut tx, &identity("new@x.com"))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert!(created);
        assert_eq!(user.email, "new@x.com");
        assert_eq!(user.full_name, "First Login");

        let mut tx = pool.begin().await.unwrap();
        let (again, created) = User::resolve_or_create(&mut tx, &identity("new@x.com"))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert!(!created);
        assert_eq!(again.id, user.id);
    }

    #[sqlx::test]
    async fn lost_insert_race_refetches_the_single_row(pool: PgPool) {
        // The first login holds its transaction open, so the second login's
        // insert waits on the unique email index, loses the conflict once the
        // first commits, and must refetch the winner's row.
        let mut tx1 = pool.begin().await.unwrap();
        let (winner, created) = User::resolve_or_create(&mut tx1, &identity("race@x.com"))
            .await
            .unwrap();
        assert!(created);

        let pool2 = pool.clone();
        let loser = tokio::spawn(async move {
            let mut tx2 = pool2.begin().await.unwrap();
            let out = User::resolve_or_create(&mut tx2, &identity("race@x.com"))
                .await
                .unwrap();
            tx2.commit().await.unwrap();
            out
        });

        // Give the second login time to block on the insert.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tx1.commit().await.unwrap();

        let (user, created) = loser.await.unwrap();
        assert!(!created);
        assert_eq!(user.id, winner.id);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = $1")
            .bind("race@x.com")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
