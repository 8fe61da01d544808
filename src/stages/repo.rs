use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;

use crate::stages::dto::ProjectSubmission;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Stage1Result {
    pub user_id: i64,
    pub mcq_score: f64,
    pub programming_score: f64,
    pub total_score: f64,
    pub rank: Option<i32>,
    pub is_qualified: bool,
    pub started_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Stage2Project {
    pub user_id: i64,
    pub project_title: Option<String>,
    pub project_description: Option<String>,
    pub github_repo_url: Option<String>,
    pub live_demo_url: Option<String>,
    pub tech_stack: Option<serde_json::Value>,
    pub submission_status: String,
    pub submitted_at: Option<OffsetDateTime>,
    pub total_score: Option<f64>,
    pub is_qualified: bool,
    pub created_at: OffsetDateTime,
}

const STAGE1_COLUMNS: &str = "user_id, mcq_score, programming_score, total_score, rank, \
                              is_qualified, started_at, completed_at";

const STAGE2_COLUMNS: &str = "user_id, project_title, project_description, github_repo_url, \
                              live_demo_url, tech_stack, submission_status, submitted_at, \
                              total_score, is_qualified, created_at";

impl Stage1Result {
    pub async fn find(db: &PgPool, user_id: i64) -> anyhow::Result<Option<Stage1Result>> {
        let row = sqlx::query_as::<_, Stage1Result>(&format!(
            "SELECT {STAGE1_COLUMNS} FROM stage1_results WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    /// Creates the assessment record if absent; an existing row is returned
    /// unchanged, so starting twice never resets progress.
    pub async fn start(db: &PgPool, user_id: i64) -> anyhow::Result<(Stage1Result, bool)> {
        let inserted = sqlx::query_as::<_, Stage1Result>(&format!(
            "INSERT INTO stage1_results (user_id)
             VALUES ($1)
             ON CONFLICT (user_id) DO NOTHING
             RETURNING {STAGE1_COLUMNS}"
        ))
        .bind(user_id)
        .fetch_optional(db)
        .await?;

        match inserted {
            Some(row) => Ok((row, true)),
            None => {
                let row = sqlx::query_as::<_, Stage1Result>(&format!(
                    "SELECT {STAGE1_COLUMNS} FROM stage1_results WHERE user_id = $1"
                ))
                .bind(user_id)
                .fetch_one(db)
                .await?;
                Ok((row, false))
            }
        }
    }

    pub async fn find_for_update(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> anyhow::Result<Option<Stage1Result>> {
        let row = sqlx::query_as::<_, Stage1Result>(&format!(
            "SELECT {STAGE1_COLUMNS} FROM stage1_results WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    /// Marks the assessment completed. Caller must have verified the row is
    /// in progress; the WHERE clause still refuses a second completion.
    pub async fn complete(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> anyhow::Result<Option<Stage1Result>> {
        let row = sqlx::query_as::<_, Stage1Result>(&format!(
            "UPDATE stage1_results SET completed_at = NOW()
             WHERE user_id = $1 AND completed_at IS NULL
             RETURNING {STAGE1_COLUMNS}"
        ))
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    /// Records the external scorer's verdict. Scores, rank and qualification
    /// are opaque inputs here; only a completed assessment can be finalized.
    pub async fn finalize_scoring(
        db: &PgPool,
        user_id: i64,
        mcq_score: f64,
        programming_score: f64,
        rank: Option<i32>,
        is_qualified: bool,
    ) -> anyhow::Result<Option<Stage1Result>> {
        let row = sqlx::query_as::<_, Stage1Result>(&format!(
            "UPDATE stage1_results
             SET mcq_score = $2,
                 programming_score = $3,
                 total_score = $2 + $3,
                 rank = $4,
                 is_qualified = $5
             WHERE user_id = $1 AND completed_at IS NOT NULL
             RETURNING {STAGE1_COLUMNS}"
        ))
        .bind(user_id)
        .bind(mcq_score)
        .bind(programming_score)
        .bind(rank)
        .bind(is_qualified)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }
}

impl Stage2Project {
    pub async fn find(db: &PgPool, user_id: i64) -> anyhow::Result<Option<Stage2Project>> {
        let row = sqlx::query_as::<_, Stage2Project>(&format!(
            "SELECT {STAGE2_COLUMNS} FROM stage2_projects WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn find_for_update(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> anyhow::Result<Option<Stage2Project>> {
        let row = sqlx::query_as::<_, Stage2Project>(&format!(
            "SELECT {STAGE2_COLUMNS} FROM stage2_projects WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    /// Inserts the draft row if missing. Safe under concurrent first access:
    /// the unique user_id arbitrates, a losing insert is a no-op.
    pub async fn create_draft<'e, E>(db: E, user_id: i64) -> anyhow::Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            "INSERT INTO stage2_projects (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Lazily creates the draft row on first Stage 2 access.
    pub async fn ensure_draft(db: &PgPool, user_id: i64) -> anyhow::Result<Stage2Project> {
        let inserted = sqlx::query_as::<_, Stage2Project>(&format!(
            "INSERT INTO stage2_projects (user_id)
             VALUES ($1)
             ON CONFLICT (user_id) DO NOTHING
             RETURNING {STAGE2_COLUMNS}"
        ))
        .bind(user_id)
        .fetch_optional(db)
        .await?;

        match inserted {
            Some(row) => Ok(row),
            None => {
                let row = sqlx::query_as::<_, Stage2Project>(&format!(
                    "SELECT {STAGE2_COLUMNS} FROM stage2_projects WHERE user_id = $1"
                ))
                .bind(user_id)
                .fetch_one(db)
                .await?;
                Ok(row)
            }
        }
    }

    /// Patches draft fields; absent fields keep their prior values. Never
    /// touches a submitted project (callers guard, the WHERE clause insists).
    pub async fn update_draft(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        title: Option<&str>,
        description: Option<&str>,
        repo_url: Option<&str>,
        demo_url: Option<&str>,
        tech_stack: Option<&serde_json::Value>,
    ) -> anyhow::Result<Option<Stage2Project>> {
        let row = sqlx::query_as::<_, Stage2Project>(&format!(
            "UPDATE stage2_projects
             SET project_title = COALESCE($2, project_title),
                 project_description = COALESCE($3, project_description),
                 github_repo_url = COALESCE($4, github_repo_url),
                 live_demo_url = COALESCE($5, live_demo_url),
                 tech_stack = COALESCE($6, tech_stack)
             WHERE user_id = $1 AND submitted_at IS NULL
             RETURNING {STAGE2_COLUMNS}"
        ))
        .bind(user_id)
        .bind(title)
        .bind(description)
        .bind(repo_url)
        .bind(demo_url)
        .bind(tech_stack)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    /// The one-way draft → submitted transition. Upserts so a user who never
    /// opened the draft can still submit in one step; the conflict arm
    /// refuses to overwrite an existing submission.
    pub async fn submit(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        submission: &ProjectSubmission,
    ) -> anyhow::Result<Option<Stage2Project>> {
        let tech_stack = serde_json::to_value(&submission.tech_stack)?;
        let row = sqlx::query_as::<_, Stage2Project>(&format!(
            "INSERT INTO stage2_projects
                 (user_id, project_title, project_description, github_repo_url,
                  live_demo_url, tech_stack, submission_status, submitted_at)
             VALUES ($1, $2, $3, $4, $5, $6, 'submitted', NOW())
             ON CONFLICT (user_id) DO UPDATE
             SET project_title = EXCLUDED.project_title,
                 project_description = EXCLUDED.project_description,
                 github_repo_url = EXCLUDED.github_repo_url,
                 live_demo_url = EXCLUDED.live_demo_url,
                 tech_stack = EXCLUDED.tech_stack,
                 submission_status = 'submitted',
                 submitted_at = NOW()
             WHERE stage2_projects.submitted_at IS NULL
             RETURNING {STAGE2_COLUMNS}"
        ))
        .bind(user_id)
        .bind(&submission.project_title)
        .bind(&submission.project_description)
        .bind(&submission.github_repo_url)
        .bind(&submission.live_demo_url)
        .bind(tech_stack)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_user(pool: &PgPool, email: &str) -> i64 {
        sqlx::query_scalar("INSERT INTO users (email, full_name) VALUES ($1, 'Test User') RETURNING id")
            .bind(email)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn complete_stage1(pool: &PgPool, user_id: i64) {
        Stage1Result::start(pool, user_id).await.unwrap();
        let mut tx = pool.begin().await.unwrap();
        Stage1Result::complete(&mut tx, user_id).await.unwrap().unwrap();
        tx.commit().await.unwrap();
    }

    fn submission(title: &str) -> ProjectSubmission {
        ProjectSubmission {
            project_title: title.into(),
            project_description: "A judge assistant".into(),
            github_repo_url: "https://github.com/x/y".into(),
            live_demo_url: None,
            tech_stack: vec!["rust".into(), "axum".into()],
        }
    }

    #[sqlx::test]
    async fn finalize_refuses_assessment_still_in_progress(pool: PgPool) {
        let user_id = seed_user(&pool, "s1@x.com").await;
        let (result, created) = Stage1Result::start(&pool, user_id).await.unwrap();
        assert!(created);
        assert!(result.completed_at.is_none());

        let verdict = Stage1Result::finalize_scoring(&pool, user_id, 40.0, 35.0, Some(1), true)
            .await
            .unwrap();
        assert!(verdict.is_none());

        let row = Stage1Result::find(&pool, user_id).await.unwrap().unwrap();
        assert!(!row.is_qualified);
        assert_eq!(row.total_score, 0.0);
        assert_eq!(row.rank, None);
    }

    #[sqlx::test]
    async fn finalize_records_verdict_once_completed(pool: PgPool) {
        let user_id = seed_user(&pool, "s1done@x.com").await;
        complete_stage1(&pool, user_id).await;

        let row = Stage1Result::finalize_scoring(&pool, user_id, 40.0, 35.0, Some(2), true)
            .await
            .unwrap()
            .expect("completed assessment accepts the verdict");
        assert_eq!(row.total_score, 75.0);
        assert_eq!(row.rank, Some(2));
        assert!(row.is_qualified);
        assert!(row.completed_at.is_some());
    }

    #[sqlx::test]
    async fn starting_twice_never_resets_progress(pool: PgPool) {
        let user_id = seed_user(&pool, "restart@x.com").await;
        complete_stage1(&pool, user_id).await;

        let (again, created) = Stage1Result::start(&pool, user_id).await.unwrap();
        assert!(!created);
        assert!(again.completed_at.is_some());
    }

    #[sqlx::test]
    async fn second_submit_leaves_original_untouched(pool: PgPool) {
        let user_id = seed_user(&pool, "s2@x.com").await;
        complete_stage1(&pool, user_id).await;
        Stage1Result::finalize_scoring(&pool, user_id, 40.0, 40.0, Some(1), true)
            .await
            .unwrap()
            .unwrap();

        let mut tx = pool.begin().await.unwrap();
        let first = Stage2Project::submit(&mut tx, user_id, &submission("first"))
            .await
            .unwrap()
            .expect("first submission goes through");
        tx.commit().await.unwrap();
        assert!(first.submitted_at.is_some());

        let mut tx = pool.begin().await.unwrap();
        let second = Stage2Project::submit(&mut tx, user_id, &submission("second"))
            .await
            .unwrap();
        assert!(second.is_none());
        tx.commit().await.unwrap();

        let row = Stage2Project::find(&pool, user_id).await.unwrap().unwrap();
        assert_eq!(row.project_title.as_deref(), Some("first"));
        assert_eq!(row.submission_status, "submitted");
        assert_eq!(row.submitted_at, first.submitted_at);
    }

    #[sqlx::test]
    async fn draft_creation_tolerates_duplicates(pool: PgPool) {
        let user_id = seed_user(&pool, "draft@x.com").await;
        Stage2Project::create_draft(&pool, user_id).await.unwrap();
        Stage2Project::create_draft(&pool, user_id).await.unwrap();

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stage2_projects WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }
}
