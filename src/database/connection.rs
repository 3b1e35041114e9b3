use anyhow::{Result, bail};
use sqlx::postgres::PgPool;
use sqlx::PgPool as Pool;

use crate::accounting::ProfileStore;
use crate::models::profile::{status_is_approved, ProfileSummary};

pub struct Database {
    pool: Pool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Creates the profile table for local development databases. Hosted
    /// deployments already own this table.
    pub async fn create_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL DEFAULT 'pending',
                total_active_seconds BIGINT NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Older schemas predate activity accounting
        sqlx::query(
            r#"
            ALTER TABLE profiles ADD COLUMN IF NOT EXISTS total_active_seconds BIGINT NOT NULL DEFAULT 0
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            ALTER TABLE profiles ADD COLUMN IF NOT EXISTS status TEXT NOT NULL DEFAULT 'pending'
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_total_active_seconds(&self, subject_id: &str) -> Result<Option<i64>> {
        let row: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT total_active_seconds FROM profiles WHERE id::text = $1")
                .bind(subject_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(total,)| total))
    }

    pub async fn set_total_active_seconds(&self, subject_id: &str, total: i64) -> Result<()> {
        let result = sqlx::query("UPDATE profiles SET total_active_seconds = $2 WHERE id::text = $1")
            .bind(subject_id)
            .bind(total)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("profile {} not found", subject_id);
        }
        Ok(())
    }

    pub async fn get_profile_status(&self, subject_id: &str) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> = sqlx::query_as("SELECT status FROM profiles WHERE id::text = $1")
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(status,)| status))
    }

    pub async fn is_subject_approved(&self, subject_id: &str) -> Result<bool> {
        Ok(self
            .get_profile_status(subject_id)
            .await?
            .is_some_and(|status| status_is_approved(&status)))
    }

    pub async fn get_profile_summary(&self, subject_id: &str) -> Result<ProfileSummary> {
        let total_active_seconds = self.get_total_active_seconds(subject_id).await?.unwrap_or(0);
        let approved = self.is_subject_approved(subject_id).await?;
        Ok(ProfileSummary {
            subject_id: subject_id.to_string(),
            total_active_seconds,
            approved,
        })
    }
}

impl ProfileStore for Database {
    async fn fetch_total(&self, subject_id: &str) -> Result<Option<i64>> {
        self.get_total_active_seconds(subject_id).await
    }

    async fn write_total(&self, subject_id: &str, total: i64) -> Result<()> {
        self.set_total_active_seconds(subject_id, total).await
    }
}
