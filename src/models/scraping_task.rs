use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::AppError;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ScrapingTask {
    pub id: i32,
    pub user_id: String,
    pub target_url: String,
    pub source_website: String,
    pub status: String,
    pub total_jobs_found: i32,
    pub jobs_scraped: i32,
    pub jobs_failed: i32,
    pub pages_scraped: i32,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Aggregate counts of one finished run.
#[derive(Debug)]
pub struct TaskRecord<'a> {
    pub user_id: &'a str,
    pub target_url: &'a str,
    pub source_website: &'a str,
    pub succeeded: bool,
    pub total_jobs_found: i32,
    pub jobs_scraped: i32,
    pub jobs_failed: i32,
    pub pages_scraped: i32,
    pub error: Option<&'a str>,
    pub started_at: DateTime<Utc>,
}

impl ScrapingTask {
    pub async fn record(pool: &PgPool, task: &TaskRecord<'_>) -> Result<ScrapingTask, AppError> {
        let status = if task.succeeded { "completed" } else { "failed" };
        let row = sqlx::query_as::<_, ScrapingTask>(
            "INSERT INTO scraping_tasks (user_id, target_url, source_website, status, total_jobs_found, jobs_scraped, jobs_failed, pages_scraped, error, started_at, completed_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW()) RETURNING *",
        )
        .bind(task.user_id)
        .bind(task.target_url)
        .bind(task.source_website)
        .bind(status)
        .bind(task.total_jobs_found)
        .bind(task.jobs_scraped)
        .bind(task.jobs_failed)
        .bind(task.pages_scraped)
        .bind(task.error)
        .bind(task.started_at)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    /// Most recent runs of one user.
    pub async fn recent(
        pool: &PgPool,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ScrapingTask>, AppError> {
        let tasks = sqlx::query_as::<_, ScrapingTask>(
            "SELECT * FROM scraping_tasks WHERE user_id = $1 ORDER BY started_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(tasks)
    }
}
