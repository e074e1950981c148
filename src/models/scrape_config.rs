use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::error::AppError;
use crate::scraper::template::RequestTemplate;

/// A request template saved by a user for reuse.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ScrapeConfig {
    pub id: i32,
    pub user_id: String,
    pub name: String,
    pub website_type: String,
    pub target_url: String,
    pub template: Json<RequestTemplate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScrapeConfig {
    pub name: String,
    pub website_type: String,
    pub target_url: String,
    pub template: RequestTemplate,
}

impl ScrapeConfig {
    pub async fn list(pool: &PgPool, user_id: &str) -> Result<Vec<ScrapeConfig>, AppError> {
        let configs = sqlx::query_as::<_, ScrapeConfig>(
            "SELECT * FROM scrape_configs WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(configs)
    }

    pub async fn get(pool: &PgPool, user_id: &str, id: i32) -> Result<ScrapeConfig, AppError> {
        sqlx::query_as::<_, ScrapeConfig>(
            "SELECT * FROM scrape_configs WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Config {id} not found")))
    }

    pub async fn create(
        pool: &PgPool,
        user_id: &str,
        input: CreateScrapeConfig,
    ) -> Result<ScrapeConfig, AppError> {
        let config = sqlx::query_as::<_, ScrapeConfig>(
            "INSERT INTO scrape_configs (user_id, name, website_type, target_url, template) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.website_type)
        .bind(&input.target_url)
        .bind(Json(&input.template))
        .fetch_one(pool)
        .await?;
        Ok(config)
    }

    pub async fn delete(pool: &PgPool, user_id: &str, id: i32) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM scrape_configs WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Config {id} not found")));
        }
        Ok(())
    }
}
