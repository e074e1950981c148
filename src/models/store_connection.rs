use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::AppError;

/// Where a user's scraped jobs are written.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StoreConnection {
    pub user_id: String,
    #[serde(skip_serializing)]
    pub database_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoreConnection {
    pub async fn for_user(pool: &PgPool, user_id: &str) -> Result<StoreConnection, AppError> {
        sqlx::query_as::<_, StoreConnection>("SELECT * FROM store_connections WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(
                    "No target store configured; set one with PUT /api/v1/store".to_string(),
                )
            })
    }

    pub async fn upsert(
        pool: &PgPool,
        user_id: &str,
        database_url: &str,
    ) -> Result<StoreConnection, AppError> {
        let conn = sqlx::query_as::<_, StoreConnection>(
            "INSERT INTO store_connections (user_id, database_url) VALUES ($1, $2)
             ON CONFLICT (user_id) DO UPDATE SET database_url = EXCLUDED.database_url, updated_at = NOW()
             RETURNING *",
        )
        .bind(user_id)
        .bind(database_url)
        .fetch_one(pool)
        .await?;
        Ok(conn)
    }
}
