use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::error::AppError;

/// The authenticated caller. Opaque to everything but log keying and row ownership.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
}

/// Hash a raw API token for storage/lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a new random API token.
pub fn generate_token() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

/// Store a fresh token for `user_id` and return the raw value. Only the hash is kept.
pub async fn issue_token(
    pool: &PgPool,
    user_id: &str,
    name: &str,
    approved: bool,
    expires_at: Option<DateTime<Utc>>,
) -> Result<String, AppError> {
    let raw_token = generate_token();
    sqlx::query(
        "INSERT INTO api_tokens (user_id, name, token_hash, approved, expires_at) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(user_id)
    .bind(name)
    .bind(hash_token(&raw_token))
    .bind(approved)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(raw_token)
}

fn bearer(request: &Request) -> Result<&str, AppError> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)
}

/// Middleware that resolves the bearer token to an approved user.
pub async fn require_api_token(
    State(pool): State<PgPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token_hash = hash_token(bearer(&request)?);

    let row: Option<(String, bool)> = sqlx::query_as(
        "SELECT user_id, approved FROM api_tokens WHERE token_hash = $1 AND (expires_at IS NULL OR expires_at > NOW())",
    )
    .bind(&token_hash)
    .fetch_optional(&pool)
    .await?;

    let (user_id, approved) = row.ok_or(AppError::Unauthorized)?;
    if !approved {
        return Err(AppError::Forbidden(
            "Account is awaiting approval".to_string(),
        ));
    }

    // Update last_used timestamp (fire and forget)
    let pool_clone = pool.clone();
    tokio::spawn(async move {
        let _ = sqlx::query("UPDATE api_tokens SET last_used = NOW() WHERE token_hash = $1")
            .bind(&token_hash)
            .execute(&pool_clone)
            .await;
    });

    request.extensions_mut().insert(CurrentUser { id: user_id });
    Ok(next.run(request).await)
}
