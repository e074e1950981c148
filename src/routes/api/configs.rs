use axum::extract::{Path, State};
use axum::{Extension, Json};

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::models::scrape_config::{CreateScrapeConfig, ScrapeConfig};
use crate::scraper::template::TemplateDraft;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<ScrapeConfig>>, AppError> {
    let configs = ScrapeConfig::list(&state.pool, &user.id).await?;
    Ok(Json(configs))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ScrapeConfig>, AppError> {
    let config = ScrapeConfig::get(&state.pool, &user.id, id).await?;
    Ok(Json(config))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(input): Json<CreateScrapeConfig>,
) -> Result<Json<ScrapeConfig>, AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    // Saved templates must be runnable as-is.
    let template = TemplateDraft::from(input.template).into_template()?;
    let config = ScrapeConfig::create(
        &state.pool,
        &user.id,
        CreateScrapeConfig { template, ..input },
    )
    .await?;
    Ok(Json(config))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<serde_json::Value>, AppError> {
    ScrapeConfig::delete(&state.pool, &user.id, id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
