use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::models::job::Job;
use crate::models::scraping_task::{ScrapingTask, TaskRecord};
use crate::scraper::runner::{self, ScrapeOutcome, ScrapeRequest};
use crate::scraper::template::TemplateDraft;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartScrape {
    #[serde(default)]
    pub target_url: String,
    #[serde(default)]
    pub website_type: String,
    pub max_pages: Option<u32>,
    #[serde(alias = "apiConfig")]
    pub request_template: Option<TemplateDraft>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeSummary {
    pub total_jobs: usize,
    pub saved_jobs: usize,
    pub failed_jobs: usize,
    pub pages_scraped: u32,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Serialize)]
pub struct ScrapeResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: ScrapeSummary,
}

fn count(n: impl TryInto<i32>) -> i32 {
    n.try_into().unwrap_or(i32::MAX)
}

/// POST /api/v1/scrape
///
/// Runs the scrape inline and answers once every page has been fetched and
/// every record written. Progress is visible meanwhile on /scrape-log.
pub async fn start(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(input): Json<StartScrape>,
) -> Result<Json<ScrapeResponse>, AppError> {
    if input.target_url.trim().is_empty() || input.website_type.trim().is_empty() {
        return Err(AppError::BadRequest(
            "targetUrl and websiteType are required".to_string(),
        ));
    }
    let Some(template) = input.request_template else {
        return Err(AppError::BadRequest(
            "requestTemplate is required".to_string(),
        ));
    };

    let store = state.store_for(&user.id).await?;

    let request = ScrapeRequest {
        target_url: input.target_url,
        website_type: input.website_type,
        max_pages: input.max_pages.unwrap_or(state.default_max_pages),
        template,
    };

    // Spawned so a disconnecting client cannot abort the run halfway through
    // its inserts or skip the task record.
    let outcome = tokio::spawn(execute(state, user.id, store, request))
        .await
        .map_err(|e| AppError::Internal(format!("scrape task failed: {e}")))??;

    Ok(Json(ScrapeResponse {
        success: outcome.success,
        message: outcome.message(),
        data: ScrapeSummary {
            total_jobs: outcome.total_found,
            saved_jobs: outcome.saved.len(),
            failed_jobs: outcome.failed,
            pages_scraped: outcome.pages_scraped,
            jobs: outcome.saved,
        },
        error: outcome.error,
    }))
}

/// Run one scrape to completion and record it. Deregisters on every exit path.
async fn execute(
    state: AppState,
    user_id: String,
    store: PgPool,
    request: ScrapeRequest,
) -> Result<ScrapeOutcome, AppError> {
    let target_url = request.target_url.clone();
    let website_type = request.website_type.clone();

    let log = state.hub.sink(&user_id);
    let guard = state.runs.register(&user_id);
    let started_at = Utc::now();
    let outcome = runner::run(
        &state.scraper,
        &state.registry,
        &store,
        request,
        &log,
        &guard.token,
    )
    .await?;
    drop(guard);

    let record = TaskRecord {
        user_id: &user_id,
        target_url: &target_url,
        source_website: &website_type,
        succeeded: outcome.success,
        total_jobs_found: count(outcome.total_found),
        jobs_scraped: count(outcome.saved.len()),
        jobs_failed: count(outcome.failed),
        pages_scraped: count(outcome.pages_scraped),
        error: outcome.error.as_deref(),
        started_at,
    };
    if let Err(e) = ScrapingTask::record(&state.pool, &record).await {
        tracing::warn!("Failed to record scraping task for {target_url}: {e}");
    }

    Ok(outcome)
}

/// POST /api/v1/scrape/cancel
pub async fn cancel(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Json<serde_json::Value> {
    let cancelled = state.runs.cancel_all(&user.id);
    if cancelled > 0 {
        state
            .hub
            .append(&user.id, format!("[cancel] requested for {cancelled} run(s)"));
    }
    Json(serde_json::json!({ "cancelled": cancelled }))
}
