use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::models::job::Job;
use crate::scraper::search;
use crate::state::AppState;
use crate::store::JobStore;

#[derive(Debug, Default, Deserialize)]
pub struct JobsQuery {
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsPage {
    pub jobs: Vec<Job>,
    pub total_count: i64,
    pub distinct_source_count: i64,
}

/// GET /api/v1/jobs?q=
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<JobsPage>, AppError> {
    let store = state.store_for(&user.id).await?;
    let page = listing(&store, query.q.as_deref().unwrap_or(""), &state).await?;
    Ok(Json(page))
}

async fn listing(store: &dyn JobStore, q: &str, state: &AppState) -> Result<JobsPage, AppError> {
    let jobs = search::list_with_fallback(store, q.trim(), &state.registry).await?;
    Ok(JobsPage {
        jobs,
        total_count: store.count().await?,
        distinct_source_count: store.distinct_sources().await?,
    })
}
