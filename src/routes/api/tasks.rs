use axum::extract::State;
use axum::{Extension, Json};

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::models::scraping_task::ScrapingTask;
use crate::state::AppState;

const RECENT_TASKS: i64 = 50;

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<ScrapingTask>>, AppError> {
    let tasks = ScrapingTask::recent(&state.pool, &user.id, RECENT_TASKS).await?;
    Ok(Json(tasks))
}
