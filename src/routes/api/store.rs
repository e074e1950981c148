use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::models::job::Job;
use crate::models::store_connection::StoreConnection;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStore {
    pub database_url: String,
}

/// PUT /api/v1/store
///
/// The descriptor is checked by connecting before it is saved.
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(input): Json<SetStore>,
) -> Result<Json<StoreConnection>, AppError> {
    let url = input.database_url.trim();
    if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
        return Err(AppError::BadRequest(
            "databaseUrl must be a postgres:// URL".to_string(),
        ));
    }

    if let Ok(previous) = StoreConnection::for_user(&state.pool, &user.id).await {
        state.stores.forget(&previous.database_url).await;
    }
    state.stores.get_or_connect(url).await?;

    let conn = StoreConnection::upsert(&state.pool, &user.id, url).await?;
    tracing::info!("Target store updated for user {}", user.id);
    Ok(Json(conn))
}

/// POST /api/v1/store/setup
pub async fn setup(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = state.store_for(&user.id).await?;
    Job::ensure_schema(&store).await?;
    let count = Job::count(&store).await?;
    Ok(Json(serde_json::json!({ "ready": true, "jobs": count })))
}
