pub mod analyze;
pub mod configs;
pub mod jobs;
pub mod scrape;
pub mod scrape_log;
pub mod store;
pub mod tasks;
pub mod test_api;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post, put};

use crate::auth::require_api_token;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let protected = routes()
        .layer(middleware::from_fn_with_state(
            state.pool.clone(),
            require_api_token,
        ))
        .with_state(state);

    Router::new().nest("/api/v1", protected)
}

fn routes() -> Router<AppState> {
    Router::new()
        // Scraping
        .route("/scrape", post(scrape::start))
        .route("/scrape/cancel", post(scrape::cancel))
        .route("/scrape-log", get(scrape_log::show))
        .route("/tasks", get(tasks::list))
        // Jobs in the user's target store
        .route("/jobs", get(jobs::list))
        .route("/store", put(store::update))
        .route("/store/setup", post(store::setup))
        // Templates
        .route("/analyze", post(analyze::analyze))
        .route("/sites", get(analyze::sites))
        .route("/test-api", post(test_api::try_endpoint))
        .route("/configs", get(configs::list).post(configs::create))
        .route(
            "/configs/{id}",
            get(configs::get).delete(configs::delete),
        )
}
