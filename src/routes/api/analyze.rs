use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::scraper::registry::Proposal;
use crate::scraper::template::HttpMethod;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub site: Option<String>,
    #[serde(default)]
    pub base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSummary {
    pub id: String,
    pub display_name: String,
    pub hosts: Vec<String>,
    pub aliases: Vec<String>,
    pub endpoint: Option<String>,
    pub method: Option<HttpMethod>,
}

/// POST /api/v1/analyze
///
/// Propose a starting request template for a listing page.
pub async fn analyze(
    State(state): State<AppState>,
    Json(input): Json<AnalyzeRequest>,
) -> Result<Json<Proposal>, AppError> {
    if url::Url::parse(&input.base_url).is_err() {
        return Err(AppError::BadRequest(format!(
            "baseUrl '{}' is not a valid URL",
            input.base_url
        )));
    }
    let site = input.site.as_deref().filter(|s| !s.trim().is_empty());
    Ok(Json(state.registry.propose(site, &input.base_url)))
}

pub async fn sites(State(state): State<AppState>) -> Json<Vec<SiteSummary>> {
    Json(
        state
            .registry
            .sites()
            .iter()
            .map(|s| SiteSummary {
                id: s.id.clone(),
                display_name: s.display_name.clone(),
                hosts: s.hosts.clone(),
                aliases: s.aliases.clone(),
                endpoint: s.endpoint.clone(),
                method: s.method,
            })
            .collect(),
    )
}
