use std::collections::BTreeMap;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::scraper::engine::preview;
use crate::scraper::template::HttpMethod;
use crate::state::AppState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const TEXT_PREVIEW: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct TestApiRequest {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestApiResponse {
    pub ok: bool,
    pub status: u16,
    pub content_type: String,
    pub preview: Value,
}

/// POST /api/v1/test-api
///
/// One request against a third-party endpoint, so a template can be checked
/// before it is saved. Nothing is persisted.
pub async fn try_endpoint(
    State(state): State<AppState>,
    Json(input): Json<TestApiRequest>,
) -> Result<Json<TestApiResponse>, AppError> {
    let url = url::Url::parse(&input.url)
        .map_err(|e| AppError::BadRequest(format!("Invalid url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::BadRequest(
            "Only http and https URLs are supported".to_string(),
        ));
    }

    let mut req = state
        .scraper
        .client()
        .request(input.method.into(), url)
        .timeout(REQUEST_TIMEOUT);
    for (name, value) in &input.headers {
        req = req.header(name, value);
    }
    if let Some(body) = &input.body {
        req = match body {
            Value::String(raw) => req.body(raw.clone()),
            other => req.json(other),
        };
    }

    let resp = req
        .send()
        .await
        .map_err(|e| AppError::BadRequest(format!("Request failed: {e}")))?;
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let text = resp.text().await.unwrap_or_default();

    let preview = if content_type.contains("application/json") {
        serde_json::from_str(&text).unwrap_or(Value::Null)
    } else {
        Value::String(preview(&text, TEXT_PREVIEW).to_string())
    };

    Ok(Json(TestApiResponse {
        ok: status.is_success(),
        status: status.as_u16(),
        content_type,
        preview,
    }))
}
