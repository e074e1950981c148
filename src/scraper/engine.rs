use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::loghub::LogSink;
use crate::scraper::mapper::{NormalizedJob, map_record};
use crate::scraper::pagination::{ConcreteRequest, build_request};
use crate::scraper::path;
use crate::scraper::template::PreparedTemplate;

const REQUEST_PREVIEW: usize = 500;
const RESPONSE_PREVIEW: usize = 500;
const SAMPLE_PREVIEW: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API request failed: {0}")]
    Status(reqwest::StatusCode),

    #[error("response is not valid JSON: {0}")]
    Decode(String),

    #[error("dataPath '{0}' did not resolve to an array")]
    Shape(String),

    #[error("cancelled")]
    Cancelled,
}

/// Outcome of one engine run. Jobs are in fetch order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeResult {
    pub success: bool,
    pub jobs: Vec<NormalizedJob>,
    pub total_found: usize,
    pub pages_scraped: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Drives paginated fetches for one request template.
pub struct UniversalScraper {
    client: reqwest::Client,
    rate_limit: Duration,
}

enum PageOutcome {
    Records(Vec<Value>),
    EndOfData,
}

impl UniversalScraper {
    pub fn new(client: reqwest::Client, rate_limit: Duration) -> Self {
        Self { client, rate_limit }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetch up to `max_pages` pages sequentially and map every record.
    ///
    /// A failure on the first page fails the run. A failure on a later page
    /// ends the run early but keeps what was already collected.
    pub async fn run(
        &self,
        prepared: &PreparedTemplate,
        target_url: &str,
        max_pages: u32,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> ScrapeResult {
        let mut result = ScrapeResult::default();
        let expected = prepared.expected_page_size();
        let mapping = &prepared.template.mapping;

        log.line(format!(
            "[start] universal target={target_url} max_pages={max_pages} page_size={expected}"
        ));

        let mut page = 1;
        while page <= max_pages {
            let outcome = if cancel.is_cancelled() {
                Err(ScrapeError::Cancelled)
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(ScrapeError::Cancelled),
                    outcome = self.fetch_page(prepared, page, log) => outcome,
                }
            };

            let records = match outcome {
                Ok(PageOutcome::Records(records)) => records,
                Ok(PageOutcome::EndOfData) => {
                    log.line(format!("[end] page={page} no more records"));
                    break;
                }
                Err(e) if page == 1 => {
                    log.line(format!("[error] page={page} {e}"));
                    tracing::warn!("Scrape of {target_url} failed on first page: {e}");
                    result.error = Some(e.to_string());
                    return result;
                }
                Err(e) => {
                    log.line(format!("[error] page={page} {e}, keeping earlier pages"));
                    tracing::warn!("Scrape of {target_url} stopped at page {page}: {e}");
                    break;
                }
            };

            let mapped: Vec<NormalizedJob> = records
                .iter()
                .map(|r| map_record(r, mapping))
                .filter(NormalizedJob::is_acceptable)
                .collect();

            if let Some(first) = mapped.first() {
                let sample = serde_json::to_string(first).unwrap_or_default();
                log.line(format!(
                    "[extracted] page={page} count={} sample={}",
                    mapped.len(),
                    preview(&sample, SAMPLE_PREVIEW)
                ));
            }

            result.jobs.extend(mapped);
            result.pages_scraped = page;

            if (records.len() as u64) < expected || page == max_pages {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log.line(format!("[cancelled] after page={page}"));
                    break;
                }
                _ = tokio::time::sleep(self.rate_limit) => {}
            }
            page += 1;
        }

        result.total_found = result.jobs.len();
        result.success = true;
        result
    }

    async fn fetch_page(
        &self,
        prepared: &PreparedTemplate,
        page: u32,
        log: &LogSink,
    ) -> Result<PageOutcome, ScrapeError> {
        let request = build_request(prepared, page, chrono::Utc::now().timestamp_millis());
        let body_preview = request
            .body
            .as_ref()
            .map(|b| preview(&b.to_string(), REQUEST_PREVIEW).to_string())
            .unwrap_or_default();
        log.line(format!(
            "[request] page={page} method={} url={} body={body_preview}",
            request.method, request.url
        ));

        let data = self.send(request).await?;
        log.line(format!(
            "[response] page={page} {}",
            preview(&data.to_string(), RESPONSE_PREVIEW)
        ));

        let data_path = &prepared.template.data_path;
        match path::resolve_array(&data, data_path) {
            Some(records) if !records.is_empty() => Ok(PageOutcome::Records(records.clone())),
            Some(_) => Ok(PageOutcome::EndOfData),
            None if prepared.template.strict_data_path => {
                Err(ScrapeError::Shape(data_path.clone()))
            }
            None => {
                tracing::debug!("dataPath '{data_path}' not found on page {page}");
                Ok(PageOutcome::EndOfData)
            }
        }
    }

    async fn send(&self, request: ConcreteRequest) -> Result<Value, ScrapeError> {
        let mut builder = self.client.request(request.method.into(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let resp = builder.send().await?;
        if !resp.status().is_success() {
            return Err(ScrapeError::Status(resp.status()));
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| ScrapeError::Decode(e.to_string()))
    }
}

/// Truncate to at most `max` characters.
pub fn preview(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
