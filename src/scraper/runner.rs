use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::loghub::LogSink;
use crate::models::job::Job;
use crate::scraper::engine::UniversalScraper;
use crate::scraper::persist;
use crate::scraper::registry::SiteRegistry;
use crate::scraper::template::TemplateDraft;
use crate::store::JobStore;

/// One requested scrape, as received from the API or the CLI.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub target_url: String,
    pub website_type: String,
    pub max_pages: u32,
    pub template: TemplateDraft,
}

#[derive(Debug, Serialize)]
pub struct ScrapeOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub pages_scraped: u32,
    pub total_found: usize,
    pub saved: Vec<Job>,
    pub failed: usize,
}

impl ScrapeOutcome {
    pub fn message(&self) -> String {
        match &self.error {
            Some(e) if !self.success => format!("Scrape failed: {e}"),
            _ => format!("Saved {} of {} jobs", self.saved.len(), self.total_found),
        }
    }
}

/// Complete the template, run the engine, then write the results.
///
/// Only configuration problems are returned as errors, and they surface
/// before any request goes to the third-party site.
#[tracing::instrument(
    skip_all,
    fields(run = %uuid::Uuid::new_v4(), site = %request.website_type)
)]
pub async fn run(
    scraper: &UniversalScraper,
    registry: &SiteRegistry,
    store: &dyn JobStore,
    request: ScrapeRequest,
    log: &LogSink,
    cancel: &CancellationToken,
) -> Result<ScrapeOutcome, AppError> {
    if request.target_url.trim().is_empty() || request.website_type.trim().is_empty() {
        return Err(AppError::BadRequest(
            "targetUrl and websiteType are required".to_string(),
        ));
    }
    if request.max_pages == 0 {
        return Err(AppError::BadRequest("maxPages must be at least 1".to_string()));
    }

    let template = registry
        .enrich(&request.website_type, &request.target_url, request.template)
        .into_template()?;
    let prepared = template.prepare();

    tracing::info!(
        "Starting scrape of {} ({}) for up to {} pages",
        request.target_url,
        request.website_type,
        request.max_pages
    );

    let result = scraper
        .run(&prepared, &request.target_url, request.max_pages, log, cancel)
        .await;
    log.line(format!(
        "[parsed] count={} pages={}",
        result.total_found, result.pages_scraped
    ));

    // Detail URLs follow the site the jobs are stamped with, not the host.
    let site = registry.get(&request.website_type);
    let persisted = persist::persist(store, result.jobs, &request.website_type, site, log).await;

    tracing::info!(
        "Scrape of {} finished: {} found, {} saved, {} failed",
        request.target_url,
        result.total_found,
        persisted.saved.len(),
        persisted.failed
    );

    Ok(ScrapeOutcome {
        success: result.success,
        error: result.error,
        pages_scraped: result.pages_scraped,
        total_found: result.total_found,
        saved: persisted.saved,
        failed: persisted.failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::time::Duration;

    fn scraper() -> UniversalScraper {
        UniversalScraper::new(reqwest::Client::new(), Duration::ZERO)
    }

    #[tokio::test]
    async fn fills_catalog_mapping_and_persists() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/position/searchPosition")
            .match_query(Matcher::Regex("timestamp=\\d+".into()))
            .match_body(Matcher::PartialJson(json!({ "pageIndex": 1 })))
            .with_body(
                json!({
                    "data": { "positionList": [
                        { "postId": "p1", "positionTitle": "Backend Engineer", "workCities": ["深圳"] },
                        { "postId": "p2", "positionTitle": "Game Designer", "workCities": "上海" }
                    ] }
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let template: TemplateDraft = serde_json::from_value(json!({
            "url": format!("{}/api/v1/position/searchPosition?timestamp=1", server.url()),
            "body": { "pageIndex": 1, "pageSize": 20 }
        }))
        .unwrap();

        let store = MemoryStore::default();
        let outcome = run(
            &scraper(),
            &SiteRegistry::builtin().unwrap(),
            &store,
            ScrapeRequest {
                target_url: "https://join.qq.com/post.html".into(),
                website_type: "tencent".into(),
                max_pages: 3,
                template,
            },
            &LogSink::detached(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert!(outcome.success);
        assert_eq!(outcome.total_found, 2);
        assert_eq!(outcome.saved.len(), 2);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.message(), "Saved 2 of 2 jobs");

        let rows = store.rows();
        assert_eq!(rows[0].location.as_deref(), Some("深圳"));
        assert_eq!(
            rows[1].original_url.as_deref(),
            Some("https://join.qq.com/post.html?id=p2")
        );
        assert!(rows.iter().all(|r| r.source_website == "tencent"));
    }

    #[tokio::test]
    async fn incomplete_template_is_rejected_before_any_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let template = TemplateDraft {
            url: Some(format!("{}/jobs", server.url())),
            ..Default::default()
        };
        let err = run(
            &scraper(),
            &SiteRegistry::builtin().unwrap(),
            &MemoryStore::default(),
            ScrapeRequest {
                target_url: "https://careers.acme.io".into(),
                website_type: "acme".into(),
                max_pages: 2,
                template,
            },
            &LogSink::detached(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn first_page_failure_saves_nothing() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/jobs")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let template: TemplateDraft = serde_json::from_value(json!({
            "url": format!("{}/jobs", server.url()),
            "method": "GET",
            "dataPath": "items",
            "mapping": { "title": "title", "external_job_id": "id" }
        }))
        .unwrap();

        let store = MemoryStore::default();
        let outcome = run(
            &scraper(),
            &SiteRegistry::builtin().unwrap(),
            &store,
            ScrapeRequest {
                target_url: server.url(),
                website_type: "custom".into(),
                max_pages: 2,
                template,
            },
            &LogSink::detached(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!outcome.success);
        assert!(outcome.saved.is_empty());
        assert!(outcome.message().starts_with("Scrape failed"));
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn detail_urls_follow_the_stamped_site_not_the_host() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/jobs")
            .match_query(Matcher::Any)
            .with_body(json!({ "items": [{ "id": "p9", "title": "SRE" }] }).to_string())
            .create_async()
            .await;

        let template: TemplateDraft = serde_json::from_value(json!({
            "url": format!("{}/jobs", server.url()),
            "method": "GET",
            "dataPath": "items",
            "mapping": { "title": "title", "external_job_id": "id" }
        }))
        .unwrap();

        let store = MemoryStore::default();
        let outcome = run(
            &scraper(),
            &SiteRegistry::builtin().unwrap(),
            &store,
            ScrapeRequest {
                target_url: "https://join.qq.com/post.html".into(),
                website_type: "custom".into(),
                max_pages: 1,
                template,
            },
            &LogSink::detached(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.saved.len(), 1);
        let rows = store.rows();
        assert_eq!(rows[0].source_website, "custom");
        assert_eq!(rows[0].external_job_id.as_deref(), Some("p9"));
        assert!(rows[0].original_url.is_none());
    }
}
