mod auth;
mod config;
mod db;
mod error;
mod loghub;
mod models;
mod routes;
mod scraper;
mod state;
mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use chrono::Utc;
use clap::Parser;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::{Command, Config};
use crate::loghub::{LogHub, LogSink};
use crate::models::job::Job;
use crate::models::scraping_task::{ScrapingTask, TaskRecord};
use crate::scraper::engine::UniversalScraper;
use crate::scraper::registry::SiteRegistry;
use crate::scraper::runner::{self, ScrapeRequest};
use crate::scraper::template::TemplateDraft;
use crate::state::{ActiveRuns, AppState, StorePools};

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(pool: PgPool) -> impl IntoResponse {
    let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(&pool).await;
    match result {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("jobscrape=info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_scraper(config: &Config) -> anyhow::Result<UniversalScraper> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("building HTTP client")?;
    Ok(UniversalScraper::new(
        client,
        Duration::from_millis(config.rate_limit_ms),
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutting down");
}

async fn serve(config: &Config, pool: PgPool, listen_addr: &str) -> anyhow::Result<()> {
    let registry = SiteRegistry::load(config.sites_file.as_deref())?;
    tracing::info!("Site catalog has {} entries", registry.sites().len());

    let state = AppState {
        pool: pool.clone(),
        hub: LogHub::new(config.log_buffer),
        registry: Arc::new(registry),
        scraper: Arc::new(build_scraper(config)?),
        runs: ActiveRuns::default(),
        stores: StorePools::default(),
        default_max_pages: config.default_max_pages,
    };

    let readyz_pool = pool;
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(move || readyz(readyz_pool.clone())))
        .merge(routes::api::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("Listening on {listen_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

struct ScrapeArgs {
    target_url: String,
    website_type: String,
    template: Option<PathBuf>,
    max_pages: Option<u32>,
    store_url: Option<String>,
    user: String,
}

async fn scrape_once(config: &Config, pool: PgPool, args: ScrapeArgs) -> anyhow::Result<()> {
    let template: TemplateDraft = match &args.template {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading template {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing template {}", path.display()))?
        }
        None => TemplateDraft::default(),
    };

    let store = match &args.store_url {
        Some(url) => db::connect_store(url).await.context("connecting to target store")?,
        None => pool.clone(),
    };
    Job::ensure_schema(&store).await?;

    let registry = SiteRegistry::load(config.sites_file.as_deref())?;
    let scraper = build_scraper(config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current page");
            on_interrupt.cancel();
        }
    });

    let started_at = Utc::now();
    let outcome = runner::run(
        &scraper,
        &registry,
        &store,
        ScrapeRequest {
            target_url: args.target_url.clone(),
            website_type: args.website_type.clone(),
            max_pages: args.max_pages.unwrap_or(config.default_max_pages),
            template,
        },
        &LogSink::detached(),
        &cancel,
    )
    .await?;

    ScrapingTask::record(
        &pool,
        &TaskRecord {
            user_id: &args.user,
            target_url: &args.target_url,
            source_website: &args.website_type,
            succeeded: outcome.success,
            total_jobs_found: i32::try_from(outcome.total_found).unwrap_or(i32::MAX),
            jobs_scraped: i32::try_from(outcome.saved.len()).unwrap_or(i32::MAX),
            jobs_failed: i32::try_from(outcome.failed).unwrap_or(i32::MAX),
            pages_scraped: i32::try_from(outcome.pages_scraped).unwrap_or(i32::MAX),
            error: outcome.error.as_deref(),
            started_at,
        },
    )
    .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        anyhow::bail!(outcome.message());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        db::run_migrations(&pool).await?;
        tracing::info!("Migrations complete");
    }

    match config.resolved_command() {
        Command::Serve { listen_addr } => serve(&config, pool, &listen_addr).await,
        Command::Scrape {
            target_url,
            website_type,
            template,
            max_pages,
            store_url,
            user,
        } => {
            let args = ScrapeArgs {
                target_url,
                website_type,
                template,
                max_pages,
                store_url,
                user,
            };
            scrape_once(&config, pool, args).await
        }
        Command::IssueToken {
            user,
            name,
            approved,
            expires_in_days,
        } => {
            let expires_at = expires_in_days.map(|days| Utc::now() + chrono::Duration::days(days));
            let token = auth::issue_token(&pool, &user, &name, approved, expires_at).await?;
            tracing::info!("Issued token '{name}' for user {user}");
            println!("{token}");
            Ok(())
        }
    }
}
