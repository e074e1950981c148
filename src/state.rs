use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::db;
use crate::error::AppError;
use crate::loghub::LogHub;
use crate::models::store_connection::StoreConnection;
use crate::scraper::engine::UniversalScraper;
use crate::scraper::registry::SiteRegistry;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub hub: LogHub,
    pub registry: Arc<SiteRegistry>,
    pub scraper: Arc<UniversalScraper>,
    pub runs: ActiveRuns,
    pub stores: StorePools,
    pub default_max_pages: u32,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> PgPool {
        state.pool.clone()
    }
}

impl AppState {
    /// Pool for the current user's target store.
    pub async fn store_for(&self, user_id: &str) -> Result<PgPool, AppError> {
        let conn = StoreConnection::for_user(&self.pool, user_id).await?;
        self.stores.get_or_connect(&conn.database_url).await
    }
}

/// Cancellation handles of in-flight scrape runs, keyed by user.
#[derive(Clone, Default)]
pub struct ActiveRuns {
    inner: Arc<Mutex<HashMap<String, Vec<(u64, CancellationToken)>>>>,
    next_id: Arc<AtomicU64>,
}

/// Registration of one run. Dropping it deregisters the run, including when
/// the future holding it is dropped mid-flight.
pub struct RunGuard {
    runs: ActiveRuns,
    user_id: String,
    id: u64,
    pub token: CancellationToken,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runs.remove(&self.user_id, self.id);
    }
}

impl ActiveRuns {
    pub fn register(&self, user_id: &str) -> RunGuard {
        let guard = RunGuard {
            runs: self.clone(),
            user_id: user_id.to_string(),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        let mut runs = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        runs.entry(user_id.to_string())
            .or_default()
            .push((guard.id, guard.token.clone()));
        guard
    }

    fn remove(&self, user_id: &str, id: u64) {
        let mut runs = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tokens) = runs.get_mut(user_id) {
            tokens.retain(|(run, _)| *run != id);
            if tokens.is_empty() {
                runs.remove(user_id);
            }
        }
    }

    /// Cancel every active run of `user_id`. Returns how many were signalled.
    pub fn cancel_all(&self, user_id: &str) -> usize {
        let mut runs = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let tokens = runs.remove(user_id).unwrap_or_default();
        for (_, token) in &tokens {
            token.cancel();
        }
        tokens.len()
    }

    pub fn active(&self, user_id: &str) -> usize {
        let runs = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        runs.get(user_id).map_or(0, Vec::len)
    }
}

/// Target-store pools, one per connection descriptor.
#[derive(Clone, Default)]
pub struct StorePools {
    pools: Arc<tokio::sync::Mutex<HashMap<String, PgPool>>>,
}

impl StorePools {
    pub async fn get_or_connect(&self, database_url: &str) -> Result<PgPool, AppError> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(database_url) {
            return Ok(pool.clone());
        }
        let pool = db::connect_store(database_url).await.map_err(|e| {
            tracing::warn!("Target store connection failed: {e}");
            AppError::BadRequest(format!("Could not connect to the target store: {e}"))
        })?;
        pools.insert(database_url.to_string(), pool.clone());
        Ok(pool)
    }

    pub async fn forget(&self, database_url: &str) {
        self.pools.lock().await.remove(database_url);
    }
}
