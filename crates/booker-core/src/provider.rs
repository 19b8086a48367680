//! Rate-limited wrapper around a raw provider backend.
//!
//! Adds three behaviors on top of any [`ProviderBackend`]:
//!
//! - a token-interval rate limiter (one remote call per tick, ticks never
//!   accumulate beyond one),
//! - a per-ISBN memo consulted before the limiter or the backend,
//! - a self-disable latch set on the first upstream 429; once latched,
//!   every lookup fails fast until the process restarts.
//!
//! Lookup order is cache, then latch, then tick, then backend — so a
//! disabled or memoized lookup never spends a tick.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Interval, MissedTickBehavior};

use crate::book::{BookResult, SearchTerms};
use crate::error::AppError;
use crate::traits::{Provider, ProviderBackend, Service};

pub struct RateLimitedProvider<B: ProviderBackend> {
    backend: B,
    ticker: tokio::sync::Mutex<Interval>,
    cache: Mutex<HashMap<String, BookResult>>,
    disabled: AtomicBool,
}

impl<B: ProviderBackend> RateLimitedProvider<B> {
    /// Wraps a backend with a limiter that admits one remote call per
    /// `milliseconds_per_request`. The first call waits a full period.
    pub fn new(backend: B, milliseconds_per_request: u64) -> Self {
        let period = Duration::from_millis(milliseconds_per_request.max(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            backend,
            ticker: tokio::sync::Mutex::new(ticker),
            cache: Mutex::new(HashMap::new()),
            disabled: AtomicBool::new(false),
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, BookResult>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn find_result(&self, isbn: &str, filepath: &str) -> Result<BookResult, AppError> {
        if let Some(cached) = self.lock_cache().get(isbn).cloned() {
            return Ok(cached);
        }

        if self.disabled.load(Ordering::SeqCst) {
            return Err(AppError::ProviderDisabled(self.backend.name().to_string()));
        }

        self.ticker.lock().await.tick().await;

        match self.backend.find_result(isbn, filepath).await {
            Ok(result) => Ok(result),
            Err(err) if err.is_rate_limit() => {
                self.disabled.store(true, Ordering::SeqCst);
                tracing::error!(
                    provider = self.backend.name(),
                    "rate limit exceeded, self-disabling provider"
                );
                Err(err)
            }
            Err(err) => {
                // Only failed lookups are memoized; the stored zero-value
                // result satisfies later hits without touching the backend.
                self.lock_cache().insert(isbn.to_string(), BookResult::default());
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<B: ProviderBackend> Service for RateLimitedProvider<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn self_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        if self.disabled() {
            return Err(AppError::ProviderDisabled(self.backend.name().to_string()));
        }
        self.backend.health_check().await
    }
}

#[async_trait]
impl<B: ProviderBackend> Provider for RateLimitedProvider<B> {
    async fn get_book_metadata(
        &self,
        search: &SearchTerms,
    ) -> Result<Vec<BookResult>, AppError> {
        let all_isbns = search
            .isbn10s
            .iter()
            .map(|isbn| isbn.as_str())
            .chain(search.isbn13s.iter().map(|isbn| isbn.as_str()));

        let mut results = Vec::new();
        for isbn in all_isbns {
            let result = self.find_result(isbn, &search.filepath).await?;
            results.push(result);
        }

        Ok(results)
    }

    fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    fn disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.backend.shutdown().await;
    }
}
