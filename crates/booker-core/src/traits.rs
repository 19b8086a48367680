//! Trait seams for the engine's external collaborators.
//!
//! Extractors and providers are injected through these object-safe traits,
//! so the orchestrator never knows which concrete HTTP services it is
//! talking to and tests can substitute mocks for all of them.

use async_trait::async_trait;

use crate::book::{Book, BookResult, SearchTerms};
use crate::error::AppError;

/// Anything the service supervisor can probe.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    /// Local sanity check; cheap, no network.
    async fn self_check(&self) -> Result<(), AppError>;

    /// Remote liveness check against the backing service.
    async fn health_check(&self) -> Result<(), AppError>;
}

/// Turns a file into plain text.
#[async_trait]
pub trait Extractor: Service {
    /// Extracts up to `max_characters` bytes of text from the book's file.
    async fn extract_text(&self, book: &Book, max_characters: usize) -> Result<String, AppError>;

    async fn shutdown(&self);
}

/// Answers ISBN queries with candidate metadata records.
#[async_trait]
pub trait Provider: Service {
    /// One lookup per ISBN in the search terms, results in term order.
    async fn get_book_metadata(&self, search: &SearchTerms) -> Result<Vec<BookResult>, AppError>;

    fn clear_cache(&self);

    /// True once the provider has latched itself off after an upstream
    /// rate-limit signal.
    fn disabled(&self) -> bool;

    async fn shutdown(&self);
}

/// The raw upstream behind a rate-limited provider wrapper: one ISBN in,
/// one candidate record out. Rate limiting, memoization, and the disable
/// latch live in the wrapper, not here.
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    fn name(&self) -> &str;

    /// `filepath` is the originating file, used for title matching and
    /// carried into the returned record.
    async fn find_result(&self, isbn: &str, filepath: &str) -> Result<BookResult, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;

    async fn shutdown(&self);
}
