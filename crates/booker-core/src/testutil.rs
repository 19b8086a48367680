//! Test utilities: mock implementations of the core trait seams.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks use
//! `Arc<Mutex<_>>` for interior mutability, allowing test assertions on
//! recorded calls.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::book::{Book, BookResult, Isbn13};
use crate::error::AppError;
use crate::traits::{Extractor, ProviderBackend, Service};
use crate::writer::BookWriter;

// ---------------------------------------------------------------------------
// MockService
// ---------------------------------------------------------------------------

/// Service whose check results can be flipped mid-test.
pub struct MockService {
    name: String,
    self_ok: AtomicBool,
    healthy: AtomicBool,
}

impl MockService {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            self_ok: AtomicBool::new(true),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn set_self_ok(&self, ok: bool) {
        self.self_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl Service for MockService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn self_check(&self) -> Result<(), AppError> {
        if self.self_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Generic("self check failed".into()))
        }
    }

    async fn health_check(&self) -> Result<(), AppError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Generic("health check failed".into()))
        }
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Extractor that returns a fixed text (or a fixed error) for every file,
/// optionally after a configurable delay.
pub struct MockExtractor {
    name: String,
    response: Result<String, String>,
    delay: Option<std::time::Duration>,
    healthy: AtomicBool,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub shutdown_count: Arc<AtomicUsize>,
}

impl MockExtractor {
    pub fn new(text: &str) -> Self {
        Self {
            name: "mock-extractor".to_string(),
            response: Ok(text.to_string()),
            delay: None,
            healthy: AtomicBool::new(true),
            calls: Arc::new(Mutex::new(Vec::new())),
            shutdown_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_error(message: &str) -> Self {
        let mut mock = Self::new("");
        mock.response = Err(message.to_string());
        mock
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Service for MockExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn self_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Generic("mock extractor unhealthy".into()))
        }
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract_text(
        &self,
        book: &Book,
        _max_characters: usize,
    ) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(book.filepath.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(AppError::Extract(message.clone())),
        }
    }

    async fn shutdown(&self) {
        self.shutdown_count.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockProviderBackend
// ---------------------------------------------------------------------------

/// Backend with a scripted response queue. Each lookup pops the front; an
/// empty queue yields a well-formed high-confidence result for the queried
/// ISBN.
#[derive(Clone)]
pub struct MockProviderBackend {
    name: String,
    responses: Arc<Mutex<Vec<Result<BookResult, AppError>>>>,
    healthy: Arc<AtomicBool>,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub shutdown_count: Arc<AtomicUsize>,
}

impl MockProviderBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            responses: Arc::new(Mutex::new(Vec::new())),
            healthy: Arc::new(AtomicBool::new(true)),
            calls: Arc::new(Mutex::new(Vec::new())),
            shutdown_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_responses(name: &str, responses: Vec<Result<BookResult, AppError>>) -> Self {
        let mock = Self::new(name);
        *mock.responses.lock().unwrap() = responses;
        mock
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn default_result(isbn: &str, filepath: &str) -> BookResult {
        BookResult {
            filepath: filepath.to_string(),
            title: Some("How to Hack Like a Ghost".to_string()),
            authors: Some(vec!["Sparc Flow".to_string()]),
            isbn13: Some(Isbn13::new(isbn)),
            confidence: 100.0,
            source_provider_name: "mock".to_string(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ProviderBackend for MockProviderBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_result(&self, isbn: &str, filepath: &str) -> Result<BookResult, AppError> {
        self.calls.lock().unwrap().push(isbn.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Self::default_result(isbn, filepath))
        } else {
            responses.remove(0)
        }
    }

    async fn health_check(&self) -> Result<(), AppError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Generic("mock backend unhealthy".into()))
        }
    }

    async fn shutdown(&self) {
        self.shutdown_count.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockBookWriter
// ---------------------------------------------------------------------------

/// Sink that records every written book.
#[derive(Clone, Default)]
pub struct MockBookWriter {
    pub written: Arc<Mutex<Vec<Book>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockBookWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<Book> {
        self.written.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BookWriter for MockBookWriter {
    async fn write_book(&self, book: &Book) {
        self.written.lock().unwrap().push(book.clone());
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
