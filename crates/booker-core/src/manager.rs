//! The book manager: walks a directory of ebook files, feeds the pipeline,
//! and owns the three worker stages (extract, search, collate), the
//! terminal finisher, and the halt conditions.
//!
//! The manager holds the processed-book map (path → finished record) and
//! dedups against it both when walking and when finishing, so a path is
//! emitted at most once per run. Health supervision of extractors and
//! providers runs beside the data plane; if either live set empties the
//! scan halts best-effort.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use walkdir::WalkDir;

use crate::book::{Book, SearchTerms};
use crate::error::AppError;
use crate::isbn::{identify_isbn10s, identify_isbn13s};
use crate::pipeline::{Payload, Pipeline};
use crate::supervisor::ServiceManager;
use crate::traits::{Extractor, Provider};
use crate::util;
use crate::writer::BookWriter;

const ACCEPTED_FILE_TYPES: [&str; 11] = [
    "pdf", "epub", "mobi", "chm", "htm", "html", "rst", "rtf", "txt", "doc", "docx",
];

const DRY_RUN: &str = "dry run";
const NO_RESULTS_FOUND: &str = "no results found";

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How much extracted text to scan for ISBNs, in bytes.
    pub max_characters: usize,
    /// Total worker budget across all stages; 0 picks a count from the
    /// machine's parallelism and the collaborator counts.
    pub threads: i64,
    /// How often the supervisors probe their services.
    pub probe_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_characters: 10_000,
            threads: 0,
            probe_interval: Duration::from_secs(15),
        }
    }
}

struct ManagerState {
    extractors: Vec<Arc<dyn Extractor>>,
    providers: Vec<Arc<dyn Provider>>,
    extractors_manager: ServiceManager<dyn Extractor>,
    providers_manager: ServiceManager<dyn Provider>,
    max_characters: usize,
    books: tokio::sync::RwLock<HashMap<String, Book>>,
    dry_run: AtomicBool,
    writer: tokio::sync::Mutex<Option<Arc<dyn BookWriter>>>,
}

pub struct BookManager {
    state: Arc<ManagerState>,
    pipe: Pipeline,
}

impl std::fmt::Debug for BookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookManager").finish_non_exhaustive()
    }
}

impl BookManager {
    pub fn new(
        extractors: Vec<Arc<dyn Extractor>>,
        providers: Vec<Arc<dyn Provider>>,
        config: ManagerConfig,
    ) -> Result<Self, AppError> {
        if extractors.is_empty() {
            return Err(AppError::Generic(
                "at least one extractor must be enabled".into(),
            ));
        }
        if providers.is_empty() {
            return Err(AppError::Generic(
                "at least one provider must be enabled".into(),
            ));
        }

        let extractors_manager: ServiceManager<dyn Extractor> =
            ServiceManager::new(config.probe_interval);
        for extractor in &extractors {
            extractors_manager.manage(extractor.clone());
        }
        let providers_manager: ServiceManager<dyn Provider> =
            ServiceManager::new(config.probe_interval);
        for provider in &providers {
            providers_manager.manage(provider.clone());
        }

        let threads = resolve_thread_count(config.threads, extractors.len(), providers.len());

        let state = Arc::new(ManagerState {
            extractors,
            providers,
            extractors_manager,
            providers_manager,
            max_characters: config.max_characters,
            books: tokio::sync::RwLock::new(HashMap::new()),
            dry_run: AtomicBool::new(false),
            writer: tokio::sync::Mutex::new(None),
        });

        let mut pipe = Pipeline::new(threads);

        let st = state.clone();
        pipe.append_stage(
            "extract",
            Arc::new(move |payload| {
                let st = st.clone();
                Box::pin(async move { st.extract(payload).await })
            }),
        );
        let st = state.clone();
        pipe.append_stage(
            "search",
            Arc::new(move |payload| {
                let st = st.clone();
                Box::pin(async move { st.search(payload).await })
            }),
        );
        let st = state.clone();
        pipe.append_stage(
            "collate",
            Arc::new(move |payload| {
                let st = st.clone();
                Box::pin(async move { st.collate(payload).await })
            }),
        );
        let st = state.clone();
        pipe.collector_stage(Arc::new(move |payload| {
            let st = st.clone();
            Box::pin(async move { st.collect(payload).await })
        }));

        Ok(Self { state, pipe })
    }

    /// Seeds the processed map from a previous run's output. With
    /// `remove_errored`, entries that failed last time are dropped so the
    /// walk re-attempts them.
    pub async fn import(&self, cache_path: &str, remove_errored: bool) -> Result<(), AppError> {
        let data = std::fs::read_to_string(cache_path)?;
        let cached: HashMap<String, Book> = serde_json::from_str(&data)?;

        let mut books = self.state.books.write().await;
        books.extend(cached);
        if remove_errored {
            books.retain(|_, book| book.error_message.is_empty());
        }
        Ok(())
    }

    /// Walks `scan_path` and processes every accepted, not-yet-processed
    /// file through the pipeline, streaming results into `writer`.
    pub async fn scan(&mut self, scan_path: &str, dry_run: bool, writer: Arc<dyn BookWriter>) {
        let scan_path = util::expand_user(scan_path);
        let scan_path = match std::fs::canonicalize(&scan_path) {
            Ok(path) => path,
            Err(err) => {
                tracing::error!(path = %scan_path.display(), %err, "could not resolve scan path");
                return;
            }
        };

        *self.state.writer.lock().await = Some(writer.clone());
        self.state.dry_run.store(dry_run, Ordering::SeqCst);

        self.run_scan(&scan_path).await;

        writer.close().await;
        *self.state.writer.lock().await = None;
        self.state.dry_run.store(false, Ordering::SeqCst);
    }

    async fn run_scan(&mut self, scan_path: &Path) {
        tracing::info!(
            threads = self.pipe.total_thread_count(),
            "preparing to scan"
        );

        // Write any already-known books back out first, mainly so an
        // imported cache survives into the new output file.
        {
            let books = self.state.books.read().await;
            if let Some(writer) = self.state.writer.lock().await.as_ref() {
                for book in books.values() {
                    writer.write_book(book).await;
                }
            }
            tracing::info!(cached = books.len(), "loaded cached entries");
        }

        tracing::info!(path = %scan_path.display(), "beginning scan");

        let state = self.state.clone();
        self.pipe.run(Arc::new(move |payload, err| {
            let state = state.clone();
            Box::pin(async move { state.handle_failure(payload, err).await })
        }));

        let mut expected = self.state.processed_count().await;

        for entry in WalkDir::new(scan_path) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(%err, "failed to read directory entry");
                    continue;
                }
            };

            if entry.file_type().is_dir() || entry.path_is_symlink() {
                continue;
            }
            let Some(extension) = entry.path().extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !ACCEPTED_FILE_TYPES.contains(&extension) {
                continue;
            }

            let path = entry.path().to_string_lossy().to_string();
            if self.state.is_book_processed(&path).await {
                continue;
            }

            expected += 1;
            self.pipe.send(Payload::Book(Book::at_path(path)));
        }

        loop {
            if self.state.processed_count().await == expected {
                break;
            }
            if self.state.extractors_manager.get_live_services().is_empty() {
                tracing::error!("all extractors down");
                self.pipe.wait().await;
                self.pipe.close().await;
                return;
            }
            if self.state.providers_manager.get_live_services().is_empty() {
                tracing::error!("all providers down");
                self.pipe.wait().await;
                self.pipe.close().await;
                return;
            }
            if self.pipe.is_idle() {
                // Some payloads were dropped by the fail handler; nothing
                // will ever arrive for their books this run.
                let missing = expected - self.state.processed_count().await;
                tracing::warn!(missing, "pipeline drained with unaccounted books");
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        self.pipe.wait().await;
        self.pipe.close().await;

        tracing::info!("scan complete");
    }

    pub async fn shutdown(&mut self) {
        for provider in &self.state.providers {
            provider.shutdown().await;
        }
        for extractor in &self.state.extractors {
            extractor.shutdown().await;
        }
        self.state.extractors_manager.close();
        self.state.providers_manager.close();
        self.pipe.wait().await;
    }

    pub async fn processed_count(&self) -> usize {
        self.state.processed_count().await
    }
}

impl ManagerState {
    async fn is_book_processed(&self, filepath: &str) -> bool {
        self.books.read().await.contains_key(filepath)
    }

    async fn processed_count(&self) -> usize {
        self.books.read().await.len()
    }

    /// Terminal finisher: journal the book through the writer and record
    /// it, exactly once per path.
    async fn finish_book(&self, book: Book) {
        let writer_guard = self.writer.lock().await;
        let Some(writer) = writer_guard.as_ref() else {
            return;
        };

        if self.is_book_processed(&book.filepath).await {
            return;
        }

        let mut books = self.books.write().await;
        writer.write_book(&book).await;
        books.insert(book.filepath.clone(), book);
    }

    async fn extract(&self, payload: Payload) -> Result<Option<Payload>, AppError> {
        let kind = payload.kind();
        let Payload::Book(book) = payload else {
            return Err(AppError::Generic(format!(
                "extract stage received unexpected {kind} payload"
            )));
        };

        let live_extractors = self.extractors_manager.get_live_services();
        if live_extractors.is_empty() {
            return Err(AppError::Generic("no live extractors".into()));
        }

        let mut texts = Vec::new();
        for extractor in &live_extractors {
            match extractor.extract_text(&book, self.max_characters).await {
                Ok(text) => texts.push(text),
                Err(err) => {
                    tracing::debug!(extractor = extractor.name(), file = %book.filepath, %err, "extraction failed");
                }
            }
        }

        if texts.is_empty() {
            return Err(AppError::Generic("no texts extracted".into()));
        }

        let mut isbn10s = Vec::new();
        let mut isbn13s = Vec::new();
        for text in &texts {
            isbn10s.extend(identify_isbn10s(text));
            isbn13s.extend(identify_isbn13s(text));
        }

        Ok(Some(Payload::Terms(SearchTerms {
            isbn10s,
            isbn13s,
            filepath: book.filepath,
        })))
    }

    async fn search(&self, payload: Payload) -> Result<Option<Payload>, AppError> {
        let kind = payload.kind();
        let Payload::Terms(search) = payload else {
            return Err(AppError::Generic(format!(
                "search stage received unexpected {kind} payload"
            )));
        };

        if self.dry_run.load(Ordering::SeqCst) {
            return Err(AppError::Generic(DRY_RUN.into()));
        }

        let live_providers = self.providers_manager.get_live_services();
        if live_providers.is_empty() {
            return Err(AppError::Generic("no live providers".into()));
        }

        let mut results = Vec::new();
        for provider in &live_providers {
            match provider.get_book_metadata(&search).await {
                Ok(mut found) => results.append(&mut found),
                Err(err) => {
                    tracing::debug!(provider = provider.name(), file = %search.filepath, %err, "provider lookup failed");
                }
            }
        }

        if results.is_empty() {
            return Err(AppError::Generic(NO_RESULTS_FOUND.into()));
        }

        Ok(Some(Payload::Results(results)))
    }

    async fn collate(&self, payload: Payload) -> Result<Option<Payload>, AppError> {
        let kind = payload.kind();
        let Payload::Results(results) = payload else {
            return Err(AppError::Generic(format!(
                "collate stage received unexpected {kind} payload"
            )));
        };

        let best = crate::book::choose_best_result(&results)
            .map_err(|err| AppError::Generic(format!("could not collate: {err}")))?;

        Ok(Some(Payload::Book(best.to_book())))
    }

    async fn collect(&self, payload: Payload) {
        match payload {
            Payload::Book(book) => self.finish_book(book).await,
            other => {
                tracing::warn!(kind = other.kind(), "collector received unexpected payload");
            }
        }
    }

    /// Routes a stage failure by the shape of the failing input. Books are
    /// finished carrying the error; the search stage's empty-result
    /// failure is lifted to a book-shaped error; everything else is
    /// dropped silently.
    async fn handle_failure(&self, payload: Payload, err: AppError) {
        match payload {
            Payload::Book(mut book) => {
                book.error_message = err.to_string();
                self.finish_book(book).await;
            }
            Payload::Terms(terms) => {
                let message = err.to_string();
                if message.contains(DRY_RUN) {
                    return;
                }
                if message.contains(NO_RESULTS_FOUND) {
                    let mut book = Book::at_path(terms.filepath);
                    book.error_message = message;
                    self.finish_book(book).await;
                }
            }
            Payload::Results(_) => {}
        }
    }
}

fn resolve_thread_count(requested: i64, extractor_count: usize, provider_count: usize) -> i64 {
    let mut threads = requested;

    if threads == 0 {
        threads = best_thread_count(extractor_count, provider_count) as i64;
        tracing::info!(threads, "determined best thread count");
    }
    if threads > 2000 {
        threads = 2000;
        tracing::info!(threads, "capping thread count");
    }
    if threads & 1 == 1 {
        threads += 1;
        tracing::info!(threads, "making thread count even");
    }

    threads
}

fn best_thread_count(extractor_count: usize, provider_count: usize) -> usize {
    if provider_count == 0 {
        tracing::warn!("cannot calculate best thread count without any providers");
        return 0;
    }
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus / extractor_count.max(1)) * provider_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RateLimitedProvider;
    use crate::testutil::{MockBookWriter, MockExtractor, MockProviderBackend};

    const GHOST_TEXT: &str = "Identifiers: ISBN 9781718501263 (paperback)";

    fn mock_provider(backend: MockProviderBackend) -> Arc<dyn Provider> {
        Arc::new(RateLimitedProvider::new(backend, 1))
    }

    fn as_extractors(extractor: &Arc<MockExtractor>) -> Vec<Arc<dyn Extractor>> {
        vec![extractor.clone() as Arc<dyn Extractor>]
    }

    fn test_config() -> ManagerConfig {
        ManagerConfig {
            max_characters: 10_000,
            threads: 6,
            // Far enough out that probes never interfere unless a test
            // shortens it.
            probe_interval: Duration::from_secs(3600),
        }
    }

    fn touch(dir: &Path, name: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, b"file contents").unwrap();
        path.to_string_lossy().to_string()
    }

    fn canonical(dir: &tempfile::TempDir) -> std::path::PathBuf {
        std::fs::canonicalize(dir.path()).unwrap()
    }

    #[test]
    fn thread_count_is_capped_and_forced_even() {
        assert_eq!(resolve_thread_count(7, 1, 1), 8);
        assert_eq!(resolve_thread_count(8, 1, 1), 8);
        assert_eq!(resolve_thread_count(3000, 1, 1), 2000);
        assert_eq!(resolve_thread_count(1999, 1, 1), 2000);
    }

    #[tokio::test]
    async fn manager_requires_collaborators() {
        let backend = MockProviderBackend::new("mock");
        let err = BookManager::new(vec![], vec![mock_provider(backend)], test_config())
            .unwrap_err();
        assert!(err.to_string().contains("extractor"));

        let extractor: Arc<dyn Extractor> = Arc::new(MockExtractor::new(GHOST_TEXT));
        let err = BookManager::new(vec![extractor], vec![], test_config()).unwrap_err();
        assert!(err.to_string().contains("provider"));
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_produces_one_enriched_entry() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical(&dir);
        touch(&root, "a.pdf");

        let backend = MockProviderBackend::new("mock");
        let mut manager = BookManager::new(
            as_extractors(&Arc::new(MockExtractor::new(GHOST_TEXT))),
            vec![mock_provider(backend.clone())],
            test_config(),
        )
        .unwrap();

        let writer = Arc::new(MockBookWriter::new());
        manager
            .scan(root.to_str().unwrap(), false, writer.clone())
            .await;
        manager.shutdown().await;

        let written = writer.written();
        assert_eq!(written.len(), 1);
        let book = &written[0];
        assert_eq!(book.filepath, root.join("a.pdf").to_string_lossy());
        assert_eq!(book.isbn13.as_ref().unwrap().as_str(), "9781718501263");
        assert!(!book.title.is_empty());
        assert!(book.error_message.is_empty());
        assert_eq!(backend.calls(), vec!["9781718501263"]);
        assert!(writer.is_closed());
        assert_eq!(manager.processed_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn text_without_isbns_is_annotated_no_results_found() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical(&dir);
        touch(&root, "a.pdf");

        let backend = MockProviderBackend::new("mock");
        let mut manager = BookManager::new(
            as_extractors(&Arc::new(MockExtractor::new("hello world"))),
            vec![mock_provider(backend.clone())],
            test_config(),
        )
        .unwrap();

        let writer = Arc::new(MockBookWriter::new());
        manager
            .scan(root.to_str().unwrap(), false, writer.clone())
            .await;
        manager.shutdown().await;

        let written = writer.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].error_message, NO_RESULTS_FOUND);
        // No ISBNs means no lookups reached the provider.
        assert!(backend.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failing_extractors_annotate_the_book() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical(&dir);
        touch(&root, "a.pdf");

        let backend = MockProviderBackend::new("mock");
        let mut manager = BookManager::new(
            as_extractors(&Arc::new(MockExtractor::with_error("tika exploded"))),
            vec![mock_provider(backend)],
            test_config(),
        )
        .unwrap();

        let writer = Arc::new(MockBookWriter::new());
        manager
            .scan(root.to_str().unwrap(), false, writer.clone())
            .await;
        manager.shutdown().await;

        let written = writer.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].error_message, "no texts extracted");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_provider_latches_and_annotates() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical(&dir);
        touch(&root, "a.pdf");

        let backend = MockProviderBackend::with_responses(
            "mock",
            vec![Err(AppError::RateLimitExceeded)],
        );
        let provider = Arc::new(RateLimitedProvider::new(backend.clone(), 1));
        let mut manager = BookManager::new(
            as_extractors(&Arc::new(MockExtractor::new(GHOST_TEXT))),
            vec![provider.clone() as Arc<dyn Provider>],
            test_config(),
        )
        .unwrap();

        let writer = Arc::new(MockBookWriter::new());
        manager
            .scan(root.to_str().unwrap(), false, writer.clone())
            .await;
        manager.shutdown().await;

        assert!(provider.disabled());
        let written = writer.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].error_message, NO_RESULTS_FOUND);
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn empty_provider_live_set_halts_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical(&dir);
        touch(&root, "a.pdf");
        touch(&root, "b.pdf");

        let backend = MockProviderBackend::new("mock");
        backend.set_healthy(false);

        let extractor =
            Arc::new(MockExtractor::new(GHOST_TEXT).with_delay(Duration::from_millis(1500)));
        let mut config = test_config();
        config.probe_interval = Duration::from_millis(50);

        let mut manager = BookManager::new(
            as_extractors(&extractor),
            vec![mock_provider(backend)],
            config,
        )
        .unwrap();

        let writer = Arc::new(MockBookWriter::new());
        let started = std::time::Instant::now();
        manager
            .scan(root.to_str().unwrap(), false, writer.clone())
            .await;
        manager.shutdown().await;

        // Halted once the provider was probed out, well before both books
        // could have finished.
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(writer.is_closed());
        assert!(manager.processed_count().await < 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_is_replayed_and_retry_reprocesses_failures() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical(&dir);
        let a_path = touch(&root, "a.pdf");
        let b_path = touch(&root, "b.pdf");

        let mut cached = HashMap::new();
        cached.insert(a_path.clone(), {
            let mut book = Book::at_path(&a_path);
            book.error_message = "x".into();
            book
        });
        cached.insert(b_path.clone(), {
            let mut book = Book::at_path(&b_path);
            book.title = "B".into();
            book
        });
        let cache_file = root.join("previous.json");
        std::fs::write(&cache_file, serde_json::to_vec(&cached).unwrap()).unwrap();

        let backend = MockProviderBackend::new("mock");
        let mut manager = BookManager::new(
            as_extractors(&Arc::new(MockExtractor::new(GHOST_TEXT))),
            vec![mock_provider(backend)],
            test_config(),
        )
        .unwrap();

        manager
            .import(cache_file.to_str().unwrap(), true)
            .await
            .unwrap();
        assert_eq!(manager.processed_count().await, 1);

        let writer = Arc::new(MockBookWriter::new());
        manager
            .scan(root.to_str().unwrap(), false, writer.clone())
            .await;
        manager.shutdown().await;

        let written = writer.written();
        // b replayed from the cache, a re-processed from scratch.
        assert_eq!(written.len(), 2);
        let a = written.iter().find(|b| b.filepath == a_path).unwrap();
        assert!(a.error_message.is_empty());
        assert_eq!(a.isbn13.as_ref().unwrap().as_str(), "9781718501263");
        let b = written.iter().find(|b| b.filepath == b_path).unwrap();
        assert_eq!(b.title, "B");
        assert_eq!(manager.processed_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn without_retry_cached_failures_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical(&dir);
        let a_path = touch(&root, "a.pdf");

        let mut cached = HashMap::new();
        cached.insert(a_path.clone(), {
            let mut book = Book::at_path(&a_path);
            book.error_message = "x".into();
            book
        });
        let cache_file = root.join("previous.json");
        std::fs::write(&cache_file, serde_json::to_vec(&cached).unwrap()).unwrap();

        let extractor = Arc::new(MockExtractor::new(GHOST_TEXT));
        let backend = MockProviderBackend::new("mock");
        let mut manager = BookManager::new(
            as_extractors(&extractor),
            vec![mock_provider(backend)],
            test_config(),
        )
        .unwrap();

        manager
            .import(cache_file.to_str().unwrap(), false)
            .await
            .unwrap();

        let writer = Arc::new(MockBookWriter::new());
        manager
            .scan(root.to_str().unwrap(), false, writer.clone())
            .await;
        manager.shutdown().await;

        // The errored entry is replayed as-is and never re-extracted.
        assert_eq!(writer.written().len(), 1);
        assert_eq!(writer.written()[0].error_message, "x");
        assert!(extractor.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_finish_is_discarded() {
        let backend = MockProviderBackend::new("mock");
        let manager = BookManager::new(
            as_extractors(&Arc::new(MockExtractor::new(GHOST_TEXT))),
            vec![mock_provider(backend)],
            test_config(),
        )
        .unwrap();

        let writer = Arc::new(MockBookWriter::new());
        *manager.state.writer.lock().await = Some(writer.clone());

        let book = Book::at_path("/books/a.pdf");
        manager.state.finish_book(book.clone()).await;
        manager.state.finish_book(book).await;

        assert_eq!(writer.written().len(), 1);
        assert_eq!(manager.state.processed_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_extracts_but_never_searches() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical(&dir);
        touch(&root, "a.pdf");

        let extractor = Arc::new(MockExtractor::new(GHOST_TEXT));
        let backend = MockProviderBackend::new("mock");
        let mut manager = BookManager::new(
            as_extractors(&extractor),
            vec![mock_provider(backend.clone())],
            test_config(),
        )
        .unwrap();

        let writer = Arc::new(MockBookWriter::new());
        manager
            .scan(root.to_str().unwrap(), true, writer.clone())
            .await;
        manager.shutdown().await;

        assert_eq!(extractor.calls().len(), 1);
        assert!(backend.calls().is_empty());
        assert!(writer.written().is_empty());
        assert!(writer.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn unaccepted_extensions_and_symlink_free_dirs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical(&dir);
        touch(&root, "notes.xyz");
        touch(&root, "README");

        let backend = MockProviderBackend::new("mock");
        let extractor = Arc::new(MockExtractor::new(GHOST_TEXT));
        let mut manager = BookManager::new(
            as_extractors(&extractor),
            vec![mock_provider(backend)],
            test_config(),
        )
        .unwrap();

        let writer = Arc::new(MockBookWriter::new());
        manager
            .scan(root.to_str().unwrap(), false, writer.clone())
            .await;
        manager.shutdown().await;

        assert!(extractor.calls().is_empty());
        assert!(writer.written().is_empty());
    }

    #[tokio::test]
    async fn missing_scan_path_aborts_before_touching_the_writer() {
        let backend = MockProviderBackend::new("mock");
        let mut manager = BookManager::new(
            as_extractors(&Arc::new(MockExtractor::new(GHOST_TEXT))),
            vec![mock_provider(backend)],
            test_config(),
        )
        .unwrap();

        let writer = Arc::new(MockBookWriter::new());
        manager
            .scan("/definitely/not/a/real/path", false, writer.clone())
            .await;
        manager.shutdown().await;

        assert!(writer.written().is_empty());
        assert!(!writer.is_closed());
    }

    #[tokio::test]
    async fn import_fails_on_missing_cache() {
        let backend = MockProviderBackend::new("mock");
        let manager = BookManager::new(
            as_extractors(&Arc::new(MockExtractor::new(GHOST_TEXT))),
            vec![mock_provider(backend)],
            test_config(),
        )
        .unwrap();

        assert!(manager.import("/no/such/cache.json", false).await.is_err());
    }
}
