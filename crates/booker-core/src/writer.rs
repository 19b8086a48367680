//! Append-as-you-go JSON object writer.
//!
//! Produces a single top-level JSON object, one `"key": value` entry per
//! finished book, flushed after every write so the file stays inspectable
//! (missing only the closing brace) if the run dies. A dedicated consumer
//! task drains a bounded input channel; when the channel backs up past a
//! small threshold the pending items are written as one batch under a
//! single lock acquisition.
//!
//! A write error mid-run panics the consumer task on purpose, and `close`
//! re-raises that panic. Close-path errors are only logged.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::book::Book;
use crate::error::AppError;

const INPUT_CAPACITY: usize = 10_000;
const BATCH_THRESHOLD: usize = 10;

/// One entry of the output object. `data` is written verbatim; the caller
/// is responsible for it being valid JSON.
#[derive(Debug, Clone)]
pub struct JsonStreamWriterItem {
    pub key: String,
    pub data: Vec<u8>,
}

/// Sink for finished books, so the orchestrator can be tested without a
/// real output file.
#[async_trait]
pub trait BookWriter: Send + Sync {
    async fn write_book(&self, book: &Book);
    async fn close(&self);
}

struct WriterFile {
    file: std::fs::File,
    initialized: bool,
}

impl WriterFile {
    fn write_item(&mut self, key: &str, data: &[u8]) -> std::io::Result<()> {
        let mut entry = Vec::with_capacity(key.len() + data.len() + 6);
        if self.initialized {
            entry.push(b',');
        }
        entry.push(b'"');
        entry.extend_from_slice(key.replace('"', "").as_bytes());
        entry.extend_from_slice(b"\": ");
        entry.extend_from_slice(data);
        self.initialized = true;

        self.file.write_all(&entry)
    }
}

pub struct JsonStreamWriter {
    path: PathBuf,
    input: tokio::sync::Mutex<Option<mpsc::Sender<JsonStreamWriterItem>>>,
    file: Arc<Mutex<WriterFile>>,
    consumer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl JsonStreamWriter {
    /// Opens (truncating) the output file, writes the opening brace, and
    /// starts the consumer task.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.write_all(b"{")?;
        file.sync_all()?;

        let (tx, rx) = mpsc::channel(INPUT_CAPACITY);
        let shared = Arc::new(Mutex::new(WriterFile {
            file,
            initialized: false,
        }));
        let consumer = tokio::spawn(consume(rx, shared.clone()));

        Ok(Self {
            path,
            input: tokio::sync::Mutex::new(Some(tx)),
            file: shared,
            consumer: tokio::sync::Mutex::new(Some(consumer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queues one entry for the consumer task. Applies backpressure when
    /// the channel is full.
    pub async fn write_item(&self, item: JsonStreamWriterItem) {
        match self.input.lock().await.as_ref() {
            Some(tx) => {
                if tx.send(item).await.is_err() {
                    tracing::warn!("json stream writer input is gone, dropping item");
                }
            }
            None => tracing::warn!("json stream writer is closed, dropping item"),
        }
    }

    /// Closes the input, drains the consumer, writes the closing brace.
    pub async fn close(&self) {
        let Some(tx) = self.input.lock().await.take() else {
            return;
        };
        drop(tx);

        let consumer = self.consumer.lock().await.take();
        if let Some(handle) = consumer {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    std::panic::resume_unwind(err.into_panic());
                }
            }
        }

        let mut guard = lock_file(&self.file);
        if let Err(err) = guard.file.write_all(b"}") {
            tracing::error!(%err, "failed to write closing bracket");
            return;
        }
        if let Err(err) = guard.file.sync_all() {
            tracing::error!(%err, "failed to sync, bracket might not be committed to file");
        }
    }
}

#[async_trait]
impl BookWriter for JsonStreamWriter {
    async fn write_book(&self, book: &Book) {
        match serde_json::to_vec(book) {
            Ok(data) => {
                self.write_item(JsonStreamWriterItem {
                    key: book.filepath.clone(),
                    data,
                })
                .await;
            }
            Err(err) => {
                tracing::warn!(%err, "could not write book to json stream because serialization failed");
            }
        }
    }

    async fn close(&self) {
        JsonStreamWriter::close(self).await;
    }
}

fn lock_file(file: &Arc<Mutex<WriterFile>>) -> MutexGuard<'_, WriterFile> {
    file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn consume(
    mut input: mpsc::Receiver<JsonStreamWriterItem>,
    file: Arc<Mutex<WriterFile>>,
) {
    while let Some(item) = input.recv().await {
        let depth = input.len();
        if depth >= BATCH_THRESHOLD {
            // Drain exactly the items already queued and write them all
            // under one lock acquisition.
            let mut batch = Vec::with_capacity(depth + 1);
            batch.push(item);
            for _ in 0..depth {
                match input.try_recv() {
                    Ok(item) => batch.push(item),
                    Err(_) => break,
                }
            }
            write_batch(&file, &batch);
        } else {
            write_batch(&file, std::slice::from_ref(&item));
        }
    }
}

fn write_batch(file: &Arc<Mutex<WriterFile>>, items: &[JsonStreamWriterItem]) {
    let mut guard = lock_file(file);
    for item in items {
        if let Err(err) = guard.write_item(&item.key, &item.data) {
            panic!("json stream writer: write failed: {err}");
        }
    }
    if let Err(err) = guard.file.sync_all() {
        panic!("json stream writer: sync failed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn empty_stream_produces_an_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");

        let writer = JsonStreamWriter::create(&path).unwrap();
        writer.close().await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{}");
    }

    #[tokio::test]
    async fn entries_accumulate_into_a_parseable_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");

        let writer = JsonStreamWriter::create(&path).unwrap();
        for i in 0..25 {
            let book = Book {
                title: format!("Book {i}"),
                filepath: format!("/books/{i}.pdf"),
                ..Default::default()
            };
            writer.write_book(&book).await;
        }
        writer.close().await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(&contents).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 25);
        assert_eq!(object["/books/7.pdf"]["title"], "Book 7");
    }

    #[tokio::test]
    async fn file_is_inspectable_before_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");

        let writer = JsonStreamWriter::create(&path).unwrap();
        writer.write_book(&Book::at_path("/books/a.pdf")).await;
        // Give the consumer a turn to flush.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("{\"/books/a.pdf\": "));
        // The closing brace only arrives on clean shutdown.
        assert!(serde_json::from_str::<Value>(&contents).is_err());

        writer.close().await;
    }

    #[tokio::test]
    async fn quotes_are_stripped_from_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");

        let writer = JsonStreamWriter::create(&path).unwrap();
        writer
            .write_item(JsonStreamWriterItem {
                key: "/books/\"odd\".pdf".into(),
                data: b"{}".to_vec(),
            })
            .await;
        writer.close().await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{\"/books/odd.pdf\": {}}");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");

        let writer = JsonStreamWriter::create(&path).unwrap();
        writer.close().await;
        writer.close().await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{}");
    }

    #[tokio::test]
    async fn writes_after_close_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");

        let writer = JsonStreamWriter::create(&path).unwrap();
        writer.close().await;
        writer.write_book(&Book::at_path("/books/late.pdf")).await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn backlog_is_flushed_through_the_batch_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");

        let writer = JsonStreamWriter::create(&path).unwrap();

        // Hold the file lock so items pile up past the batch threshold.
        {
            let guard = lock_file(&writer.file);
            for i in 0..30 {
                writer
                    .write_item(JsonStreamWriterItem {
                        key: format!("/books/{i}.pdf"),
                        data: b"{}".to_vec(),
                    })
                    .await;
            }
            drop(guard);
        }

        writer.close().await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 30);
    }
}
