use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use booker_core::book::Book;
use booker_core::error::AppError;
use booker_core::traits::{Extractor, Service};

/// Text extraction through an Apache Tika server.
///
/// Each call uploads the file to the server's `/tika` endpoint and keeps
/// the first `max_characters` bytes of the plain-text response. A response
/// shorter than `max_characters` is an error: the engine wants a fixed
/// window of text to scan and a short read usually means a parse problem
/// upstream.
pub struct TikaExtractor {
    client: Client,
    url: String,
}

impl TikaExtractor {
    pub fn new(host: &str, port: u16) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!("booker/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AppError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("http://{host}:{port}"),
        })
    }
}

#[async_trait]
impl Service for TikaExtractor {
    fn name(&self) -> &str {
        "Tika"
    }

    async fn self_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        let response = self
            .client
            .get(format!("{}/version", self.url))
            .send()
            .await
            .map_err(|e| AppError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Http(format!(
                "tika version endpoint returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Extractor for TikaExtractor {
    async fn extract_text(&self, book: &Book, max_characters: usize) -> Result<String, AppError> {
        let contents = tokio::fs::read(&book.filepath).await.map_err(|err| {
            AppError::Extract(format!("tika unable to open file {}: {err}", book.filepath))
        })?;

        let response = self
            .client
            .put(format!("{}/tika", self.url))
            .header(reqwest::header::ACCEPT, "text/plain")
            .body(contents)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AppError::Timeout(120)
                } else {
                    AppError::Extract(format!(
                        "tika failed to parse file {}: {err}",
                        book.filepath
                    ))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Extract(format!(
                "tika returned HTTP {} for {}",
                status.as_u16(),
                book.filepath
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| {
                AppError::Extract(format!(
                    "tika failed to read response for {}: {err}",
                    book.filepath
                ))
            })?;

        if body.len() < max_characters {
            return Err(AppError::Extract(format!(
                "tika: expected {max_characters} bytes to be read but {} were available",
                body.len()
            )));
        }

        Ok(String::from_utf8_lossy(&body[..max_characters]).into_owned())
    }

    async fn shutdown(&self) {}
}
