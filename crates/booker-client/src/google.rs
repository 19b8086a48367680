use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use booker_core::book::{BookResult, Isbn10, Isbn13};
use booker_core::error::AppError;
use booker_core::traits::ProviderBackend;
use booker_core::util::levenshtein;

/// Google Books volumes backend.
///
/// Answers one ISBN at a time; the rate limiter, memo, and self-disable
/// latch all live in the wrapper that owns this backend. When a query
/// returns several volumes, the one whose title is closest (by edit
/// distance) to the file's basename wins.
pub struct GoogleBooks {
    client: Client,
    url: String,
    api_key: String,
}

impl GoogleBooks {
    pub fn new(url: &str, api_key: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!("booker/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("https://{url}"),
            api_key: api_key.to_string(),
        })
    }
}

// ---- volumes API types ----

#[derive(Deserialize)]
struct VolumesResponse {
    #[serde(rename = "totalItems", default)]
    total_items: i64,
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Deserialize)]
struct Volume {
    #[serde(rename = "volumeInfo", default)]
    volume_info: VolumeInfo,
}

#[derive(Deserialize, Default)]
struct VolumeInfo {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(rename = "industryIdentifiers", default)]
    industry_identifiers: Vec<IndustryIdentifier>,
    #[serde(rename = "publishedDate", default)]
    published_date: String,
}

#[derive(Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

/// The volume whose title is the smallest edit distance from the file's
/// basename; ties go to the first occurrence.
fn best_volume<'a>(items: &'a [Volume], filename: &str) -> Option<&'a Volume> {
    let mut best: Option<&Volume> = None;
    let mut best_distance = usize::MAX;

    for item in items {
        let distance = levenshtein(&item.volume_info.title, filename);
        if distance < best_distance {
            best_distance = distance;
            best = Some(item);
        }
    }

    best
}

fn volume_to_result(volume: &Volume, filepath: &str) -> BookResult {
    let info = &volume.volume_info;

    let mut isbn10 = None;
    let mut isbn13 = None;
    let mut uom = None;
    for identifier in &info.industry_identifiers {
        match identifier.kind.to_lowercase().as_str() {
            "isbn_10" => isbn10 = Some(Isbn10::new(identifier.identifier.clone())),
            "isbn_13" => isbn13 = Some(Isbn13::new(identifier.identifier.clone())),
            "uom" => uom = Some(identifier.identifier.clone()),
            "other" => {}
            kind => {
                tracing::info!(kind, identifier = %identifier.identifier, "google returned unsupported identifier type");
            }
        }
    }

    BookResult {
        filepath: filepath.to_string(),
        title: Some(info.title.clone()),
        authors: Some(info.authors.clone()),
        isbn10,
        isbn13,
        uom,
        low_year: None,
        high_year: None,
        publish_date: Some(info.published_date.clone()),
        confidence: 100.0,
        source_provider_name: "google".to_string(),
    }
}

#[async_trait]
impl ProviderBackend for GoogleBooks {
    fn name(&self) -> &str {
        "Google"
    }

    async fn find_result(&self, isbn: &str, filepath: &str) -> Result<BookResult, AppError> {
        let mut query_url = format!("{}?q=isbn:{}", self.url, isbn);
        if !self.api_key.is_empty() {
            query_url.push_str("&key=");
            query_url.push_str(&self.api_key);
        }

        let response = self.client.get(&query_url).send().await.map_err(|err| {
            if err.is_timeout() {
                AppError::Timeout(30)
            } else {
                AppError::Http(err.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::RateLimitExceeded);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider {
                message: body,
                status_code: status.as_u16(),
            });
        }

        let volumes: VolumesResponse = response.json().await.map_err(|err| {
            AppError::Http(format!("failed to decode google response: {err}"))
        })?;

        if volumes.total_items == 0 {
            return Ok(BookResult::default());
        }

        let filename = Path::new(filepath)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Some(best) = best_volume(&volumes.items, &filename) else {
            return Err(AppError::Provider {
                message: "unable to identify a good match from multiple returned works".into(),
                status_code: status.as_u16(),
            });
        };

        Ok(volume_to_result(best, filepath))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOLUMES_JSON: &str = r#"{
        "totalItems": 2,
        "items": [
            {
                "volumeInfo": {
                    "title": "A Totally Different Novel",
                    "authors": ["Somebody Else"],
                    "industryIdentifiers": [
                        {"type": "ISBN_13", "identifier": "9780000000001"}
                    ],
                    "publishedDate": "1999"
                }
            },
            {
                "volumeInfo": {
                    "title": "How to Hack Like a Ghost",
                    "authors": ["Sparc Flow"],
                    "industryIdentifiers": [
                        {"type": "ISBN_10", "identifier": "1718501269"},
                        {"type": "ISBN_13", "identifier": "9781718501263"},
                        {"type": "OTHER", "identifier": "ignored"}
                    ],
                    "publishedDate": "2021-05-04"
                }
            }
        ]
    }"#;

    #[test]
    fn volumes_response_decodes() {
        let volumes: VolumesResponse = serde_json::from_str(VOLUMES_JSON).unwrap();
        assert_eq!(volumes.total_items, 2);
        assert_eq!(volumes.items.len(), 2);
        assert_eq!(
            volumes.items[1].volume_info.title,
            "How to Hack Like a Ghost"
        );
    }

    #[test]
    fn missing_fields_default() {
        let volumes: VolumesResponse =
            serde_json::from_str(r#"{"totalItems": 0}"#).unwrap();
        assert_eq!(volumes.total_items, 0);
        assert!(volumes.items.is_empty());
    }

    #[test]
    fn closest_title_to_filename_wins() {
        let volumes: VolumesResponse = serde_json::from_str(VOLUMES_JSON).unwrap();
        let best = best_volume(&volumes.items, "How to Hack Like a Ghost.pdf").unwrap();
        assert_eq!(best.volume_info.title, "How to Hack Like a Ghost");
    }

    #[test]
    fn no_items_yields_no_best_volume() {
        assert!(best_volume(&[], "anything.pdf").is_none());
    }

    #[test]
    fn identifiers_map_into_the_result() {
        let volumes: VolumesResponse = serde_json::from_str(VOLUMES_JSON).unwrap();
        let result = volume_to_result(&volumes.items[1], "/books/ghost.pdf");

        assert_eq!(result.filepath, "/books/ghost.pdf");
        assert_eq!(result.isbn10.as_ref().unwrap().as_str(), "1718501269");
        assert_eq!(result.isbn13.as_ref().unwrap().as_str(), "9781718501263");
        assert!(result.uom.is_none());
        assert_eq!(result.publish_date.as_deref(), Some("2021-05-04"));
        assert_eq!(result.confidence, 100.0);
        assert_eq!(result.source_provider_name, "google");
    }
}
