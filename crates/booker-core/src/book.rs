//! Book domain types: ISBN newtypes with checksum validation, the `Book`
//! output record, per-provider `BookResult` candidates, and best-result
//! selection.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Obvious placeholder strings that must never be treated as ISBNs.
const BAD_ISBNS: [&str; 11] = [
    "0123456789",
    "0000000000",
    "1111111111",
    "2222222222",
    "3333333333",
    "4444444444",
    "5555555555",
    "6666666666",
    "7777777777",
    "8888888888",
    "9999999999",
];

/// Quick syntactic filter applied before checksum validation: length 10 or
/// 13, digits only (plus `X`/`x`), and not a known placeholder.
pub fn is_isbn_candidate(s: &str) -> bool {
    let l = s.len();
    if l != 10 && l != 13 {
        return false;
    }

    for c in s.chars() {
        let c = c.to_ascii_uppercase();
        if c != 'X' && !c.is_ascii_digit() {
            return false;
        }
    }

    !BAD_ISBNS.contains(&s)
}

/// A ten-character ISBN; the final character may be `X`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Isbn10(String);

impl Isbn10 {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Weighted checksum: weights 10..1, `X` counts as 10 and is only
    /// permitted in the final position; the sum must divide by 11.
    pub fn is_valid(&self) -> bool {
        let s = self.0.as_str();
        let n = s.len();
        let mut sum: i64 = 0;

        for (i, c) in s.chars().enumerate() {
            let multiplier = 10 - i as i64;
            if c.is_ascii_digit() {
                sum += multiplier * (c as i64 - '0' as i64);
            } else if c == 'X' {
                if i != n - 1 {
                    return false;
                }
                sum += 10;
            }
        }

        sum % 11 == 0
    }
}

impl std::fmt::Display for Isbn10 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A thirteen-digit ISBN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Isbn13(String);

impl Isbn13 {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Alternating 1/3 weighted checksum; the sum must divide by 10.
    pub fn is_valid(&self) -> bool {
        let mut multiplier: u64 = 1;
        let mut sum: u64 = 0;

        for c in self.0.chars() {
            sum = sum.wrapping_add(multiplier.wrapping_mul((c as u64).wrapping_sub('0' as u64)));
            multiplier ^= 2;
        }

        sum % 10 == 0
    }
}

impl std::fmt::Display for Isbn13 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A finished book record, keyed by absolute filesystem path. This is the
/// shape written to the output stream and read back on cache import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub isbn10: Option<Isbn10>,
    #[serde(default)]
    pub isbn13: Option<Isbn13>,
    #[serde(default)]
    pub uom: Option<String>,
    #[serde(default)]
    pub low_year: Option<u32>,
    #[serde(default)]
    pub high_year: Option<u32>,
    #[serde(default)]
    pub filepath: String,
    /// Non-empty iff processing failed; `--retry` keys off this field.
    #[serde(rename = "error", default)]
    pub error_message: String,
}

impl Book {
    /// A bare book as it enters the pipeline: path only.
    pub fn at_path(path: impl Into<String>) -> Self {
        Book {
            filepath: path.into(),
            ..Default::default()
        }
    }

    /// The most specific label available for log lines.
    pub fn best_identifier(&self) -> &str {
        if let Some(isbn13) = &self.isbn13 {
            return isbn13.as_str();
        }
        if let Some(isbn10) = &self.isbn10 {
            return isbn10.as_str();
        }
        if let Some(uom) = &self.uom {
            return uom;
        }
        if !self.title.is_empty() {
            return &self.title;
        }
        &self.filepath
    }
}

/// One candidate metadata record produced by a provider for one ISBN
/// lookup. `filepath` is always the path of the originating file, never of
/// anything in the provider's response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookResult {
    pub filepath: String,
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub isbn10: Option<Isbn10>,
    pub isbn13: Option<Isbn13>,
    pub uom: Option<String>,
    pub low_year: Option<u32>,
    pub high_year: Option<u32>,
    pub publish_date: Option<String>,
    pub confidence: f64,
    pub source_provider_name: String,
}

impl BookResult {
    pub fn is_unidentified(&self) -> bool {
        self.title.is_none()
            && self.authors.is_none()
            && self.isbn10.is_none()
            && self.isbn13.is_none()
    }

    pub fn to_book(&self) -> Book {
        Book {
            title: self.title.clone().unwrap_or_default(),
            authors: self.authors.clone().unwrap_or_default(),
            isbn10: self.isbn10.clone(),
            isbn13: self.isbn13.clone(),
            uom: self.uom.clone(),
            low_year: self.low_year,
            high_year: self.high_year,
            filepath: self.filepath.clone(),
            error_message: String::new(),
        }
    }
}

/// The ISBNs found for one file, carried from the extract stage to the
/// search stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchTerms {
    pub isbn10s: Vec<Isbn10>,
    pub isbn13s: Vec<Isbn13>,
    pub filepath: String,
}

impl SearchTerms {
    pub fn has_any_terms(&self) -> bool {
        !self.isbn10s.is_empty() || !self.isbn13s.is_empty()
    }
}

/// Picks the single result with the highest finite confidence. NaN entries
/// are skipped and ties go to the first occurrence; a confidence of zero or
/// below is never chosen.
pub fn choose_best_result(results: &[BookResult]) -> Result<&BookResult, AppError> {
    if results.is_empty() {
        return Err(AppError::Generic("no results".into()));
    }

    let mut highest_confidence = 0.0_f64;
    let mut best: Option<&BookResult> = None;

    for result in results {
        if result.confidence.is_nan() {
            continue;
        }
        if result.confidence > highest_confidence {
            highest_confidence = result.confidence;
            best = Some(result);
        }
    }

    best.ok_or_else(|| AppError::Generic("no results with confidence".into()))
}
