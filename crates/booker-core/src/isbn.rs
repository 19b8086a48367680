//! Regex-based ISBN extraction from free text.
//!
//! The patterns deliberately over-match (any run of digits, hyphens, and
//! whitespace): matches are then stripped, upper-cased, and filtered down
//! to checksum-valid candidates. Duplicates are kept and match order is
//! preserved, so a caller sees ISBNs in the order they occur in the text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::book::{self, Isbn10, Isbn13};

pub const ISBN10_PATTERN: &str = r"[0-9\-\s]+[0-9Xx]";
pub const ISBN13_PATTERN: &str = r"[0-9\-\s]+[0-9]";

static ISBN10_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(ISBN10_PATTERN).expect("ISBN-10 pattern is valid"));
static ISBN13_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(ISBN13_PATTERN).expect("ISBN-13 pattern is valid"));
static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\-]+").expect("separator pattern is valid"));

fn identify_candidates(text: &str, pattern: &Regex) -> Vec<String> {
    pattern
        .find_iter(text)
        .filter_map(|occurrence| {
            let clean = SEPARATORS.replace_all(occurrence.as_str(), "");
            if book::is_isbn_candidate(&clean) {
                Some(clean.to_uppercase())
            } else {
                None
            }
        })
        .collect()
}

/// All checksum-valid ISBN-10s in the text, in match order.
pub fn identify_isbn10s(text: &str) -> Vec<Isbn10> {
    identify_candidates(text, &ISBN10_RE)
        .into_iter()
        .map(Isbn10::new)
        .filter(Isbn10::is_valid)
        .collect()
}

/// All checksum-valid ISBN-13s in the text, in match order.
pub fn identify_isbn13s(text: &str) -> Vec<Isbn13> {
    identify_candidates(text, &ISBN13_RE)
        .into_iter()
        .map(Isbn13::new)
        .filter(Isbn13::is_valid)
        .collect()
}
