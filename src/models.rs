//! Core data models used throughout kobo-highlights.
//!
//! A [`Highlight`] is produced fresh by a source on every run; a [`BookKey`]
//! names the Markdown document its blocks end up in.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One passage highlighted on the ereader, plus its optional note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlight {
    /// Stable identifier assigned by the device.
    pub id: String,
    pub book_title: String,
    /// Authors joined with `", "`.
    pub book_authors: String,
    pub text: String,
    /// Empty when the highlight carries no note.
    pub annotation: String,
    /// Only used to order blocks within a book.
    pub created_at: Option<DateTime<Utc>>,
}

impl Highlight {
    pub fn book_key(&self) -> BookKey {
        BookKey::new(&self.book_title, &self.book_authors)
    }

    pub fn has_annotation(&self) -> bool {
        !self.annotation.trim().is_empty()
    }
}

/// Placeholder for books whose source gives no author.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Placeholder for books whose source gives no title.
pub const UNTITLED: &str = "Untitled";

/// Identity of a book document: trimmed title and normalized author list.
///
/// Neither part is ever empty, so every document name has the
/// `<title> - <authors>` shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BookKey {
    pub title: String,
    pub authors: String,
}

impl BookKey {
    pub fn new(title: &str, authors: &str) -> Self {
        let title = title.trim();
        let authors = join_authors(authors.split([',', ';', '&']));
        Self {
            title: if title.is_empty() { UNTITLED.to_string() } else { title.to_string() },
            authors: if authors.is_empty() { UNKNOWN_AUTHOR.to_string() } else { authors },
        }
    }
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.title, self.authors)
    }
}

/// Join author names deterministically, dropping blanks.
pub fn join_authors<'a>(authors: impl IntoIterator<Item = &'a str>) -> String {
    authors
        .into_iter()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
