//! Per-book Markdown document store.
//!
//! One file per [`BookKey`] inside the target directory, named
//! `<title> - <authors>.md`. Appends are all-or-nothing: the new contents are
//! written to a hidden sibling file and renamed over the document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{HighlightsError, Result};
use crate::markdown::{compose_document, extract_blocks, RawBlock};
use crate::models::BookKey;

pub const DOCUMENT_EXTENSION: &str = "md";

/// Longest file name most filesystems accept, in bytes.
const MAX_FILE_NAME_BYTES: usize = 255;

/// Stem budget: room for `.md` and the `.<name>.tmp` wrapping used by
/// [`write_atomic`].
const MAX_STEM_BYTES: usize = MAX_FILE_NAME_BYTES - ".md".len() - "..tmp".len();

#[derive(Debug, Clone)]
pub struct DocumentStore {
    target_dir: PathBuf,
}

impl DocumentStore {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
        }
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    pub fn document_path(&self, book: &BookKey) -> PathBuf {
        self.target_dir.join(document_file_name(book))
    }

    /// Blocks of the book's document; empty if the document does not exist.
    pub fn read_existing(&self, book: &BookKey) -> Result<Vec<RawBlock>> {
        let path = self.document_path(book);
        let content = read_optional(&path).map_err(|source| HighlightsError::DocumentReadFailed {
            book: book.clone(),
            path: path.clone(),
            source,
        })?;
        Ok(content.map(|c| extract_blocks(&c)).unwrap_or_default())
    }

    /// Append rendered blocks to the book's document, creating it if needed.
    ///
    /// Either every block lands in the document or the document is left
    /// untouched. Returns the document path.
    pub fn append(&self, book: &BookKey, blocks: &[String]) -> Result<PathBuf> {
        let path = self.document_path(book);
        if blocks.is_empty() {
            return Ok(path);
        }

        let write_failed = |source: std::io::Error| HighlightsError::DocumentWriteFailed {
            book: book.clone(),
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.target_dir).map_err(write_failed)?;
        let existing = read_optional(&path).map_err(write_failed)?;
        let content = compose_document(existing.as_deref().unwrap_or(""), blocks);
        write_atomic(&path, content.as_bytes()).map_err(write_failed)?;

        tracing::debug!(book = %book, path = %path.display(), blocks = blocks.len(), "document updated");
        Ok(path)
    }
}

/// Deterministic, filesystem-safe file name for a book.
///
/// Long names are cut on a character boundary so the name and its temp
/// sibling stay within 255 bytes.
pub fn document_file_name(book: &BookKey) -> String {
    let stem = sanitize_file_stem(&format!("{} - {}", book.title, book.authors));
    format!("{}.{}", stem, DOCUMENT_EXTENSION)
}

fn sanitize_file_stem(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let is_trimmed = |c: char| c.is_whitespace() || c == '.';
    let trimmed = truncate_to_bytes(replaced.trim_matches(is_trimmed), MAX_STEM_BYTES)
        .trim_end_matches(is_trimmed);
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

fn truncate_to_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn read_optional(path: &Path) -> std::io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write bytes atomically (write to a hidden temp sibling, sync, rename).
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_example() {
        let key = BookKey::new("Dune", "Frank Herbert");
        assert_eq!(document_file_name(&key), "Dune - Frank Herbert.md");
    }

    #[test]
    fn test_file_name_sanitized() {
        let key = BookKey::new("What If?: Serious/Absurd", "Randall <xkcd> Munroe");
        assert_eq!(
            document_file_name(&key),
            "What If__ Serious_Absurd - Randall _xkcd_ Munroe.md"
        );
        let key = BookKey::new("..", "");
        assert_eq!(document_file_name(&key), "- Unknown.md");
        let key = BookKey::new("  \n ", "");
        assert_eq!(document_file_name(&key), "Untitled - Unknown.md");
    }

    #[test]
    fn test_file_name_capped_on_char_boundary() {
        let key = BookKey::new(&"砂の惑星".repeat(40), "フランク・ハーバート");
        let name = document_file_name(&key);
        assert!(name.len() <= MAX_STEM_BYTES + ".md".len());
        assert!(name.ends_with(".md"));
        assert!(name.starts_with("砂の惑星砂の惑星"));
        assert_eq!(name, document_file_name(&key));

        let key = BookKey::new(&"A Very Long Title ".repeat(15), "Someone");
        assert!(!document_file_name(&key).contains(" .md"));
    }

    #[test]
    fn test_append_with_long_multibyte_title() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::new(tmp.path());
        let key = BookKey::new(&"砂の惑星".repeat(40), "フランク・ハーバート");

        let path = store.append(&key, &["> 恐怖は心を殺すもの。".to_string()]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "> 恐怖は心を殺すもの。\n");
        assert_eq!(store.read_existing(&key).unwrap().len(), 1);
    }

    #[test]
    fn test_sanitize_empty_is_untitled() {
        assert_eq!(sanitize_file_stem(" . "), "untitled");
    }

    #[test]
    fn test_read_existing_missing_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::new(tmp.path());
        let blocks = store.read_existing(&BookKey::new("Dune", "Frank Herbert")).unwrap();
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_append_creates_directory_and_document() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::new(tmp.path().join("notes"));
        let key = BookKey::new("Dune", "Frank Herbert");

        let path = store.append(&key, &["> Fear is the mind-killer.".to_string()]).unwrap();
        assert_eq!(path, tmp.path().join("notes").join("Dune - Frank Herbert.md"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "> Fear is the mind-killer.\n");

        store.append(&key, &["> I must not fear.".to_string()]).unwrap();
        let blocks = store.read_existing(&key).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].quote, "I must not fear.");
    }

    #[test]
    fn test_append_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::new(tmp.path());
        store
            .append(&BookKey::new("Dune", "Frank Herbert"), &["> a".to_string()])
            .unwrap();
        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["Dune - Frank Herbert.md".to_string()]);
    }

    #[test]
    fn test_append_empty_batch_is_noop() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::new(tmp.path());
        let key = BookKey::new("Dune", "Frank Herbert");
        let path = store.append(&key, &[]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_append_failure_reports_book_and_keeps_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::new(tmp.path());
        let key = BookKey::new("Dune", "Frank Herbert");
        // A directory where the document should be cannot be read or replaced.
        fs::create_dir_all(store.document_path(&key)).unwrap();

        let err = store.append(&key, &["> a".to_string()]).unwrap_err();
        match err {
            HighlightsError::DocumentWriteFailed { book, path, .. } => {
                assert_eq!(book, key);
                assert_eq!(path, store.document_path(&key));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!tmp.path().join(".Dune - Frank Herbert.md.tmp").exists());
    }
}
