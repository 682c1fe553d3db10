//! Decides which highlights were already imported.
//!
//! Two strategies, chosen once when the index is loaded:
//!
//! | Mode | Selected when | Known means |
//! |------|---------------|-------------|
//! | [`AuthoritativeIndex`] | `.imported_bookmarks.json` exists and parses | the id is in the file |
//! | [`ScannedFallbackIndex`] | the file is missing or corrupt | the normalized text is quoted in the book's document (looked up by its exact file name) |
//!
//! Persisting always writes the id file, so a fallback run bootstraps the
//! authoritative index for the next one.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::INDEX_FILE_NAME;
use crate::error::{HighlightsError, Result};
use crate::markdown::{extract_blocks, normalize_text};
use crate::models::Highlight;
use crate::store::{document_file_name, write_atomic, DocumentStore};

/// On-disk shape of the id index.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    imported_bookmark_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Authoritative,
    ScannedFallback,
}

/// Ids read from (and written back to) the index file.
#[derive(Debug)]
pub struct AuthoritativeIndex {
    path: PathBuf,
    ids: BTreeSet<String>,
    dirty: bool,
}

/// Novelty reconstructed from the quotes in existing documents.
#[derive(Debug)]
pub struct ScannedFallbackIndex {
    path: PathBuf,
    /// Document file name -> normalized text of each quoted block.
    documents: HashMap<String, HashSet<String>>,
    /// Ids found in documents or imported during this run.
    ids: BTreeSet<String>,
    /// Set when the index file exists but could not be parsed.
    corrupt: bool,
}

#[derive(Debug)]
pub enum NoveltyIndex {
    Authoritative(AuthoritativeIndex),
    ScannedFallback(ScannedFallbackIndex),
}

impl NoveltyIndex {
    /// Load the index for a store. Never fails: a corrupt or unreadable index
    /// file is logged and replaced by a document scan.
    pub fn load(store: &DocumentStore) -> Self {
        let path = store.target_dir().join(INDEX_FILE_NAME);
        match read_index_file(&path) {
            Ok(Some(ids)) => {
                tracing::debug!(path = %path.display(), ids = ids.len(), "using imported-id index");
                NoveltyIndex::Authoritative(AuthoritativeIndex {
                    path,
                    ids,
                    dirty: false,
                })
            }
            Ok(None) => {
                tracing::info!(path = %path.display(), "no imported-id index, scanning documents");
                NoveltyIndex::ScannedFallback(ScannedFallbackIndex::scan(store, path, false))
            }
            Err(e) => {
                tracing::warn!(error = %e, "falling back to scanning documents");
                NoveltyIndex::ScannedFallback(ScannedFallbackIndex::scan(store, path, true))
            }
        }
    }

    pub fn mode(&self) -> IndexMode {
        match self {
            NoveltyIndex::Authoritative(_) => IndexMode::Authoritative,
            NoveltyIndex::ScannedFallback(_) => IndexMode::ScannedFallback,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            NoveltyIndex::Authoritative(index) => &index.path,
            NoveltyIndex::ScannedFallback(index) => &index.path,
        }
    }

    /// Number of ids that would be written by [`persist`](Self::persist).
    pub fn len(&self) -> usize {
        match self {
            NoveltyIndex::Authoritative(index) => index.ids.len(),
            NoveltyIndex::ScannedFallback(index) => index.ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_known(&self, highlight: &Highlight) -> bool {
        match self {
            NoveltyIndex::Authoritative(index) => index.ids.contains(&highlight.id),
            NoveltyIndex::ScannedFallback(index) => {
                index.ids.contains(&highlight.id) || index.text_is_exported(highlight)
            }
        }
    }

    /// Record the ids of highlights whose text is already in the documents.
    ///
    /// Only meaningful in fallback mode, where it seeds the id set that the
    /// next [`persist`](Self::persist) writes. Returns how many were adopted.
    pub fn adopt_matches(&mut self, highlights: &[Highlight]) -> usize {
        match self {
            NoveltyIndex::Authoritative(_) => 0,
            NoveltyIndex::ScannedFallback(index) => {
                let matched: Vec<String> = highlights
                    .iter()
                    .filter(|h| index.text_is_exported(h))
                    .map(|h| h.id.clone())
                    .collect();
                let before = index.ids.len();
                index.ids.extend(matched);
                index.ids.len() - before
            }
        }
    }

    /// Mark highlights as imported. Safe to call repeatedly with overlapping
    /// input.
    pub fn mark_imported(&mut self, highlights: &[Highlight]) {
        match self {
            NoveltyIndex::Authoritative(index) => {
                for h in highlights {
                    if index.ids.insert(h.id.clone()) {
                        index.dirty = true;
                    }
                }
            }
            NoveltyIndex::ScannedFallback(index) => {
                for h in highlights {
                    index.ids.insert(h.id.clone());
                    index
                        .documents
                        .entry(document_file_name(&h.book_key()))
                        .or_default()
                        .insert(normalize_text(&h.text));
                }
            }
        }
    }

    /// Whether [`persist`](Self::persist) has anything to write.
    pub fn needs_persist(&self) -> bool {
        match self {
            NoveltyIndex::Authoritative(index) => index.dirty,
            NoveltyIndex::ScannedFallback(_) => true,
        }
    }

    /// Write the id set atomically. A corrupt index file found at load time
    /// is kept next to the new one with a `.corrupt` suffix.
    pub fn persist(&mut self) -> Result<()> {
        let path = self.path().to_path_buf();
        let write_failed = |source: std::io::Error| HighlightsError::IndexWriteFailed {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_failed)?;
        }

        if let NoveltyIndex::ScannedFallback(index) = self {
            if index.corrupt && path.exists() {
                let backup = path.with_file_name(format!("{}.corrupt", INDEX_FILE_NAME));
                std::fs::rename(&path, &backup).map_err(write_failed)?;
                tracing::warn!(backup = %backup.display(), "kept corrupt imported-id index");
                index.corrupt = false;
            }
        }

        let file = IndexFile {
            imported_bookmark_ids: match self {
                NoveltyIndex::Authoritative(index) => index.ids.iter().cloned().collect(),
                NoveltyIndex::ScannedFallback(index) => index.ids.iter().cloned().collect(),
            },
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| write_failed(std::io::Error::other(e)))?;
        write_atomic(&path, json.as_bytes()).map_err(write_failed)?;

        if let NoveltyIndex::Authoritative(index) = self {
            index.dirty = false;
        }
        tracing::debug!(path = %path.display(), ids = file.imported_bookmark_ids.len(), "imported-id index written");
        Ok(())
    }
}

impl ScannedFallbackIndex {
    fn scan(store: &DocumentStore, path: PathBuf, corrupt: bool) -> Self {
        let mut documents = HashMap::new();
        let root = store.target_dir();

        let matcher = match document_matcher() {
            Ok(matcher) => Some(matcher),
            Err(e) => {
                tracing::warn!(error = %e, "cannot match document names, skipping scan");
                None
            }
        };

        if let (true, Some(matcher)) = (root.is_dir(), matcher) {
            for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping unreadable entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if !matcher.is_match(&name) {
                    continue;
                }
                match std::fs::read_to_string(entry.path()) {
                    Ok(content) => {
                        let texts: HashSet<String> = extract_blocks(&content)
                            .iter()
                            .map(|b| b.plain_text())
                            .collect();
                        documents.insert(name, texts);
                    }
                    Err(e) => {
                        tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable document");
                    }
                }
            }
        }

        tracing::debug!(documents = documents.len(), "scanned existing documents");
        Self {
            path,
            documents,
            ids: BTreeSet::new(),
            corrupt,
        }
    }

    fn text_is_exported(&self, highlight: &Highlight) -> bool {
        self.documents
            .get(&document_file_name(&highlight.book_key()))
            .is_some_and(|texts| texts.contains(&normalize_text(&highlight.text)))
    }
}

/// Candidate documents. Lookups go through [`document_file_name`], so a
/// shortened or unusual name is still found.
fn document_matcher() -> std::result::Result<GlobMatcher, globset::Error> {
    Ok(Glob::new("*.md")?.compile_matcher())
}

/// `Ok(None)` when the file does not exist.
fn read_index_file(path: &Path) -> Result<Option<BTreeSet<String>>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(HighlightsError::index_corrupt(path, e)),
    };
    let file: IndexFile =
        serde_json::from_str(&content).map_err(|e| HighlightsError::index_corrupt(path, e))?;
    Ok(Some(file.imported_bookmark_ids.into_iter().collect()))
}
