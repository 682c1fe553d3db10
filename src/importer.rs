//! Import pipeline orchestration.
//!
//! Coordinates one import run: source → selection → novelty filter →
//! grouping per book → document append → index update. A book whose document
//! cannot be written is reported and skipped; its highlights stay new for the
//! next run.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use anyhow::bail;

use crate::config::Config;
use crate::error::{HighlightsError, Result};
use crate::markdown::render_block;
use crate::models::{BookKey, Highlight};
use crate::novelty::{IndexMode, NoveltyIndex};
use crate::progress::{ImportProgressEvent, ImportProgressReporter, NoProgress, ProgressMode};
use crate::source::{HighlightSource, KoboSource};
use crate::store::DocumentStore;

/// Which highlights an import run considers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    New,
    Id(String),
    Ids(Vec<String>),
    Title(String),
    Author(String),
    /// Free-form value that may be one or more ids, a title, or an author,
    /// tried in that order against the fetched highlights.
    Lookup(String),
}

impl Selector {
    /// Interpret the positional `import` argument.
    ///
    /// `new` and `all` are keywords. Anything else (one id, a comma
    /// separated list of ids, a title or an author) is resolved against the
    /// fetched highlights by [`Selector::Lookup`].
    pub fn parse(arg: &str) -> Self {
        match arg.trim() {
            "" | "new" => Selector::New,
            "all" => Selector::All,
            other => Selector::Lookup(other.to_string()),
        }
    }
}

fn split_ids(arg: &str) -> Vec<String> {
    arg.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => write!(f, "all"),
            Selector::New => write!(f, "new"),
            Selector::Id(id) => write!(f, "id {}", id),
            Selector::Ids(ids) => write!(f, "ids {}", ids.join(",")),
            Selector::Title(title) => write!(f, "title \"{}\"", title),
            Selector::Author(author) => write!(f, "author \"{}\"", author),
            Selector::Lookup(value) => write!(f, "\"{}\"", value),
        }
    }
}

/// A book whose highlights could not be written.
#[derive(Debug, Clone)]
pub struct BookFailure {
    pub book: BookKey,
    pub path: PathBuf,
    pub error: String,
    /// Highlights left unimported because of the failure.
    pub highlights: usize,
}

#[derive(Debug, Clone)]
pub struct ImportResult {
    /// Highlights written, grouped by book in document order.
    pub imported: Vec<Highlight>,
    /// Selected highlights left out because they were already imported or
    /// repeated an id.
    pub skipped: usize,
    pub failures: Vec<BookFailure>,
    /// Documents that received new blocks.
    pub documents: Vec<PathBuf>,
    pub index_mode: IndexMode,
    /// Set when the documents were written but the imported-id index could
    /// not be saved. Until it is, those highlights read as new again.
    pub index_error: Option<String>,
}

impl ImportResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.index_error.is_none()
    }
}

pub struct Importer<'a> {
    source: &'a dyn HighlightSource,
    store: &'a DocumentStore,
    progress: Box<dyn ImportProgressReporter>,
}

impl<'a> Importer<'a> {
    pub fn new(source: &'a dyn HighlightSource, store: &'a DocumentStore) -> Self {
        Self {
            source,
            store,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ImportProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub async fn import(&self, selector: &Selector) -> Result<ImportResult> {
        self.progress.report(ImportProgressEvent::Fetching {
            source: self.source.describe(),
        });
        let fetched = self.source.fetch_all().await?;
        let selected = select(&fetched, selector)?;
        let selected_count = selected.len();

        let mut index = NoveltyIndex::load(self.store);
        let adopted = index.adopt_matches(&fetched);
        if adopted > 0 {
            tracing::info!(adopted, "recorded ids of highlights already present in documents");
        }

        let fresh = drop_known(selected, &index);
        let groups = group_by_book(fresh);

        let mut result = ImportResult {
            imported: Vec::new(),
            skipped: selected_count - groups.iter().map(|(_, g)| g.len()).sum::<usize>(),
            failures: Vec::new(),
            documents: Vec::new(),
            index_mode: index.mode(),
            index_error: None,
        };

        let books = groups.len();
        self.progress.report(ImportProgressEvent::Selected {
            new: selected_count - result.skipped,
            skipped: result.skipped,
            books,
        });

        for (n, (book, highlights)) in groups.into_iter().enumerate() {
            self.progress.report(ImportProgressEvent::Writing {
                book: book.to_string(),
                n: n + 1,
                books,
                highlights: highlights.len(),
            });

            let blocks: Vec<String> = highlights.iter().map(render_block).collect();
            match self.store.append(&book, &blocks) {
                Ok(path) => {
                    index.mark_imported(&highlights);
                    tracing::info!(book = %book, count = highlights.len(), "imported highlights");
                    result.documents.push(path);
                    result.imported.extend(highlights);
                }
                Err(e) => {
                    tracing::error!(book = %book, error = %e, "failed to write document");
                    result.failures.push(BookFailure {
                        path: self.store.document_path(&book),
                        book,
                        error: e.to_string(),
                        highlights: highlights.len(),
                    });
                }
            }
        }

        self.progress.report(ImportProgressEvent::Finished {
            imported: result.imported.len(),
            failed_books: result.failures.len(),
        });

        if index.needs_persist() {
            if let Err(e) = index.persist() {
                tracing::error!(
                    error = %e,
                    documents = ?result.documents,
                    "documents were written but the imported-id index was not saved"
                );
                result.index_error = Some(e.to_string());
            }
        }

        Ok(result)
    }
}

/// Apply the selector to the fetched highlights.
pub fn select(highlights: &[Highlight], selector: &Selector) -> Result<Vec<Highlight>> {
    let selected = match selector {
        Selector::All | Selector::New => highlights.to_vec(),
        Selector::Id(id) => matching(highlights, |h| &h.id == id),
        Selector::Ids(ids) => {
            let known: HashSet<&str> = highlights.iter().map(|h| h.id.as_str()).collect();
            let missing: Vec<&str> = ids
                .iter()
                .map(String::as_str)
                .filter(|id| !known.contains(id))
                .collect();
            if !missing.is_empty() {
                return Err(HighlightsError::SelectionNotFound(format!(
                    "id(s) {}",
                    missing.join(", ")
                )));
            }
            matching(highlights, |h| ids.contains(&h.id))
        }
        Selector::Title(title) => matching(highlights, |h| h.book_title.trim() == title.trim()),
        Selector::Author(author) => matching(highlights, |h| has_author(h, author)),
        Selector::Lookup(value) => lookup(highlights, value),
    };

    if selected.is_empty() && !matches!(selector, Selector::All | Selector::New) {
        return Err(HighlightsError::SelectionNotFound(selector.to_string()));
    }
    Ok(selected)
}

/// Resolve a free-form selection: ids first, then title, then author.
fn lookup(highlights: &[Highlight], value: &str) -> Vec<Highlight> {
    let known: HashSet<&str> = highlights.iter().map(|h| h.id.as_str()).collect();
    let tokens = split_ids(value);
    if !tokens.is_empty() && tokens.iter().all(|t| known.contains(t.as_str())) {
        return matching(highlights, |h| tokens.contains(&h.id));
    }

    let by_title = matching(highlights, |h| h.book_title.trim() == value);
    if !by_title.is_empty() {
        return by_title;
    }
    matching(highlights, |h| has_author(h, value))
}

fn matching(highlights: &[Highlight], pred: impl Fn(&Highlight) -> bool) -> Vec<Highlight> {
    highlights.iter().filter(|h| pred(h)).cloned().collect()
}

fn has_author(highlight: &Highlight, author: &str) -> bool {
    let wanted = author.trim();
    highlight.book_authors == wanted
        || highlight.book_key().authors.split(", ").any(|a| a == wanted)
}

/// Drop highlights already imported and repeated ids (first occurrence wins).
fn drop_known(highlights: Vec<Highlight>, index: &NoveltyIndex) -> Vec<Highlight> {
    let mut seen = HashSet::new();
    highlights
        .into_iter()
        .filter(|h| !index.is_known(h))
        .filter(|h| seen.insert(h.id.clone()))
        .collect()
}

/// Group highlights per book, books in order of first appearance, each
/// group ordered by creation time (stable, so ties keep source order).
pub fn group_by_book(highlights: Vec<Highlight>) -> Vec<(BookKey, Vec<Highlight>)> {
    let mut positions: HashMap<BookKey, usize> = HashMap::new();
    let mut groups: Vec<(BookKey, Vec<Highlight>)> = Vec::new();

    for highlight in highlights {
        let key = highlight.book_key();
        match positions.get(&key) {
            Some(&pos) => groups[pos].1.push(highlight),
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push((key, vec![highlight]));
            }
        }
    }

    for (_, group) in groups.iter_mut() {
        group.sort_by_key(|h| h.created_at);
    }
    groups
}

/// `kh import`: run an import against the configured ereader and print a
/// summary.
pub async fn run_import(config: &Config, selector: &Selector, progress: ProgressMode) -> anyhow::Result<()> {
    let source = KoboSource::from_config(config);
    let store = DocumentStore::new(&config.target_dir);
    let importer = Importer::new(&source, &store).with_progress(progress.reporter());

    let result = importer.import(selector).await?;

    println!("import {}", selector);
    println!("  imported: {} highlights", result.imported.len());
    println!("  documents written: {}", result.documents.len());
    println!("  skipped (already imported): {}", result.skipped);
    if result.index_mode == IndexMode::ScannedFallback {
        println!("  index: rebuilt from existing documents");
    }
    for failure in &result.failures {
        println!(
            "  failed: {} ({} highlights): {}",
            failure.book, failure.highlights, failure.error
        );
    }
    if let Some(error) = &result.index_error {
        println!("  index not saved: {}", error);
        for document in &result.documents {
            println!("    written: {}", document.display());
        }
    }

    if !result.failures.is_empty() {
        bail!(
            "{} book(s) could not be written; their highlights remain new",
            result.failures.len()
        );
    }
    if result.index_error.is_some() {
        bail!("imported-id index not saved; the documents listed above would be appended again");
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn highlight(id: &str, title: &str, author: &str, minute: Option<u32>) -> Highlight {
        Highlight {
            id: id.to_string(),
            book_title: title.to_string(),
            book_authors: author.to_string(),
            text: format!("text of {}", id),
            annotation: String::new(),
            created_at: minute.map(|m| Utc.with_ymd_and_hms(2023, 1, 1, 0, m, 0).unwrap()),
        }
    }

    fn sample() -> Vec<Highlight> {
        vec![
            highlight("a", "Dune", "Frank Herbert", Some(5)),
            highlight("b", "Good Omens", "Terry Pratchett, Neil Gaiman", Some(1)),
            highlight("c", "Dune", "Frank Herbert", Some(2)),
        ]
    }

    #[test]
    fn test_lookup_title_with_commas() {
        let all = vec![highlight("g", "Guns, Germs, and Steel", "Jared Diamond", None)];
        assert_eq!(
            ids(&select(&all, &Selector::Lookup("Guns, Germs, and Steel".into())).unwrap()),
            vec!["g"]
        );
    }

    fn ids(highlights: &[Highlight]) -> Vec<&str> {
        highlights.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn test_parse_selector() {
        assert_eq!(Selector::parse("new"), Selector::New);
        assert_eq!(Selector::parse(""), Selector::New);
        assert_eq!(Selector::parse("all"), Selector::All);
        assert_eq!(Selector::parse("a, b,c"), Selector::Lookup("a, b,c".into()));
        assert_eq!(Selector::parse("Dune"), Selector::Lookup("Dune".into()));
        assert_eq!(
            Selector::parse("The Left Hand of Darkness"),
            Selector::Lookup("The Left Hand of Darkness".into())
        );
    }

    #[test]
    fn test_select_by_id_title_author() {
        let all = sample();
        assert_eq!(ids(&select(&all, &Selector::Id("b".into())).unwrap()), vec!["b"]);
        assert_eq!(
            ids(&select(&all, &Selector::Title("Dune".into())).unwrap()),
            vec!["a", "c"]
        );
        assert_eq!(
            ids(&select(&all, &Selector::Author("Neil Gaiman".into())).unwrap()),
            vec!["b"]
        );
        assert_eq!(
            ids(&select(&all, &Selector::Ids(vec!["c".into(), "a".into()])).unwrap()),
            vec!["a", "c"]
        );
    }

    #[test]
    fn test_select_lookup_order() {
        let all = sample();
        assert_eq!(ids(&select(&all, &Selector::Lookup("c".into())).unwrap()), vec!["c"]);
        assert_eq!(
            ids(&select(&all, &Selector::Lookup("c, a".into())).unwrap()),
            vec!["a", "c"]
        );
        assert_eq!(
            ids(&select(&all, &Selector::Lookup("Dune".into())).unwrap()),
            vec!["a", "c"]
        );
        assert_eq!(
            ids(&select(&all, &Selector::Lookup("Frank Herbert".into())).unwrap()),
            vec!["a", "c"]
        );
    }

    #[test]
    fn test_select_not_found() {
        let all = sample();
        for selector in [
            Selector::Id("zzz".into()),
            Selector::Ids(vec!["a".into(), "zzz".into()]),
            Selector::Title("Emma".into()),
            Selector::Author("Jane Austen".into()),
            Selector::Lookup("nothing".into()),
        ] {
            let err = select(&all, &selector).unwrap_err();
            assert!(matches!(err, HighlightsError::SelectionNotFound(_)), "{selector}");
        }
        assert!(select(&[], &Selector::New).unwrap().is_empty());
    }

    #[test]
    fn test_group_by_book_orders_by_created_at() {
        let groups = group_by_book(sample());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, BookKey::new("Dune", "Frank Herbert"));
        assert_eq!(ids(&groups[0].1), vec!["c", "a"]);
        assert_eq!(ids(&groups[1].1), vec!["b"]);
    }

    #[test]
    fn test_group_by_book_ties_keep_source_order() {
        let groups = group_by_book(vec![
            highlight("x", "Dune", "Frank Herbert", None),
            highlight("y", "Dune", "Frank Herbert", Some(3)),
            highlight("z", "Dune", "Frank Herbert", None),
        ]);
        assert_eq!(ids(&groups[0].1), vec!["x", "z", "y"]);
    }
}
