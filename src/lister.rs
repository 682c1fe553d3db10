//! Read-only listing of ereader highlights.
//!
//! Uses the same novelty determination as the importer but never marks or
//! persists anything. Used by `kh ls`.

use anyhow::Result as AnyResult;

use crate::config::Config;
use crate::error::Result;
use crate::models::Highlight;
use crate::novelty::NoveltyIndex;
use crate::source::{HighlightSource, KoboSource};
use crate::store::DocumentStore;

/// Widest text column in the human listing.
const TEXT_WIDTH: usize = 60;

pub struct Lister<'a> {
    source: &'a dyn HighlightSource,
    store: &'a DocumentStore,
}

impl<'a> Lister<'a> {
    pub fn new(source: &'a dyn HighlightSource, store: &'a DocumentStore) -> Self {
        Self { source, store }
    }

    /// Highlights in the source; only those not yet imported unless
    /// `show_all`.
    pub async fn list(&self, show_all: bool) -> Result<Vec<Highlight>> {
        let highlights = self.source.fetch_all().await?;
        if show_all {
            return Ok(highlights);
        }

        let index = NoveltyIndex::load(self.store);
        Ok(highlights
            .into_iter()
            .filter(|h| !index.is_known(h))
            .collect())
    }
}

/// `kh ls`: print highlights as a table or as JSON.
pub async fn run_list(config: &Config, show_all: bool, json: bool) -> AnyResult<()> {
    let source = KoboSource::from_config(config);
    let store = DocumentStore::new(&config.target_dir);
    let highlights = Lister::new(&source, &store).list(show_all).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&highlights)?);
        return Ok(());
    }

    if highlights.is_empty() {
        if show_all {
            println!("No highlights found on the ereader.");
        } else {
            println!("No new highlights (use \"kh ls --all\" to show every highlight).");
        }
        return Ok(());
    }

    println!(
        "{} highlights on the ereader",
        if show_all { "All" } else { "New" }
    );
    println!();
    for h in &highlights {
        println!("{}", h.id);
        println!("  {:<11} {}", "book:", h.book_key());
        println!("  {:<11} {}", "text:", truncate(&h.text, TEXT_WIDTH));
        if h.has_annotation() {
            println!("  {:<11} {}", "annotation:", truncate(&h.annotation, TEXT_WIDTH));
        }
        if let Some(created) = h.created_at {
            println!("  {:<11} {}", "created:", created.format("%Y-%m-%d %H:%M"));
        }
    }
    println!();
    println!("{} highlights", highlights.len());

    Ok(())
}

/// Single-line preview, cut on a character boundary.
fn truncate(text: &str, width: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= width {
        return flat;
    }
    let cut: String = flat.chars().take(width.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short\ntext", 60), "short text");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
        assert_eq!(truncate("ñññññññ", 4), "ñññ…");
    }
}
