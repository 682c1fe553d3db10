//! Rendering highlights to Markdown and reading them back.
//!
//! A book document is a sequence of blocks separated by a `***` thematic
//! break. Each block is the highlighted passage as a block quote, optionally
//! followed by the annotation as ordinary paragraphs:
//!
//! ```text
//! > Fear is the mind-killer.
//!
//! ***
//!
//! > I must not fear.
//!
//! A note about the litany.
//! ```
//!
//! Extraction only needs to be good enough to recognise passages that were
//! already exported, so it is a line-based scanner rather than a full
//! CommonMark parser. Users may add emphasis inside a quote; [`normalize_text`]
//! drops the markers before comparison.

use crate::models::Highlight;

/// Separator written between two blocks of the same document.
pub const BLOCK_SEPARATOR: &str = "\n\n***\n\n";

/// A block as found in an existing document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// Quoted passage with the `>` markers removed.
    pub quote: String,
    /// Paragraphs following the quote, trimmed. Empty if none.
    pub annotation: String,
}

impl RawBlock {
    /// Normalized plain text of the quoted passage.
    pub fn plain_text(&self) -> String {
        normalize_text(&self.quote)
    }
}

/// Render one highlight as a Markdown block (no trailing newline).
pub fn render_block(highlight: &Highlight) -> String {
    let mut block = quote(&highlight.text);
    if highlight.has_annotation() {
        block.push_str("\n\n");
        block.push_str(&escape_annotation(highlight.annotation.trim()));
    }
    block
}

fn quote(text: &str) -> String {
    text.trim_end()
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                ">".to_string()
            } else {
                format!("> {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// An annotation line starting with `>` would read back as a second quote.
fn escape_annotation(annotation: &str) -> String {
    annotation
        .lines()
        .map(|line| {
            if line.trim_start().starts_with('>') {
                format!("\\{}", line.trim_start())
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append rendered blocks to the current document contents.
///
/// Existing text is kept verbatim apart from trailing whitespace; the result
/// always ends with exactly one newline.
pub fn compose_document(existing: &str, blocks: &[String]) -> String {
    let mut doc = existing.trim_end().to_string();
    for block in blocks {
        if !doc.is_empty() {
            doc.push_str(BLOCK_SEPARATOR);
        }
        doc.push_str(block);
    }
    doc.push('\n');
    doc
}

#[derive(PartialEq)]
enum Phase {
    Quote,
    Annotation,
}

fn is_thematic_break(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && ["*", "-", "_"]
            .iter()
            .any(|marker| compact.chars().all(|c| c.to_string() == *marker))
}

fn strip_quote_marker(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('>')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Split a document into its blocks.
///
/// Text before the first quote (headings, front matter) is ignored. A
/// non-blank line directly after a quote line continues the quote, the way
/// Markdown treats lazy continuation lines.
pub fn extract_blocks(doc: &str) -> Vec<RawBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<(Vec<String>, Vec<String>, Phase)> = None;

    let mut flush = |current: &mut Option<(Vec<String>, Vec<String>, Phase)>| {
        if let Some((quote, annotation, _)) = current.take() {
            blocks.push(RawBlock {
                quote: quote.join("\n"),
                annotation: annotation.join("\n").trim().to_string(),
            });
        }
    };

    for line in doc.lines() {
        if let Some(content) = strip_quote_marker(line) {
            let starts_new = !matches!(current, Some((_, _, Phase::Quote)));
            if starts_new {
                flush(&mut current);
                current = Some((Vec::new(), Vec::new(), Phase::Quote));
            }
            if let Some((quote, _, _)) = current.as_mut() {
                quote.push(content.to_string());
            }
            continue;
        }

        if is_thematic_break(line) {
            flush(&mut current);
            continue;
        }

        match current.as_mut() {
            Some((_, _, phase)) if *phase == Phase::Quote && line.trim().is_empty() => {
                *phase = Phase::Annotation;
            }
            Some((quote, _, Phase::Quote)) => quote.push(line.trim().to_string()),
            Some((_, annotation, Phase::Annotation)) => {
                annotation.push(line.strip_prefix('\\').unwrap_or(line).to_string())
            }
            None => {}
        }
    }
    flush(&mut current);

    blocks
}

/// Reduce text to a form comparable across edits of the Markdown file.
///
/// Emphasis markers (`*`, `_`, `` ` ``, `~`) are removed and every run of
/// whitespace becomes a single space. Applied to both sides of a comparison.
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '`' | '~'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
