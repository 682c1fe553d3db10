//! Import progress on stderr.
//!
//! The importer emits an [`ImportProgressEvent`] when it starts reading the
//! ereader, once it knows which highlights are new, before each book document
//! is written, and when the run ends. [`ProgressWriter`] renders the events as
//! short human lines or as one JSON object per line. Stdout is left to the
//! final summary.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ImportProgressEvent {
    /// Reading highlights from the source.
    Fetching { source: String },
    /// Selection and novelty filtering done.
    Selected {
        new: usize,
        skipped: usize,
        books: usize,
    },
    /// About to append `highlights` blocks to the `n`-th of `books` documents.
    Writing {
        book: String,
        n: usize,
        books: usize,
        highlights: usize,
    },
    Finished { imported: usize, failed_books: usize },
}

impl ImportProgressEvent {
    fn human(&self) -> String {
        match self {
            ImportProgressEvent::Fetching { source } => format!("reading {}", source),
            ImportProgressEvent::Selected { new: 0, skipped, .. } => {
                format!("nothing new ({} already imported)", skipped)
            }
            ImportProgressEvent::Selected { new, skipped, books } => format!(
                "{} new {} in {} {} ({} already imported)",
                new,
                plural(*new, "highlight"),
                books,
                plural(*books, "book"),
                skipped
            ),
            ImportProgressEvent::Writing {
                book,
                n,
                books,
                highlights,
            } => format!("[{}/{}] {} (+{})", n, books, book, highlights),
            ImportProgressEvent::Finished {
                imported,
                failed_books: 0,
            } => format!("done, {} imported", imported),
            ImportProgressEvent::Finished {
                imported,
                failed_books,
            } => format!(
                "done, {} imported, {} {} failed",
                imported,
                failed_books,
                plural(*failed_books, "book")
            ),
        }
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}

/// Receives progress events from the importer.
pub trait ImportProgressReporter: Send + Sync {
    fn report(&self, event: ImportProgressEvent);
}

pub struct NoProgress;

impl ImportProgressReporter for NoProgress {
    fn report(&self, _event: ImportProgressEvent) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressFormat {
    Human,
    Json,
}

/// Writes one line per event to `out`.
pub struct ProgressWriter<W> {
    format: ProgressFormat,
    out: Mutex<W>,
}

impl<W: Write + Send> ProgressWriter<W> {
    pub fn new(format: ProgressFormat, out: W) -> Self {
        Self {
            format,
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn render(&self, event: &ImportProgressEvent) -> Option<String> {
        match self.format {
            ProgressFormat::Human => Some(format!("import  {}", event.human())),
            ProgressFormat::Json => serde_json::to_string(event).ok(),
        }
    }
}

impl<W: Write + Send> ImportProgressReporter for ProgressWriter<W> {
    fn report(&self, event: ImportProgressEvent) {
        let Some(line) = self.render(&event) else {
            return;
        };
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }
}

/// `--progress` value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a terminal, otherwise none.
    pub fn detect() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(self) -> Box<dyn ImportProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(ProgressWriter::new(ProgressFormat::Human, std::io::stderr())),
            ProgressMode::Json => Box::new(ProgressWriter::new(ProgressFormat::Json, std::io::stderr())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events() -> Vec<ImportProgressEvent> {
        vec![
            ImportProgressEvent::Fetching {
                source: "kobo:/media/KOBOeReader/.kobo/KoboReader.sqlite".into(),
            },
            ImportProgressEvent::Selected {
                new: 3,
                skipped: 1,
                books: 2,
            },
            ImportProgressEvent::Writing {
                book: "Dune - Frank Herbert".into(),
                n: 1,
                books: 2,
                highlights: 2,
            },
            ImportProgressEvent::Finished {
                imported: 2,
                failed_books: 1,
            },
        ]
    }

    fn output(format: ProgressFormat) -> String {
        let writer = ProgressWriter::new(format, Vec::new());
        for event in events() {
            writer.report(event);
        }
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_human_lines() {
        assert_eq!(
            output(ProgressFormat::Human),
            "import  reading kobo:/media/KOBOeReader/.kobo/KoboReader.sqlite\n\
             import  3 new highlights in 2 books (1 already imported)\n\
             import  [1/2] Dune - Frank Herbert (+2)\n\
             import  done, 2 imported, 1 book failed\n"
        );
    }

    #[test]
    fn test_human_nothing_new() {
        let event = ImportProgressEvent::Selected {
            new: 0,
            skipped: 4,
            books: 0,
        };
        assert_eq!(event.human(), "nothing new (4 already imported)");
        let event = ImportProgressEvent::Finished {
            imported: 1,
            failed_books: 0,
        };
        assert_eq!(event.human(), "done, 1 imported");
    }

    #[test]
    fn test_json_lines() {
        let out = output(ProgressFormat::Json);
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["event"], "fetching");
        assert_eq!(lines[1]["event"], "selected");
        assert_eq!(lines[1]["new"], 3);
        assert_eq!(lines[2]["event"], "writing");
        assert_eq!(lines[2]["book"], "Dune - Frank Herbert");
        assert_eq!(lines[2]["highlights"], 2);
        assert_eq!(lines[3]["event"], "finished");
        assert_eq!(lines[3]["failed_books"], 1);
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(ProgressMode::from_str("json", true), Ok(ProgressMode::Json));
        assert_eq!(ProgressMode::from_str("off", true), Ok(ProgressMode::Off));
        assert!(ProgressMode::from_str("loud", true).is_err());
    }
}
