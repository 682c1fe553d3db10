//! # Kobo Highlights
//!
//! Import highlights and annotations from a Kobo ereader into one Markdown
//! file per book, without importing the same highlight twice.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Source    │──▶│  Importer   │──▶│ DocumentStore │
//! │ KoboReader  │   │ select/group│   │  <book>.md    │
//! └─────────────┘   └──────┬──────┘   └──────────────┘
//!                          │ is_known / mark_imported
//!                          ▼
//!                   ┌─────────────┐
//!                   │NoveltyIndex │  .imported_bookmarks.json
//!                   │ ids or scan │  or scan of existing quotes
//!                   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kh config new --ereader-dir /media/KOBOeReader --target-dir ~/notes/books
//! kh ls                 # highlights not imported yet
//! kh import             # import them
//! kh import --title "Dune"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Highlight and book key types |
//! | [`source`] | Highlight sources (Kobo SQLite) |
//! | [`markdown`] | Block rendering, extraction, normalization |
//! | [`store`] | Per-book document store |
//! | [`novelty`] | Already-imported detection |
//! | [`importer`] | Import orchestration |
//! | [`lister`] | Read-only listing |
//! | [`progress`] | Import progress reporting |

pub mod config;
pub mod error;
pub mod importer;
pub mod lister;
pub mod markdown;
pub mod models;
pub mod novelty;
pub mod progress;
pub mod source;
pub mod store;
