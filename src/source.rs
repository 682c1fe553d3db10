//! Highlight sources.
//!
//! [`HighlightSource`] is the seam between the import pipeline and wherever
//! highlights come from. [`KoboSource`] reads the `Bookmark` and `content`
//! tables of a Kobo `KoboReader.sqlite` database.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::config::Config;
use crate::error::{HighlightsError, Result};
use crate::models::{join_authors, Highlight, UNKNOWN_AUTHOR, UNTITLED};

/// Produces every highlight present in a source, in source order.
#[async_trait]
pub trait HighlightSource: Send + Sync {
    /// Short description used in log lines and progress output.
    fn describe(&self) -> String;

    /// Fetch all highlights. Fails with
    /// [`HighlightsError::SourceUnavailable`] if the source cannot be read.
    async fn fetch_all(&self) -> Result<Vec<Highlight>>;
}

/// Reads highlights from a mounted Kobo ereader.
#[derive(Debug, Clone)]
pub struct KoboSource {
    db_path: PathBuf,
}

impl KoboSource {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.database_path())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// The `-wal` file next to the database, if one exists.
    ///
    /// The database is opened immutable, so rows still in the write-ahead
    /// log are not visible until the device checkpoints it (usually on a
    /// clean eject).
    pub fn pending_wal(&self) -> Option<PathBuf> {
        let mut name = self.db_path.file_name()?.to_os_string();
        name.push("-wal");
        let wal = self.db_path.with_file_name(name);
        wal.is_file().then_some(wal)
    }

    fn unavailable(&self, reason: impl ToString) -> HighlightsError {
        HighlightsError::source_unavailable(&self.db_path, reason)
    }

    async fn connect(&self) -> Result<SqlitePool> {
        if !self.db_path.is_file() {
            return Err(self.unavailable("database file not found (is the ereader mounted?)"));
        }
        if let Some(wal) = self.pending_wal() {
            tracing::warn!(
                wal = %wal.display(),
                "ereader database has an unmerged write-ahead log; recent highlights may be missing until the device is ejected cleanly"
            );
        }

        // Never write to the device: no journal, no WAL side files.
        let options = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .read_only(true)
            .immutable(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| self.unavailable(e))
    }

    async fn query(&self, pool: &SqlitePool) -> Result<Vec<Highlight>> {
        let rows = sqlx::query("SELECT UUID, Text, Annotation, VolumeID, DateCreated FROM Bookmark")
            .fetch_all(pool)
            .await
            .map_err(|e| self.unavailable(e))?;

        let mut titles: HashMap<String, Option<String>> = HashMap::new();
        let mut highlights = Vec::with_capacity(rows.len());

        for row in rows {
            let id: Option<String> = row.try_get("UUID").map_err(|e| self.unavailable(e))?;
            let text: Option<String> = row.try_get("Text").map_err(|e| self.unavailable(e))?;
            let annotation: Option<String> =
                row.try_get("Annotation").map_err(|e| self.unavailable(e))?;
            let volume_id: Option<String> =
                row.try_get("VolumeID").map_err(|e| self.unavailable(e))?;
            let date_created: Option<String> =
                row.try_get("DateCreated").map_err(|e| self.unavailable(e))?;

            let (Some(id), Some(text)) = (id, text) else {
                tracing::debug!("skipping bookmark without id or text");
                continue;
            };
            if text.trim().is_empty() {
                tracing::debug!(id = %id, "skipping bookmark without highlighted text");
                continue;
            }
            let volume_id = volume_id.unwrap_or_default();

            let title = match titles.get(&volume_id) {
                Some(title) => title.clone(),
                None => {
                    let title = sqlx::query_scalar::<_, Option<String>>(
                        "SELECT BookTitle FROM content WHERE BookID = ? LIMIT 1",
                    )
                    .bind(&volume_id)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| self.unavailable(e))?
                    .flatten();
                    titles.insert(volume_id.clone(), title.clone());
                    title
                }
            };

            highlights.push(Highlight {
                id,
                book_title: title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| title_from_volume_id(&volume_id)),
                book_authors: author_from_volume_id(&volume_id),
                text,
                annotation: annotation.unwrap_or_default(),
                created_at: date_created.as_deref().and_then(parse_kobo_timestamp),
            });
        }

        Ok(highlights)
    }
}

#[async_trait]
impl HighlightSource for KoboSource {
    fn describe(&self) -> String {
        format!("kobo:{}", self.db_path.display())
    }

    async fn fetch_all(&self) -> Result<Vec<Highlight>> {
        let pool = self.connect().await?;
        let result = self.query(&pool).await;
        pool.close().await;

        let highlights = result?;
        tracing::debug!(source = %self.describe(), count = highlights.len(), "fetched highlights");
        Ok(highlights)
    }
}

/// The author is the directory holding the book file:
/// `file:///mnt/onboard/<author>/<book>.epub`.
pub fn author_from_volume_id(volume_id: &str) -> String {
    let mut parts = volume_id.rsplit('/');
    let _file = parts.next();
    let authors = parts
        .next()
        .map(|dir| join_authors(dir.split([',', ';', '&'])))
        .unwrap_or_default();
    if authors.is_empty() {
        UNKNOWN_AUTHOR.to_string()
    } else {
        authors
    }
}

/// File stem of the book, used when the `content` table has no title.
pub fn title_from_volume_id(volume_id: &str) -> String {
    let file = volume_id.rsplit('/').next().unwrap_or_default();
    let stem = Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if stem.trim().is_empty() {
        UNTITLED.to_string()
    } else {
        stem
    }
}

/// Kobo stores `DateCreated` as ISO 8601, with or without an offset.
pub fn parse_kobo_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_author_from_volume_id() {
        assert_eq!(
            author_from_volume_id("file:///mnt/onboard/Ursula K. Le Guin/La mano izquierda.epub"),
            "Ursula K. Le Guin"
        );
        assert_eq!(
            author_from_volume_id("file:///mnt/onboard/Terry Pratchett & Neil Gaiman/Good Omens.epub"),
            "Terry Pratchett, Neil Gaiman"
        );
        assert_eq!(author_from_volume_id("book.epub"), "Unknown");
        assert_eq!(author_from_volume_id(""), "Unknown");
    }

    #[test]
    fn test_title_from_volume_id() {
        assert_eq!(
            title_from_volume_id("file:///mnt/onboard/Steve Klabnik/The Rust Book.epub"),
            "The Rust Book"
        );
        assert_eq!(title_from_volume_id(""), "Untitled");
    }

    #[test]
    fn test_parse_kobo_timestamp() {
        let expected = Utc.with_ymd_and_hms(2021, 5, 2, 10, 11, 12).unwrap();
        assert_eq!(parse_kobo_timestamp("2021-05-02T10:11:12Z"), Some(expected));
        assert_eq!(parse_kobo_timestamp("2021-05-02T10:11:12.000"), Some(expected));
        assert_eq!(parse_kobo_timestamp("2021-05-02 10:11:12"), Some(expected));
        assert_eq!(parse_kobo_timestamp("2021-05-02T12:11:12+02:00"), Some(expected));
        assert_eq!(parse_kobo_timestamp("yesterday"), None);
    }

    #[test]
    fn test_pending_wal_detected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db = tmp.path().join("KoboReader.sqlite");
        std::fs::write(&db, b"").unwrap();
        let source = KoboSource::new(&db);
        assert_eq!(source.pending_wal(), None);

        let wal = tmp.path().join("KoboReader.sqlite-wal");
        std::fs::write(&wal, b"wal").unwrap();
        assert_eq!(source.pending_wal(), Some(wal));
    }

    #[tokio::test]
    async fn test_missing_database_is_source_unavailable() {
        let source = KoboSource::new("/nonexistent/.kobo/KoboReader.sqlite");
        let err = source.fetch_all().await.unwrap_err();
        assert!(matches!(err, HighlightsError::SourceUnavailable { .. }));
    }
}
