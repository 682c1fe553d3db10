use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HighlightsError, Result};

/// Location of the Kobo database relative to the ereader mount point.
const KOBO_DATABASE: &str = ".kobo/KoboReader.sqlite";

/// Hidden file in the target directory holding the imported ids.
pub const INDEX_FILE_NAME: &str = ".imported_bookmarks.json";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory where the ereader is mounted.
    #[serde(rename = "ereader_dir")]
    pub source_dir: PathBuf,
    /// Directory where the Markdown documents are written.
    pub target_dir: PathBuf,
}

impl Config {
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.source_dir.join(KOBO_DATABASE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.target_dir.join(INDEX_FILE_NAME)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.source_dir.as_os_str().is_empty() || self.target_dir.as_os_str().is_empty() {
            return Err(HighlightsError::invalid_config(
                path,
                "ereader_dir and target_dir must not be empty",
            ));
        }
        if !self.source_dir.is_absolute() {
            return Err(HighlightsError::invalid_config(
                path,
                format!("ereader_dir must be absolute: {}", self.source_dir.display()),
            ));
        }
        if !self.target_dir.is_absolute() {
            return Err(HighlightsError::invalid_config(
                path,
                format!("target_dir must be absolute: {}", self.target_dir.display()),
            ));
        }
        Ok(())
    }
}

/// `<platform config dir>/kobo_highlights/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kobo_highlights")
        .join("config.toml")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HighlightsError::ConfigurationMissing {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(HighlightsError::invalid_config(path, e)),
    };

    let config: Config =
        toml::from_str(&content).map_err(|e| HighlightsError::invalid_config(path, e))?;
    config.validate(path)?;

    Ok(config)
}

/// Validate and write `config` to `path`, creating parent directories.
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    config.validate(path)?;

    let content =
        toml::to_string(config).map_err(|e| HighlightsError::invalid_config(path, e))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HighlightsError::invalid_config(path, e))?;
    }
    std::fs::write(path, content).map_err(|e| HighlightsError::invalid_config(path, e))?;

    tracing::info!(path = %path.display(), "configuration saved");
    Ok(())
}
