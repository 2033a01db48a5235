// Application settings
//
// Layered: built-in defaults, then an optional TOML file, then environment
// variables prefixed `ATTENDANCE_` (e.g. `ATTENDANCE_DB_PATH`).

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "attendance.toml";
pub const ENV_PREFIX: &str = "ATTENDANCE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite file the loader writes to
    pub db_path: PathBuf,
    /// Where downloaded reports are kept
    pub download_dir: PathBuf,
    /// Prefix for cleaned files written next to their input
    pub output_prefix: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("attendance.db"),
            download_dir: PathBuf::from("docs/downloaded_csvs"),
            output_prefix: crate::cleaner::DEFAULT_OUTPUT_PREFIX.to_string(),
        }
    }
}

impl AppConfig {
    /// Load settings. An explicit `path` must exist; the default file is
    /// optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = AppConfig::default();

        let file = match path {
            Some(p) => File::from(p).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let settings = Config::builder()
            .set_default("db_path", defaults.db_path.to_string_lossy().into_owned())?
            .set_default("download_dir", defaults.download_dir.to_string_lossy().into_owned())?
            .set_default("output_prefix", defaults.output_prefix)?
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("Failed to load configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Cleaned-file path for `input` using the configured prefix
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        crate::cleaner::output_path_with_prefix(input, &self.output_prefix)
    }
}
