//! Configuration management for the fulltext worker using the prefer crate.
//!
//! Config files are discovered with prefer (`fulltext.json`, `fulltext.toml`,
//! `fulltext.yaml` in the standard locations) or given explicitly with
//! `--config`, and parsed with serde according to their extension.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name used for config file discovery.
pub const CONFIG_NAME: &str = "fulltext";

/// Default MySQL port.
pub const DEFAULT_PORT: u16 = 3306;
/// Default HTTP timeout for file downloads, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Default Tesseract language set.
pub const DEFAULT_OCR_LANGUAGE: &str = "eng+chi_tra";
/// Default limit for archives nested inside archives.
pub const DEFAULT_MAX_ARCHIVE_DEPTH: usize = 3;
/// Default directory for downloaded files, relative to the config file.
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No {0} config file found (pass --config or create one)")]
    NotFound(&'static str),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which databases, table and columns hold work for one project.
///
/// Databases whose name starts with `project_name` are candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectProfile {
    pub project_name: String,
    pub table_name: String,
    pub full_text_col: String,
    pub file_path_col: String,
    pub id_col: String,
}

impl ProjectProfile {
    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let fields = [
            ("projectName", &self.project_name),
            ("tableName", &self.table_name),
            ("fullTextCol", &self.full_text_col),
            ("filePathCol", &self.file_path_col),
            ("idCol", &self.id_col),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "projects[{}].{} must not be empty",
                    index, name
                )));
            }
            if value.contains('`') || value.contains('\0') {
                return Err(ConfigError::Invalid(format!(
                    "projects[{}].{} contains an illegal identifier character",
                    index, name
                )));
            }
        }
        Ok(())
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_ocr_language() -> String {
    DEFAULT_OCR_LANGUAGE.to_string()
}

fn default_max_archive_depth() -> usize {
    DEFAULT_MAX_ARCHIVE_DEPTH
}

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the file server; files live at `{file_url}/{project}/api/{path}`.
    #[serde(default)]
    pub file_url: String,

    /// MySQL host.
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Project profiles, in priority order.
    #[serde(default)]
    pub projects: Vec<ProjectProfile>,

    /// Where per-item download scratch directories are created.
    #[serde(default)]
    pub download_dir: Option<String>,

    /// HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Tesseract `-l` argument.
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,

    #[serde(default = "default_max_archive_depth")]
    pub max_archive_depth: usize,

    /// Overrides the IP stamped into status placeholders.
    #[serde(default)]
    pub host_ip: Option<String>,

    /// Path the config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from an explicit path, or discover it with prefer.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path).await;
        }

        match prefer::load(CONFIG_NAME).await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await,
                None => Err(ConfigError::NotFound(CONFIG_NAME)),
            },
            Err(e) => {
                tracing::debug!("prefer discovery failed: {}", e);
                Err(ConfigError::NotFound(CONFIG_NAME))
            }
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        config.apply_env_overrides();
        config.validate()?;

        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            }),
            _ => serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var("FULLTEXT_DB_PASSWORD") {
            self.password = password;
        }
        if let Ok(file_url) = std::env::var("FULLTEXT_FILE_URL") {
            self.file_url = file_url;
        }
    }

    /// Check required keys and project profiles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_url.trim().is_empty() {
            return Err(ConfigError::Invalid("file_url is required".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host is required".to_string()));
        }
        if self.projects.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one project profile is required".to_string(),
            ));
        }
        for (index, profile) in self.projects.iter().enumerate() {
            profile.validate(index)?;
        }
        Ok(())
    }

    /// Server-level MySQL URL (no default database; queries qualify tables).
    pub fn database_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port
        )
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    /// Directory that holds download scratch space.
    pub fn download_dir(&self) -> PathBuf {
        self.resolve_path(self.download_dir.as_deref().unwrap_or(DEFAULT_DOWNLOAD_DIR))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}
