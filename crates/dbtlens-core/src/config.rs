//! Configuration schema (dbtlens.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Conventional config file name, looked up at the project root
pub const CONFIG_FILE_NAME: &str = "dbtlens.toml";

/// SQL dialect used by the tokenizer that classifies query types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// BigQuery SQL dialect
    BigQuery,

    /// Snowflake SQL dialect
    Snowflake,

    /// PostgreSQL SQL dialect
    Postgres,

    /// Generic ANSI SQL
    Ansi,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self::Ansi
    }
}

/// Project scan settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory names that are never descended into
    pub excluded_dirs: Vec<String>,

    /// Candidate names of companion properties documents, in lookup order
    pub companion_files: Vec<String>,

    /// File extension of model files (without the dot)
    pub extension: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            excluded_dirs: vec![
                "target".to_string(),
                "dbt_packages".to_string(),
                "logs".to_string(),
            ],
            companion_files: vec![
                "schema.yml".to_string(),
                "_schema.yml".to_string(),
                "schema.yaml".to_string(),
                "_models.yml".to_string(),
            ],
            extension: "sql".to_string(),
        }
    }
}

impl ScanConfig {
    /// Check whether a directory name is excluded from scanning
    pub fn is_excluded(&self, dir_name: &str) -> bool {
        self.excluded_dirs.iter().any(|excluded| excluded == dir_name)
    }
}

/// Lineage query settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineageConfig {
    /// Depth used when the caller does not pass one
    pub default_depth: usize,

    /// Maximum number of "did you mean" suggestions for an unknown model
    pub max_suggestions: usize,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            default_depth: 3,
            max_suggestions: 5,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQL dialect
    #[serde(default)]
    pub dialect: DialectConfig,

    /// Project scan settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Lineage settings
    #[serde(default)]
    pub lineage: LineageConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: DialectConfig::default(),
            scan: ScanConfig::default(),
            lineage: LineageConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load `dbtlens.toml` from a project root, or fall back to defaults rooted there
    pub fn discover(project_root: &Path) -> Result<Self, ConfigError> {
        let candidate = project_root.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Self::from_file(&candidate);
        }

        Ok(Self {
            project_root: project_root.to_path_buf(),
            ..Self::default()
        })
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
