//! Companion properties files (schema.yml)
//!
//! dbt keeps model descriptions and column documentation in YAML files next
//! to the models. Only the subset needed for a model record is parsed.

use dbtlens_core::{Diagnostic, DiagnosticCode, Location, Sandbox, ScanConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Properties file structure (subset of fields we care about)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PropertiesFile {
    #[serde(default)]
    pub models: Option<Vec<ModelProperties>>,
}

/// One `models:` entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelProperties {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub columns: Option<Vec<ColumnProperties>>,
}

/// One `columns:` entry of a model
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnProperties {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub data_type: Option<String>,

    /// Either bare test names or single-key mappings with arguments
    #[serde(default)]
    pub tests: Option<Vec<serde_yaml::Value>>,

    /// dbt >= 1.8 spelling of `tests`
    #[serde(default)]
    pub data_tests: Option<Vec<serde_yaml::Value>>,
}

impl ColumnProperties {
    /// Test identifiers: the bare string, or the first key of a structured test
    pub fn test_names(&self) -> Vec<String> {
        self.tests
            .iter()
            .chain(self.data_tests.iter())
            .flatten()
            .filter_map(test_name)
            .collect()
    }
}

fn test_name(test: &serde_yaml::Value) -> Option<String> {
    match test {
        serde_yaml::Value::String(name) => Some(name.clone()),
        serde_yaml::Value::Mapping(mapping) => mapping
            .iter()
            .next()
            .and_then(|(key, _)| key.as_str())
            .map(str::to_string),
        _ => None,
    }
}

impl PropertiesFile {
    pub fn from_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Find the entry describing a model
    pub fn find_model(&self, model_name: &str) -> Option<&ModelProperties> {
        self.models
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|model| model.name == model_name)
    }
}

/// Source of model descriptions and column documentation
pub trait MetadataLookup {
    /// Properties for `model_name`, whose file lives at `model_path`
    ///
    /// Documents that exist but cannot be used are reported to `issues`.
    fn lookup(
        &self,
        model_path: &Path,
        model_name: &str,
        issues: &mut Vec<Diagnostic>,
    ) -> Option<ModelProperties>;
}

/// Lookup that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataLookup for NoMetadata {
    fn lookup(
        &self,
        _model_path: &Path,
        _model_name: &str,
        _issues: &mut Vec<Diagnostic>,
    ) -> Option<ModelProperties> {
        None
    }
}

/// Looks for properties files next to the model, then above a `models` directory
#[derive(Debug, Clone)]
pub struct CompanionFileLookup {
    candidates: Vec<String>,
    sandbox: Option<Sandbox>,
}

impl Default for CompanionFileLookup {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

impl CompanionFileLookup {
    pub fn new(candidates: Vec<String>) -> Self {
        Self {
            candidates,
            sandbox: None,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.companion_files.clone())
    }

    /// Never read candidates that resolve outside `sandbox`
    pub fn with_sandbox(mut self, sandbox: Sandbox) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Directories searched, in order
    fn search_dirs(&self, model_path: &Path) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Some(parent) = model_path.parent() {
            dirs.push(parent.to_path_buf());
            if parent.file_name().is_some_and(|name| name == "models") {
                if let Some(grandparent) = parent.parent() {
                    dirs.push(grandparent.to_path_buf());
                }
            }
        }

        match &self.sandbox {
            Some(sandbox) => dirs.into_iter().filter(|dir| sandbox.is_within(dir)).collect(),
            None => dirs,
        }
    }
}

impl MetadataLookup for CompanionFileLookup {
    fn lookup(
        &self,
        model_path: &Path,
        model_name: &str,
        issues: &mut Vec<Diagnostic>,
    ) -> Option<ModelProperties> {
        for dir in self.search_dirs(model_path) {
            for candidate in &self.candidates {
                let path = dir.join(candidate);
                if !path.is_file() {
                    continue;
                }

                let contents = match std::fs::read_to_string(&path) {
                    Ok(contents) => contents,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable properties file");
                        issues.push(
                            Diagnostic::warn(
                                DiagnosticCode::FileUnreadable,
                                format!("Failed to read properties file: {e}"),
                            )
                            .with_location(Location::new(path.display().to_string())),
                        );
                        continue;
                    }
                };

                let properties = match PropertiesFile::from_str(&contents) {
                    Ok(properties) => properties,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping invalid properties file");
                        let location = match e.location() {
                            Some(at) => Location::with_position(
                                path.display().to_string(),
                                at.line(),
                                at.column(),
                            ),
                            None => Location::new(path.display().to_string()),
                        };
                        issues.push(
                            Diagnostic::warn(DiagnosticCode::PropertiesParseError, e.to_string())
                                .with_location(location),
                        );
                        continue;
                    }
                };

                if let Some(model) = properties.find_model(model_name) {
                    tracing::debug!(model = model_name, path = %path.display(), "Found model properties");
                    return Some(model.clone());
                }
            }
        }

        None
    }
}
