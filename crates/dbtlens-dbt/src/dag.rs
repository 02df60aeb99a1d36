//! Dependency graph construction by scanning a project tree
//!
//! Builds forward (model -> refs/sources) and reverse (model -> dependents)
//! maps from the `ref()` and `source()` calls in every model file. The graph
//! is directed and may contain cycles.

use dbtlens_core::{Diagnostic, DiagnosticCode, Location, ScanConfig};
use dbtlens_sql::DbtFunctionExtractor;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Forward entry for one model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphEntry {
    /// Models this model depends on
    pub refs: BTreeSet<String>,

    /// Sources this model reads, as `group.table`
    pub sources: BTreeSet<String>,

    /// Model file path relative to the scanned root
    pub path: PathBuf,
}

impl GraphEntry {
    /// Build an entry from model file content
    pub fn from_sql(content: &str, path: impl Into<PathBuf>) -> Self {
        let references = DbtFunctionExtractor::references(content);
        Self {
            refs: references.refs,
            sources: references.sources,
            path: path.into(),
        }
    }
}

/// Dependency graph with forward and reverse edges
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DependencyGraph {
    /// Forward edges: model -> what it references
    models: BTreeMap<String, GraphEntry>,

    /// Reverse edges: model -> models that reference it
    children: BTreeMap<String, Vec<String>>,

    /// Per-file problems met while scanning
    #[serde(skip)]
    issues: Vec<Diagnostic>,
}

impl DependencyGraph {
    /// Scan every model file under `root`
    ///
    /// The root is trusted: callers validate it against their sandbox before
    /// scanning. Unreadable entries are recorded in [`issues`](Self::issues)
    /// and skipped.
    pub fn scan(root: &Path, config: &ScanConfig) -> Result<Self, ScanError> {
        if !root.exists() {
            return Err(ScanError::RootMissing(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut graph = Self::default();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !config.is_excluded(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let location = e
                        .path()
                        .map(|path| Location::new(path.display().to_string()));
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    let diag = Diagnostic::warn(DiagnosticCode::FileUnreadable, e.to_string());
                    graph.issues.push(match location {
                        Some(location) => diag.with_location(location),
                        None => diag,
                    });
                    continue;
                }
            };

            let path = entry.path();
            let is_model_file = entry.file_type().is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext == config.extension.as_str());
            if !is_model_file {
                continue;
            }

            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable model file");
                    graph.issues.push(
                        Diagnostic::warn(
                            DiagnosticCode::FileUnreadable,
                            format!("Failed to read model file: {e}"),
                        )
                        .with_location(Location::new(path.display().to_string())),
                    );
                    continue;
                }
            };
            let content = String::from_utf8_lossy(&bytes);

            let name = crate::ModelExtractor::model_name(path);
            let relative = path.strip_prefix(root).unwrap_or(path);
            tracing::debug!(model = %name, path = %relative.display(), "Scanned model file");

            graph.add(name, GraphEntry::from_sql(&content, relative));
        }

        graph.rebuild_children();

        tracing::info!(
            root = %root.display(),
            models = graph.models.len(),
            issues = graph.issues.len(),
            "Built dependency graph"
        );

        Ok(graph)
    }

    /// Build a graph from already extracted entries
    pub fn from_entries(entries: impl IntoIterator<Item = (String, GraphEntry)>) -> Self {
        let mut graph = Self::default();
        for (name, entry) in entries {
            graph.add(name, entry);
        }
        graph.rebuild_children();
        graph
    }

    /// Add or replace one model
    pub fn insert(&mut self, name: impl Into<String>, entry: GraphEntry) {
        self.add(name.into(), entry);
        self.rebuild_children();
    }

    fn add(&mut self, name: String, entry: GraphEntry) {
        let path = entry.path.clone();
        if let Some(previous) = self.models.insert(name.clone(), entry) {
            tracing::warn!(
                model = %name,
                kept = %path.display(),
                replaced = %previous.path.display(),
                "Duplicate model name"
            );
            self.issues.push(
                Diagnostic::warn(
                    DiagnosticCode::DuplicateModelName,
                    format!(
                        "Model '{}' is defined in both {} and {}; using the latter",
                        name,
                        previous.path.display(),
                        path.display()
                    ),
                )
                .with_location(Location::new(path.display().to_string())),
            );
        }
    }

    /// Derive the reverse map from the final forward map
    fn rebuild_children(&mut self) {
        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, entry) in &self.models {
            for parent in &entry.refs {
                children.entry(parent.clone()).or_default().push(name.clone());
            }
        }
        self.children = children;
    }

    /// Forward entry of a model
    pub fn entry(&self, model: &str) -> Option<&GraphEntry> {
        self.models.get(model)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// All model names, sorted
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Models a model references
    pub fn parents(&self, model: &str) -> impl Iterator<Item = &str> {
        self.models
            .get(model)
            .into_iter()
            .flat_map(|entry| entry.refs.iter().map(String::as_str))
    }

    /// Sources a model reads
    pub fn sources(&self, model: &str) -> impl Iterator<Item = &str> {
        self.models
            .get(model)
            .into_iter()
            .flat_map(|entry| entry.sources.iter().map(String::as_str))
    }

    /// Models that reference a model
    pub fn children(&self, model: &str) -> &[String] {
        self.children.get(model).map(Vec::as_slice).unwrap_or_default()
    }

    /// The whole reverse map
    pub fn reverse(&self) -> &BTreeMap<String, Vec<String>> {
        &self.children
    }

    /// The whole forward map
    pub fn forward(&self) -> &BTreeMap<String, GraphEntry> {
        &self.models
    }

    /// Problems recorded while building
    pub fn issues(&self) -> &[Diagnostic] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Known model names containing `query`, ignoring case
    pub fn suggestions(&self, query: &str, limit: usize) -> Vec<String> {
        let needle = query.to_lowercase();
        self.models
            .keys()
            .filter(|name| name.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect()
    }
}

/// Errors that stop a scan before it starts
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Project root does not exist: {0}")]
    RootMissing(PathBuf),

    #[error("Project root is not a directory: {0}")]
    NotADirectory(PathBuf),
}
