//! Request-scoped analysis session
//!
//! A [`Session`] owns the sandbox, the loaded configuration and a cache of
//! dependency graphs. Nothing is global: two sessions over different roots
//! never observe each other.

use crate::error::EngineError;
use dbtlens_core::{Config, Sandbox};
use dbtlens_dbt::{
    CompanionFileLookup, DependencyGraph, Direction, Lineage, LineageTracer, ModelExtractor,
    ModelRecord,
};
use dbtlens_sql::{SqlAnalyzer, SqlSummary};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Session {
    sandbox: Sandbox,
    config: Config,
    analyzer: SqlAnalyzer,

    /// Built graphs keyed by canonical scan root
    graphs: HashMap<PathBuf, Arc<DependencyGraph>>,
}

impl Session {
    /// Open a session on a project root, reading `dbtlens.toml` there if present
    pub fn open(root: impl AsRef<Path>) -> Result<Self, EngineError> {
        let sandbox = Sandbox::new(root)?;
        let config = Config::discover(sandbox.root())?;
        Ok(Self::with_sandbox(sandbox, config))
    }

    /// Open a session with an explicit configuration
    pub fn with_config(root: impl AsRef<Path>, config: Config) -> Result<Self, EngineError> {
        let sandbox = Sandbox::new(root)?;
        Ok(Self::with_sandbox(sandbox, config))
    }

    fn with_sandbox(sandbox: Sandbox, config: Config) -> Self {
        tracing::debug!(root = %sandbox.root().display(), dialect = ?config.dialect, "Opened session");

        Self {
            analyzer: SqlAnalyzer::from_dialect(&config.dialect),
            sandbox,
            config,
            graphs: HashMap::new(),
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Structural summary of SQL text
    pub fn analyze_sql(&self, sql: &str) -> Result<SqlSummary, EngineError> {
        Ok(self.analyzer.analyze(sql)?)
    }

    /// Structural summary of a SQL file inside the sandbox
    pub fn analyze_sql_file(&self, path: impl AsRef<Path>) -> Result<SqlSummary, EngineError> {
        let (_, content) = self.read(path.as_ref())?;
        self.analyze_sql(&content)
    }

    /// Metadata of a model file inside the sandbox
    ///
    /// The record's path is relative to the sandbox root.
    pub fn extract_model(&self, path: impl AsRef<Path>) -> Result<ModelRecord, EngineError> {
        let (resolved, content) = self.read(path.as_ref())?;

        let lookup =
            CompanionFileLookup::from_config(&self.config.scan).with_sandbox(self.sandbox.clone());
        let mut record = ModelExtractor::extract(&content, &resolved, &lookup);

        if let Ok(relative) = resolved.strip_prefix(self.sandbox.root()) {
            record.path = relative.to_path_buf();
        }

        Ok(record)
    }

    /// Dependency graph of `root` (the sandbox root by default)
    ///
    /// Graphs are built once per root and reused until [`invalidate`](Self::invalidate).
    pub fn graph(&mut self, root: Option<&Path>) -> Result<Arc<DependencyGraph>, EngineError> {
        let root = match root {
            Some(root) => self.sandbox.validate(root)?,
            None => self.sandbox.root().to_path_buf(),
        };

        if let Some(graph) = self.graphs.get(&root) {
            tracing::debug!(root = %root.display(), "Reusing cached dependency graph");
            return Ok(Arc::clone(graph));
        }

        let graph = Arc::new(DependencyGraph::scan(&root, &self.config.scan)?);
        for issue in graph.issues() {
            tracing::warn!(%issue, "Issue while scanning project");
        }

        self.graphs.insert(root, Arc::clone(&graph));
        Ok(graph)
    }

    /// Drop every cached graph
    pub fn invalidate(&mut self) {
        self.graphs.clear();
    }

    /// Upstream and downstream lineage of a model in the sandbox root's graph
    pub fn trace_lineage(
        &mut self,
        model: &str,
        depth: Option<usize>,
    ) -> Result<Lineage, EngineError> {
        let depth = depth.unwrap_or(self.config.lineage.default_depth);
        let graph = self.graph(None)?;
        Ok(self.tracer(&graph).trace(model, depth)?)
    }

    /// Text tree of one lineage direction
    pub fn render_tree(
        &mut self,
        model: &str,
        depth: Option<usize>,
        direction: Direction,
    ) -> Result<String, EngineError> {
        let depth = depth.unwrap_or(self.config.lineage.default_depth);
        let graph = self.graph(None)?;
        Ok(self.tracer(&graph).render_tree(model, depth, direction)?)
    }

    fn tracer<'g>(&self, graph: &'g DependencyGraph) -> LineageTracer<'g> {
        LineageTracer::new(graph).with_max_suggestions(self.config.lineage.max_suggestions)
    }

    /// Validate, then read a file as text, replacing invalid UTF-8
    fn read(&self, path: &Path) -> Result<(PathBuf, String), EngineError> {
        let resolved = self.sandbox.validate(path)?;

        let bytes = std::fs::read(&resolved).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::FileNotFound(path.to_path_buf()),
            _ => EngineError::Unreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        Ok((resolved, String::from_utf8_lossy(&bytes).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("models")).unwrap();
        std::fs::write(
            dir.path().join("models/stg_users.sql"),
            "select * from {{ source('app', 'users') }}",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("models/users.sql"),
            "{{ config(materialized='table') }}\nselect * from {{ ref('stg_users') }}",
        )
        .unwrap();
        dir
    }

    #[test]
    fn graph_is_cached_until_invalidated() {
        let dir = project();
        let mut session = Session::open(dir.path()).unwrap();

        let first = session.graph(None).unwrap();
        let second = session.graph(None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        session.invalidate();
        let third = session.graph(None).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(first.forward(), third.forward());
    }

    #[test]
    fn subdirectory_graph_is_separate() {
        let dir = project();
        let mut session = Session::open(dir.path()).unwrap();

        let graph = session.graph(Some(Path::new("models"))).unwrap();
        assert_eq!(
            graph.entry("users").unwrap().path,
            PathBuf::from("users.sql")
        );
    }

    #[test]
    fn extract_model_reports_relative_path() {
        let dir = project();
        let session = Session::open(dir.path()).unwrap();

        let record = session.extract_model("models/users.sql").unwrap();
        assert_eq!(record.path, PathBuf::from("models/users.sql"));
        assert_eq!(record.materialization, "table");
        assert!(record.refs.contains("stg_users"));
    }

    #[test]
    fn missing_file_is_input_absent() {
        let dir = project();
        let session = Session::open(dir.path()).unwrap();

        let err = session.extract_model("models/nope.sql").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputAbsent);
    }

    #[test]
    fn escaping_path_is_boundary_violation() {
        let dir = project();
        let session = Session::open(dir.path().join("models")).unwrap();

        let err = session.analyze_sql_file("../outside.sql").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BoundaryViolation);
    }

    #[test]
    fn lineage_uses_configured_defaults() {
        let dir = project();
        let mut config = Config::default();
        config.lineage.default_depth = 1;

        let mut session = Session::with_config(dir.path(), config).unwrap();
        let lineage = session.trace_lineage("users", None).unwrap();

        assert_eq!(lineage.depth, 1);
        let names: Vec<_> = lineage.upstream.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["stg_users"]);
    }
}
