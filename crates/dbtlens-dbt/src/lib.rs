//! dbt project analysis and DAG construction
//!
//! This crate handles:
//! - Extracting model metadata (refs, sources, config) from model files
//! - Reading companion properties files (schema.yml)
//! - Building forward and reverse dependency graphs by scanning a project tree
//! - Bounded, cycle-safe lineage traversal and tree rendering

pub mod model;
pub mod properties;
pub mod dag;
pub mod lineage;

pub use model::{ModelRecord, ModelConfig, ColumnSpec, ModelExtractor, DEFAULT_MATERIALIZATION};
pub use properties::{MetadataLookup, CompanionFileLookup, NoMetadata, ModelProperties, ColumnProperties};
pub use dag::{DependencyGraph, GraphEntry, ScanError};
pub use lineage::{
    Direction, Lineage, LineageEdge, LineageError, LineageGraph, LineageNode, LineageSummary,
    LineageTracer, LineageTree, NodeKind,
};
