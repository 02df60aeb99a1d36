//! SQL structural analysis
//!
//! This crate handles:
//! - Lexical extraction primitives shared with the dbt crate (tables, CTEs, macro calls)
//! - Extracting dbt-specific references (ref, source)
//! - Classifying statements with the sqlparser tokenizer
//! - Summarising a statement's structure and complexity

pub mod patterns;
pub mod dbt_functions;
pub mod parser;
pub mod analyzer;

pub use parser::{SqlParser, QueryType, ParseError};
pub use dbt_functions::{DbtFunctionExtractor, DbtReference, ModelReferences};
pub use analyzer::{SqlAnalyzer, SqlSummary, JoinInfo, JoinKind, AnalysisError, UNKNOWN_TABLE};
