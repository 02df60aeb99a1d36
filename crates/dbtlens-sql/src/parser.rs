//! Statement classification using the sqlparser tokenizer
//!
//! Only the tokenizer is used: dbt models are Jinja templates and rarely
//! survive a full parse, but they tokenize fine.

use dbtlens_core::{Diagnostic, DiagnosticCode, Location, Severity};
use serde::Serialize;
use sqlparser::dialect::{BigQueryDialect, Dialect, GenericDialect, PostgreSqlDialect, SnowflakeDialect};
use sqlparser::tokenizer::{Token, Tokenizer};
use std::path::Path;

/// Data-manipulation keyword that opens a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    Replace,
    Upsert,
    Unknown,
}

impl QueryType {
    fn from_keyword(word: &str) -> Option<Self> {
        let query_type = match word.to_ascii_uppercase().as_str() {
            "SELECT" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "MERGE" => Self::Merge,
            "REPLACE" => Self::Replace,
            "UPSERT" => Self::Upsert,
            _ => return None,
        };
        Some(query_type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Merge => "MERGE",
            Self::Replace => "REPLACE",
            Self::Upsert => "UPSERT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL tokenizer front-end with configurable dialect
pub struct SqlParser {
    dialect: Box<dyn Dialect>,
}

impl SqlParser {
    /// Create a new SQL parser with the default (generic) dialect
    pub fn new() -> Self {
        Self {
            dialect: Box::new(GenericDialect {}),
        }
    }

    /// Create a SQL parser for BigQuery
    pub fn bigquery() -> Self {
        Self {
            dialect: Box::new(BigQueryDialect {}),
        }
    }

    /// Create a SQL parser for PostgreSQL
    pub fn postgres() -> Self {
        Self {
            dialect: Box::new(PostgreSqlDialect {}),
        }
    }

    /// Create a SQL parser for Snowflake
    pub fn snowflake() -> Self {
        Self {
            dialect: Box::new(SnowflakeDialect {}),
        }
    }

    /// Create a parser from a dialect config
    pub fn from_dialect(dialect: &dbtlens_core::DialectConfig) -> Self {
        match dialect {
            dbtlens_core::DialectConfig::BigQuery => Self::bigquery(),
            dbtlens_core::DialectConfig::Snowflake => Self::snowflake(),
            dbtlens_core::DialectConfig::Postgres => Self::postgres(),
            dbtlens_core::DialectConfig::Ansi => Self::new(),
        }
    }

    /// Tokenize SQL text
    pub fn tokenize(&self, sql: &str) -> Result<Vec<Token>, ParseError> {
        Tokenizer::new(&*self.dialect, sql)
            .tokenize()
            .map_err(|e| ParseError {
                message: e.to_string(),
            })
    }

    /// First DML keyword outside parentheses, or `Unknown`
    ///
    /// `CREATE OR REPLACE` is DDL; its `REPLACE` does not classify the statement.
    pub fn query_type(&self, sql: &str) -> Result<QueryType, ParseError> {
        let mut depth = 0usize;
        let mut previous: [Option<String>; 2] = [None, None];

        for token in self.tokenize(sql)? {
            match token {
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                Token::Word(word) if depth == 0 && word.quote_style.is_none() => {
                    let upper = word.value.to_ascii_uppercase();
                    let create_or = previous[0].as_deref() == Some("CREATE")
                        && previous[1].as_deref() == Some("OR");

                    if !(create_or && upper == "REPLACE") {
                        if let Some(query_type) = QueryType::from_keyword(&upper) {
                            return Ok(query_type);
                        }
                    }

                    previous = [previous[1].take(), Some(upper)];
                }
                Token::Whitespace(_) => {}
                _ if depth == 0 => previous = [None, None],
                _ => {}
            }
        }

        Ok(QueryType::Unknown)
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// The tokenizer rejected the input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("SQL tokenizer error: {message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    /// Convert to a dbtlens diagnostic
    pub fn to_diagnostic(&self, file_path: Option<&Path>) -> Diagnostic {
        let diag = Diagnostic::new(
            DiagnosticCode::SqlTokenizeError,
            Severity::Error,
            self.to_string(),
        );

        match file_path {
            Some(path) => diag.with_location(Location::new(path.display().to_string())),
            None => diag,
        }
    }
}
