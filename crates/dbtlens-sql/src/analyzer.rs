//! Structural summary of a single SQL statement
//!
//! Tables, columns, joins, CTEs and subqueries are extracted lexically; only
//! the query type goes through the tokenizer. The complexity score is a
//! relative review-burden measure in `1..=10`.

use crate::parser::{ParseError, QueryType, SqlParser};
use crate::patterns::{self, TopLevel};
use dbtlens_core::{Diagnostic, DiagnosticCode, DialectConfig, Severity};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

/// Left table of a join whose condition did not name it
pub const UNKNOWN_TABLE: &str = "unknown";

const MAX_COLUMNS: usize = 30;
const MAX_COLUMN_CHARS: usize = 50;
const MAX_CONDITION_CHARS: usize = 100;

static JOIN_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:(LEFT|RIGHT|FULL)(?:\s+OUTER)?\s+|(INNER)\s+|(CROSS)\s+|(OUTER)\s+)?JOIN\s+([`"\[]?\w+[`"\]]?(?:\.[`"\[]?\w+[`"\]]?){0,2})(?:\s+(?:AS\s+)?(\w+))?\s+ON\b"#,
    )
    .expect("join pattern is valid")
});

// LEFT and RIGHT followed by `(` are the string functions, not join keywords
static CONDITION_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:LEFT|RIGHT)\b\s*(?:[^\s(]|$)|(?:INNER|OUTER|FULL|CROSS|NATURAL|JOIN|WHERE|GROUP|ORDER|LIMIT|HAVING|UNION|QUALIFY|WINDOW)\b)",
    )
    .expect("condition boundary pattern is valid")
});

static EQUI_CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w+)\.\w+\s*=\s*(\w+)\.\w+").expect("equi-join pattern is valid")
});

static SELECT_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSELECT\b").expect("SELECT pattern is valid"));

static FROM_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFROM\b").expect("FROM pattern is valid"));

static ALIAS_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+AS\s+\w+\s*$").expect("alias pattern is valid"));

static SUBQUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(\s*SELECT\b").expect("subquery pattern is valid"));

static UNION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bUNION\b").expect("UNION pattern is valid"));

static CASE_WHEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCASE\s+WHEN\b").expect("CASE pattern is valid"));

static WINDOW_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bWINDOW\b|\bOVER\s*\(").expect("window pattern is valid")
});

/// Join kind; an unqualified `JOIN` is inner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }
}

impl std::fmt::Display for JoinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `JOIN ... ON ...` clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinInfo {
    /// Table on the other side of the condition, or [`UNKNOWN_TABLE`]
    pub left_table: String,
    pub right_table: String,
    pub kind: JoinKind,
    /// Condition text, at most 100 characters
    pub condition: String,
}

impl JoinInfo {
    pub fn is_left_resolved(&self) -> bool {
        self.left_table != UNKNOWN_TABLE
    }
}

/// Structural summary of a SQL statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlSummary {
    /// Referenced tables, sorted and de-duplicated
    pub tables: Vec<String>,

    /// Sample of top-level SELECT expressions (at most 30)
    pub columns: Vec<String>,

    pub joins: Vec<JoinInfo>,

    /// CTE names in declaration order
    pub ctes: Vec<String>,

    /// Nested `( SELECT` count outside the CTE preamble
    pub subqueries: usize,

    pub query_type: QueryType,

    /// Review burden in `1..=10`
    pub complexity_score: u8,
}

/// Lexical SQL analyzer
#[derive(Default)]
pub struct SqlAnalyzer {
    parser: SqlParser,
}

impl SqlAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parser(parser: SqlParser) -> Self {
        Self { parser }
    }

    pub fn from_dialect(dialect: &DialectConfig) -> Self {
        Self::with_parser(SqlParser::from_dialect(dialect))
    }

    /// Summarise one statement
    ///
    /// Only the query-type classification can fail; every lexical extraction
    /// degrades to an empty result instead.
    pub fn analyze(&self, sql: &str) -> Result<SqlSummary, AnalysisError> {
        if sql.trim().is_empty() {
            return Err(AnalysisError::EmptyInput);
        }

        let query_type = self.parser.query_type(sql)?;

        let tables: Vec<String> = patterns::table_references(sql).into_iter().collect();
        let columns = extract_columns(sql);
        let joins = extract_joins(sql);
        let ctes = patterns::cte_names(sql);
        let subqueries = count_subqueries(sql);
        let complexity_score = complexity_score(sql, tables.len(), joins.len(), ctes.len(), subqueries);

        Ok(SqlSummary {
            tables,
            columns,
            joins,
            ctes,
            subqueries,
            query_type,
            complexity_score,
        })
    }
}

fn extract_columns(sql: &str) -> Vec<String> {
    let Some(select) = SELECT_KEYWORD.find(sql) else {
        return Vec::new();
    };
    let rest = &sql[select.end()..];
    let TopLevel::Boundary(from) = patterns::scan_top_level(rest, &FROM_KEYWORD) else {
        return Vec::new();
    };

    let columns: BTreeSet<String> = patterns::split_top_level(&rest[..from], ',')
        .into_iter()
        .filter_map(|expr| {
            let expr = expr.trim();
            if expr.is_empty() || expr == "*" {
                return None;
            }
            let expr = ALIAS_SUFFIX.replace(expr, "");
            let expr = expr.trim();
            if expr.is_empty() || expr.starts_with('(') {
                return None;
            }
            Some(patterns::truncate_chars(expr, MAX_COLUMN_CHARS))
        })
        .collect();

    columns.into_iter().take(MAX_COLUMNS).collect()
}

fn extract_joins(sql: &str) -> Vec<JoinInfo> {
    let mut aliases: HashMap<String, String> = HashMap::new();
    for (alias, table) in patterns::table_aliases(sql) {
        aliases.entry(alias).or_insert(table);
    }

    JOIN_CLAUSE
        .captures_iter(sql)
        .filter_map(|caps| {
            let clause = caps.get(0)?;
            let kind = if caps.get(1).is_some() {
                match caps[1].to_ascii_uppercase().as_str() {
                    "LEFT" => JoinKind::Left,
                    "RIGHT" => JoinKind::Right,
                    _ => JoinKind::Full,
                }
            } else if caps.get(3).is_some() {
                JoinKind::Cross
            } else if caps.get(4).is_some() {
                JoinKind::Full
            } else {
                JoinKind::Inner
            };

            let right_table = patterns::strip_quotes(&caps[5]);
            let alias = caps.get(6).map(|m| m.as_str()).unwrap_or_default();

            let rest = &sql[clause.end()..];
            let end = patterns::scan_top_level(rest, &CONDITION_END).offset(rest.len());
            let condition = rest[..end].trim();

            let left_table = infer_left_table(condition, &right_table, alias)
                .map(|ident| {
                    aliases
                        .get(&ident.to_lowercase())
                        .cloned()
                        .unwrap_or(ident)
                })
                .unwrap_or_else(|| UNKNOWN_TABLE.to_string());

            Some(JoinInfo {
                left_table,
                right_table,
                kind,
                condition: patterns::truncate_chars(condition, MAX_CONDITION_CHARS),
            })
        })
        .collect()
}

/// Pick the side of an `a.x = b.y` condition that is neither the right table nor its alias
///
/// Each pair is checked left side first; the first pair with a usable side wins.
fn infer_left_table(condition: &str, right_table: &str, alias: &str) -> Option<String> {
    let is_right = |ident: &str| {
        ident.eq_ignore_ascii_case(right_table) || ident.eq_ignore_ascii_case(alias)
    };

    EQUI_CONDITION.captures_iter(condition).find_map(|caps| {
        if !is_right(&caps[1]) {
            Some(caps[1].to_string())
        } else if !is_right(&caps[2]) {
            Some(caps[2].to_string())
        } else {
            None
        }
    })
}

fn count_subqueries(sql: &str) -> usize {
    SUBQUERY.find_iter(&patterns::strip_cte_preamble(sql)).count()
}

fn complexity_score(sql: &str, tables: usize, joins: usize, ctes: usize, subqueries: usize) -> u8 {
    let mut score: i64 = 1;

    score += (tables as i64 - 1).min(2);
    score += (joins as i64).min(3);
    score += (ctes as i64).min(2);
    score += (subqueries as i64).min(2);

    for indicator in [&*UNION, &*CASE_WHEN, &*WINDOW_FUNCTION] {
        if indicator.is_match(sql) {
            score += 1;
        }
    }

    score.clamp(1, 10) as u8
}

/// Analysis failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Could not parse SQL: input is empty")]
    EmptyInput,

    #[error(transparent)]
    Tokenize(#[from] ParseError),
}

impl AnalysisError {
    /// Convert to a dbtlens diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::EmptyInput => {
                Diagnostic::new(DiagnosticCode::SqlEmpty, Severity::Error, self.to_string())
            }
            Self::Tokenize(e) => e.to_diagnostic(None),
        }
    }
}
