//! Lexical extraction primitives
//!
//! Regex-based helpers shared by the structural analyzer and the dbt crate.
//! They accept any text and never fail: this is pattern extraction, not
//! parsing, so output quality depends on conventionally formatted SQL.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Optionally quoted identifier with up to two qualifiers (`db.schema.table`)
const QUALIFIED_IDENT: &str = r#"[`"\[]?\w+[`"\]]?(?:\.[`"\[]?\w+[`"\]]?){0,2}"#;

static TABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:FROM|JOIN|INTO|UPDATE)\s+({QUALIFIED_IDENT})"))
        .expect("table reference pattern is valid")
});

static ALIASED_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:FROM|JOIN)\s+({QUALIFIED_IDENT})(?:\s+(?:AS\s+)?(\w+))?"))
        .expect("aliased table pattern is valid")
});

static CTE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bWITH\s+(?:RECURSIVE\s+)?|,\s*)(\w+)\s+AS\s*\(")
        .expect("CTE pattern is valid")
});

static REF_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bref\s*\(\s*(?:['"][^'"]+['"]\s*,\s*)?['"]([^'"]+)['"]\s*(?:,[^)]*)?\)"#)
        .expect("ref() pattern is valid")
});

static SOURCE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bsource\s*\(\s*['"]([^'"]+)['"]\s*,\s*['"]([^'"]+)['"]\s*\)"#)
        .expect("source() pattern is valid")
});

static CONFIG_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{\s*config\s*\((.*?)\)\s*\}\}").expect("config() pattern is valid")
});

static WITH_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bWITH\b").expect("WITH pattern is valid"));

static SELECT_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSELECT\b").expect("SELECT pattern is valid"));

/// Words that can follow a table name but are never its alias
const NON_ALIAS_WORDS: &[&str] = &[
    "ON", "USING", "WHERE", "GROUP", "ORDER", "LIMIT", "HAVING", "UNION", "EXCEPT",
    "INTERSECT", "JOIN", "LEFT", "RIGHT", "INNER", "OUTER", "FULL", "CROSS", "NATURAL",
    "LATERAL", "WINDOW", "QUALIFY", "SET", "VALUES", "SELECT", "AS", "WITH",
];

/// Remove identifier quoting (backtick, double quote, brackets)
pub fn strip_quotes(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !matches!(c, '`' | '"' | '[' | ']'))
        .collect()
}

/// Table names following `FROM`, `JOIN`, `INTO` or `UPDATE`, sorted and de-duplicated
pub fn table_references(sql: &str) -> BTreeSet<String> {
    TABLE_REFERENCE
        .captures_iter(sql)
        .map(|caps| strip_quotes(&caps[1]))
        .collect()
}

/// Alias -> table pairs declared in `FROM`/`JOIN` clauses
///
/// Keys are lowercased. A table with no alias is not listed.
pub fn table_aliases(sql: &str) -> Vec<(String, String)> {
    ALIASED_TABLE
        .captures_iter(sql)
        .filter_map(|caps| {
            let alias = caps.get(2)?.as_str();
            if NON_ALIAS_WORDS.iter().any(|w| w.eq_ignore_ascii_case(alias)) {
                return None;
            }
            Some((alias.to_lowercase(), strip_quotes(&caps[1])))
        })
        .collect()
}

/// CTE names in declaration order, not de-duplicated
pub fn cte_names(sql: &str) -> Vec<String> {
    CTE_NAME
        .captures_iter(sql)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Model names passed to `ref(...)`, de-duplicated
pub fn model_references(text: &str) -> BTreeSet<String> {
    REF_CALL
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// `(source_group, table)` pairs passed to `source(...)`, in order of appearance
pub fn source_calls(text: &str) -> Vec<(String, String)> {
    SOURCE_CALL
        .captures_iter(text)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// Argument text of the first `{{ config(...) }}` block
pub fn config_arguments(text: &str) -> Option<&str> {
    CONFIG_CALL
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Where a top-level scan stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopLevel {
    /// A boundary match at nesting depth zero, at this byte offset
    Boundary(usize),
    /// An unbalanced `)` or a `;` at this byte offset
    Closed(usize),
    /// Ran off the end of the text
    End,
}

impl TopLevel {
    /// Byte offset of the stop, `len` when the scan reached the end
    pub fn offset(self, len: usize) -> usize {
        match self {
            Self::Boundary(pos) | Self::Closed(pos) => pos,
            Self::End => len,
        }
    }
}

/// Scan `text` for the first `boundary` match outside parentheses and string literals
pub fn scan_top_level(text: &str, boundary: &Regex) -> TopLevel {
    let starts: Vec<usize> = boundary.find_iter(text).map(|m| m.start()).collect();
    let mut depth = 0usize;
    let mut in_string = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if ch == '\'' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '\'' => in_string = true,
            '(' => depth += 1,
            ')' if depth == 0 => return TopLevel::Closed(idx),
            ')' => depth -= 1,
            ';' if depth == 0 => return TopLevel::Closed(idx),
            _ if depth == 0 && starts.binary_search(&idx).is_ok() => {
                return TopLevel::Boundary(idx)
            }
            _ => {}
        }
    }

    TopLevel::End
}

/// Split on a separator that sits outside parentheses and string literals
pub fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if ch == '\'' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '\'' => in_string = true,
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);

    parts
}

/// Remove the leading `WITH ...` preamble so only the outer statement remains
///
/// Everything from the first `WITH` up to the first `SELECT` outside the CTE
/// bodies is dropped. Text without a CTE preamble is returned unchanged.
pub fn strip_cte_preamble(sql: &str) -> String {
    let Some(with) = WITH_KEYWORD.find(sql) else {
        return sql.to_string();
    };

    let rest = &sql[with.end()..];
    match scan_top_level(rest, &SELECT_KEYWORD) {
        TopLevel::Boundary(pos) => format!("{}{}", &sql[..with.start()], &rest[pos..]),
        _ => sql.to_string(),
    }
}

/// Keep at most `max` characters
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
