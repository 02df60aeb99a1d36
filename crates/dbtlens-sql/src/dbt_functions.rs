//! dbt-specific function extraction
//!
//! Handles dbt Jinja macro calls like {{ ref('model') }} and {{ source('source', 'table') }}

use crate::patterns;
use serde::Serialize;
use std::collections::BTreeSet;

/// A reference from a model to something it reads from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DbtReference {
    /// ref('model_name')
    Model { name: String },

    /// source('source_name', 'table_name')
    Source {
        source_name: String,
        table_name: String,
    },
}

impl DbtReference {
    /// Name as it appears in the dependency graph (`group.table` for sources)
    pub fn qualified_name(&self) -> String {
        match self {
            Self::Model { name } => name.clone(),
            Self::Source {
                source_name,
                table_name,
            } => format!("{}.{}", source_name, table_name),
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Self::Source { .. })
    }
}

/// The model and source references of one model file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelReferences {
    /// Names passed to ref()
    pub refs: BTreeSet<String>,

    /// `group.table` names passed to source()
    pub sources: BTreeSet<String>,
}

impl ModelReferences {
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty() && self.sources.is_empty()
    }
}

impl FromIterator<DbtReference> for ModelReferences {
    fn from_iter<I: IntoIterator<Item = DbtReference>>(iter: I) -> Self {
        let mut references = Self::default();
        for reference in iter {
            match reference {
                DbtReference::Model { name } => {
                    references.refs.insert(name);
                }
                source @ DbtReference::Source { .. } => {
                    references.sources.insert(source.qualified_name());
                }
            }
        }
        references
    }
}

/// Extracts dbt-specific functions from SQL
pub struct DbtFunctionExtractor;

impl DbtFunctionExtractor {
    /// Extract all dbt references from SQL
    ///
    /// Models come before sources; each list is de-duplicated and sorted.
    pub fn extract(sql: &str) -> Vec<DbtReference> {
        let mut references: Vec<DbtReference> = patterns::model_references(sql)
            .into_iter()
            .map(|name| DbtReference::Model { name })
            .collect();

        let sources: BTreeSet<(String, String)> = patterns::source_calls(sql).into_iter().collect();
        references.extend(sources.into_iter().map(|(source_name, table_name)| {
            DbtReference::Source {
                source_name,
                table_name,
            }
        }));

        references
    }

    /// Extract the ref() and source() sets used to build graph edges
    pub fn references(sql: &str) -> ModelReferences {
        Self::extract(sql).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extract_ref() {
        let sql = "SELECT * FROM {{ ref('users') }}";
        let refs = DbtFunctionExtractor::extract(sql);

        assert_eq!(refs, vec![DbtReference::Model { name: "users".to_string() }]);
    }

    #[test]
    fn extract_source() {
        let sql = "SELECT * FROM {{ source('raw', 'users') }}";
        let refs = DbtFunctionExtractor::extract(sql);

        assert_eq!(refs.len(), 1);
        assert!(refs[0].is_source());
        assert_eq!(refs[0].qualified_name(), "raw.users");
    }

    #[test]
    fn extract_multiple() {
        let sql = r#"
            WITH base AS (
                SELECT * FROM {{ source('raw', 'users') }}
            ),
            filtered AS (
                SELECT * FROM {{ ref('staging_users') }}
            ),
            again AS (
                SELECT * FROM {{ ref("staging_users") }}
            )
            SELECT * FROM filtered
        "#;

        let refs = DbtFunctionExtractor::extract(sql);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].qualified_name(), "staging_users");
        assert_eq!(refs[1].qualified_name(), "raw.users");
    }

    #[test]
    fn references_split_by_kind() {
        let sql = "select * from {{ ref('a') }} join {{ source('raw', 'b') }} using (id)";
        let references = DbtFunctionExtractor::references(sql);

        assert!(references.refs.contains("a"));
        assert!(references.sources.contains("raw.b"));
        assert!(!references.is_empty());
        assert!(DbtFunctionExtractor::references("select 1").is_empty());
    }
}
