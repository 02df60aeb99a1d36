//! Model metadata extraction
//!
//! Resolves one model file into a [`ModelRecord`]: its references, its
//! `{{ config(...) }}` block, and whatever its companion properties file says.

use crate::properties::MetadataLookup;
use dbtlens_core::Diagnostic;
use dbtlens_sql::{patterns, DbtFunctionExtractor};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Materialization assumed when the config block does not set one
pub const DEFAULT_MATERIALIZATION: &str = "view";

static MATERIALIZED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bmaterialized\s*=\s*['"](\w+)['"]"#).expect("materialized pattern is valid")
});

static TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)\btags\s*=\s*(?:\[(.*?)\]|['"]([^'"]+)['"])"#).expect("tags pattern is valid")
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]([^'"]+)['"]"#).expect("quoted string pattern is valid"));

static SCHEMA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bschema\s*=\s*['"](\w+)['"]"#).expect("schema pattern is valid")
});

static ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\balias\s*=\s*['"](\w+)['"]"#).expect("alias pattern is valid")
});

/// Recognised keys of a model's `{{ config(...) }}` block
///
/// Each key is extracted on its own, so an unsupported or malformed key never
/// hides the others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub materialized: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ModelConfig {
    /// Parse the first config block of a model file
    pub fn from_sql(sql: &str) -> Self {
        patterns::config_arguments(sql)
            .map(Self::from_arguments)
            .unwrap_or_default()
    }

    /// Parse the argument text of a config call
    pub fn from_arguments(arguments: &str) -> Self {
        let capture = |re: &Regex| re.captures(arguments).map(|caps| caps[1].to_string());

        let tags = TAGS
            .captures(arguments)
            .map(|caps| match (caps.get(1), caps.get(2)) {
                (Some(list), _) => QUOTED
                    .captures_iter(list.as_str())
                    .map(|tag| tag[1].to_string())
                    .collect(),
                (None, Some(single)) => vec![single.as_str().to_string()],
                (None, None) => Vec::new(),
            })
            .map(dedup_preserving_order)
            .unwrap_or_default();

        Self {
            materialized: capture(&MATERIALIZED),
            tags,
            schema: capture(&SCHEMA),
            alias: capture(&ALIAS),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn dedup_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

/// A documented model column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    pub description: Option<String>,
    pub data_type: Option<String>,
    pub tests: Vec<String>,
}

/// A model's resolved metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRecord {
    /// File name without extension
    pub name: String,

    pub path: PathBuf,

    pub description: Option<String>,

    pub columns: Vec<ColumnSpec>,

    /// Models passed to ref()
    pub refs: BTreeSet<String>,

    /// Sources passed to source(), as `group.table`
    pub sources: BTreeSet<String>,

    pub materialization: String,

    pub tags: Vec<String>,

    pub config: ModelConfig,

    /// Companion documents that were found but skipped
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Diagnostic>,
}

/// Extracts [`ModelRecord`]s from model files
pub struct ModelExtractor;

impl ModelExtractor {
    /// Model name for a file path (the file stem)
    pub fn model_name(model_path: &Path) -> String {
        model_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Build a model record from file content
    ///
    /// A missing properties file or entry leaves description and columns
    /// empty; it is not an error.
    pub fn extract(content: &str, model_path: &Path, lookup: &dyn MetadataLookup) -> ModelRecord {
        let name = Self::model_name(model_path);
        let config = ModelConfig::from_sql(content);
        let references = DbtFunctionExtractor::references(content);
        let mut issues = Vec::new();

        let (description, columns) = match lookup.lookup(model_path, &name, &mut issues) {
            Some(properties) => {
                let columns = properties
                    .columns
                    .unwrap_or_default()
                    .into_iter()
                    .map(|column| ColumnSpec {
                        tests: column.test_names(),
                        name: column.name,
                        description: column.description,
                        data_type: column.data_type,
                    })
                    .collect();
                (properties.description, columns)
            }
            None => (None, Vec::new()),
        };

        ModelRecord {
            refs: references.refs,
            sources: references.sources,
            materialization: config
                .materialized
                .clone()
                .unwrap_or_else(|| DEFAULT_MATERIALIZATION.to_string()),
            tags: config.tags.clone(),
            name,
            path: model_path.to_path_buf(),
            description,
            columns,
            config,
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{ColumnProperties, ModelProperties, NoMetadata};
    use pretty_assertions::assert_eq;

    struct Fixed(ModelProperties);

    impl MetadataLookup for Fixed {
        fn lookup(
            &self,
            _model_path: &Path,
            model_name: &str,
            _issues: &mut Vec<Diagnostic>,
        ) -> Option<ModelProperties> {
            (self.0.name == model_name).then(|| self.0.clone())
        }
    }

    #[test]
    fn config_with_materialization_and_tags() {
        let sql = r#"{{ config(materialized="table", tags=["finance","daily"]) }}
select * from {{ ref('stg_payments') }}"#;

        let record = ModelExtractor::extract(sql, Path::new("models/fct_payments.sql"), &NoMetadata);

        assert_eq!(record.name, "fct_payments");
        assert_eq!(record.materialization, "table");
        assert_eq!(record.tags, vec!["finance", "daily"]);
        assert!(record.refs.contains("stg_payments"));
        assert!(record.description.is_none());
        assert!(record.columns.is_empty());
    }

    #[test]
    fn missing_config_defaults_to_view() {
        let record = ModelExtractor::extract("select 1", Path::new("a.sql"), &NoMetadata);
        assert_eq!(record.materialization, DEFAULT_MATERIALIZATION);
        assert!(record.tags.is_empty());
        assert!(record.config.is_empty());
    }

    #[test]
    fn config_keys_are_independent() {
        let config = ModelConfig::from_sql(
            "{{\n  config(\n    materialized = 'incremental',\n    unique_key = ['id'],\n    tags = ['a', 'b', 'a'\n    schema='marts',\n    alias=\"orders_v2\"\n  )\n}}",
        );

        assert_eq!(config.materialized.as_deref(), Some("incremental"));
        assert_eq!(config.schema.as_deref(), Some("marts"));
        assert_eq!(config.alias.as_deref(), Some("orders_v2"));
    }

    #[test]
    fn single_string_tag() {
        let config = ModelConfig::from_arguments("tags='nightly'");
        assert_eq!(config.tags, vec!["nightly"]);
    }

    #[test]
    fn only_first_config_block_counts() {
        let config = ModelConfig::from_sql(
            "{{ config(materialized='table') }}\n{{ config(materialized='view', schema='x') }}",
        );
        assert_eq!(config.materialized.as_deref(), Some("table"));
        assert!(config.schema.is_none());
    }

    #[test]
    fn properties_supply_description_and_columns() {
        let properties = ModelProperties {
            name: "customers".to_string(),
            description: Some("Customer dimension".to_string()),
            columns: Some(vec![ColumnProperties {
                name: "id".to_string(),
                description: None,
                data_type: Some("bigint".to_string()),
                tests: Some(vec![serde_yaml::Value::String("unique".to_string())]),
                data_tests: None,
            }]),
        };

        let record = ModelExtractor::extract(
            "select * from {{ source('crm', 'customers') }}",
            Path::new("models/customers.sql"),
            &Fixed(properties),
        );

        assert_eq!(record.description.as_deref(), Some("Customer dimension"));
        assert_eq!(
            record.columns,
            vec![ColumnSpec {
                name: "id".to_string(),
                description: None,
                data_type: Some("bigint".to_string()),
                tests: vec!["unique".to_string()],
            }]
        );
        assert!(record.sources.contains("crm.customers"));
    }
}
