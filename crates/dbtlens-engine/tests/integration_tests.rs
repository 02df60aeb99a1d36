//! End-to-end tests over a sandboxed project

use dbtlens_core::{DiagnosticCode, CONFIG_FILE_NAME};
use dbtlens_dbt::{Direction, LineageError};
use dbtlens_engine::{EngineError, ErrorKind, Session};
use pretty_assertions::assert_eq;
use std::path::Path;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(root, "models/staging/stg_orders.sql", "select * from {{ source('shop', 'orders') }}");
    write(root, "models/staging/stg_customers.sql", "select * from {{ source('shop', 'customers') }}");
    write(
        root,
        "models/marts/customer_orders.sql",
        r#"{{ config(materialized="table", tags=["finance","daily"]) }}
SELECT c.id, o.total
FROM {{ ref('stg_orders') }} o
JOIN {{ ref('stg_customers') }} c ON o.customer_id = c.id
"#,
    );
    write(
        root,
        "models/marts/schema.yml",
        "models:\n  - name: customer_orders\n    description: Orders per customer\n",
    );
    write(root, "build/stale.sql", "select * from {{ ref('customer_orders') }}");

    dir
}

#[test]
fn analyze_inline_sql() {
    let dir = project();
    let session = Session::open(dir.path()).unwrap();

    let summary = session
        .analyze_sql("SELECT a, b FROM orders o JOIN customers c ON o.customer_id = c.id WHERE o.status = 'open'")
        .unwrap();
    assert_eq!(summary.tables, vec!["customers", "orders"]);
    assert_eq!(summary.joins[0].left_table, "orders");

    let err = session.analyze_sql("   ").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
    assert_eq!(err.to_diagnostic().code, DiagnosticCode::SqlEmpty);
}

#[test]
fn extract_model_with_config_and_description() {
    let dir = project();
    let session = Session::open(dir.path()).unwrap();

    let record = session.extract_model("models/marts/customer_orders.sql").unwrap();
    assert_eq!(record.materialization, "table");
    assert_eq!(record.tags, vec!["finance", "daily"]);
    assert_eq!(record.description.as_deref(), Some("Orders per customer"));
    assert!(record.issues.is_empty());
}

#[test]
fn absolute_path_outside_root_is_rejected() {
    let dir = project();
    let elsewhere = tempfile::tempdir().unwrap();
    write(elsewhere.path(), "secret.sql", "select 1");

    let session = Session::open(dir.path()).unwrap();
    let err = session
        .extract_model(elsewhere.path().join("secret.sql"))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BoundaryViolation);
    assert_eq!(err.to_diagnostic().code, DiagnosticCode::PathOutsideSandbox);
}

#[test]
fn config_file_changes_scan_exclusions() {
    let dir = project();

    let mut session = Session::open(dir.path()).unwrap();
    assert!(session.graph(None).unwrap().contains("stale"));

    write(dir.path(), CONFIG_FILE_NAME, "[scan]\nexcluded_dirs = [\"build\"]\n");
    let mut session = Session::open(dir.path()).unwrap();
    let graph = session.graph(None).unwrap();
    assert!(!graph.contains("stale"));
    assert!(graph.contains("customer_orders"));
}

#[test]
fn invalid_config_file_is_malformed_input() {
    let dir = project();
    write(dir.path(), CONFIG_FILE_NAME, "dialect = [");

    let err = Session::open(dir.path()).err().unwrap();
    assert!(matches!(err, EngineError::Config(_)));
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
    assert_eq!(err.to_diagnostic().code, DiagnosticCode::ConfigInvalid);
}

#[test]
fn lineage_through_session() {
    let dir = project();
    let mut session = Session::open(dir.path()).unwrap();

    let lineage = session.trace_lineage("stg_orders", None).unwrap();
    let downstream: Vec<_> = lineage.downstream.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(downstream, vec!["customer_orders", "stale"]);

    let tree = session
        .render_tree("customer_orders", Some(1), Direction::Upstream)
        .unwrap();
    assert_eq!(tree, "customer_orders\n├── stg_customers\n└── stg_orders");
}

#[test]
fn unknown_model_is_input_absent_with_suggestions() {
    let dir = project();
    let mut session = Session::open(dir.path()).unwrap();

    let err = session.trace_lineage("STG", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputAbsent);
    match err {
        EngineError::Lineage(LineageError::DidYouMean { suggestions, .. }) => {
            assert_eq!(suggestions, vec!["stg_customers", "stg_orders"]);
        }
        other => panic!("expected suggestions, got {other:?}"),
    }
}
