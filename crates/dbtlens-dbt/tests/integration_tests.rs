//! Integration tests for project scanning, model extraction and lineage

use dbtlens_core::{DiagnosticCode, ScanConfig};
use dbtlens_dbt::{
    CompanionFileLookup, DependencyGraph, Direction, LineageError, LineageTracer, ModelExtractor,
    NodeKind,
};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};

fn write(root: &Path, relative: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn scan(root: &Path) -> DependencyGraph {
    DependencyGraph::scan(root, &ScanConfig::default()).unwrap()
}

fn upstream_names(graph: &DependencyGraph, model: &str, depth: usize) -> Vec<String> {
    LineageTracer::new(graph)
        .trace(model, depth)
        .unwrap()
        .upstream
        .into_iter()
        .map(|node| node.name)
        .collect()
}

/// A small jaffle-shop style project
fn jaffle_shop() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(root, "dbt_project.yml", "name: jaffle_shop\n");
    write(
        root,
        "models/staging/stg_customers.sql",
        "select id as customer_id, name from {{ source('jaffle', 'raw_customers') }}",
    );
    write(
        root,
        "models/staging/stg_orders.sql",
        "select id as order_id, user_id as customer_id from {{ source(\"jaffle\", \"raw_orders\") }}",
    );
    write(
        root,
        "models/staging/schema.yml",
        r#"
version: 2
models:
  - name: stg_orders
    description: Cleaned orders
    columns:
      - name: order_id
        tests: [unique, not_null]
      - name: customer_id
        data_tests:
          - relationships:
              to: ref('stg_customers')
              field: customer_id
"#,
    );
    write(
        root,
        "models/marts/customers.sql",
        r#"{{ config(materialized='table', tags=['core']) }}
with customers as (select * from {{ ref('stg_customers') }}),
orders as (select * from {{ ref( 'stg_orders' ) }})
select customers.customer_id, count(orders.order_id) as order_count
from customers
left join orders on customers.customer_id = orders.customer_id
group by 1
"#,
    );
    write(
        root,
        "models/marts/orders.sql",
        "select * from {{ ref('stg_orders') }}",
    );

    // Build output and installed packages are never part of the graph
    write(root, "target/compiled/customers.sql", "select * from {{ ref('ghost') }}");
    write(root, "dbt_packages/utils/models/util.sql", "select 1");
    write(root, "logs/old.sql", "select 1");

    dir
}

#[test]
fn scan_builds_forward_and_reverse_maps() {
    let project = jaffle_shop();
    let graph = scan(project.path());

    assert_eq!(
        graph.model_names().collect::<Vec<_>>(),
        vec!["customers", "orders", "stg_customers", "stg_orders"]
    );
    assert_eq!(
        graph.entry("customers").unwrap().path,
        PathBuf::from("models/marts/customers.sql")
    );
    assert_eq!(graph.children("stg_orders"), ["customers", "orders"]);
    assert_eq!(
        graph.sources("stg_orders").collect::<Vec<_>>(),
        vec!["jaffle.raw_orders"]
    );
    assert!(graph.issues().is_empty());
}

#[test]
fn excluded_directories_are_pruned() {
    let project = jaffle_shop();
    let graph = scan(project.path());

    assert!(!graph.contains("util"));
    assert!(!graph.contains("old"));
    assert!(graph.children("ghost").is_empty());
    assert!(graph
        .forward()
        .values()
        .all(|entry| !entry.path.starts_with("target")));
}

#[test]
fn custom_exclusions_replace_defaults() {
    let project = jaffle_shop();
    let config = ScanConfig {
        excluded_dirs: vec!["marts".to_string()],
        ..ScanConfig::default()
    };

    let graph = DependencyGraph::scan(project.path(), &config).unwrap();
    assert!(graph
        .forward()
        .values()
        .all(|entry| !entry.path.starts_with("models/marts")));
    assert!(graph.contains("util"));
    assert_eq!(
        graph.entry("customers").unwrap().path,
        PathBuf::from("target/compiled/customers.sql")
    );
}

#[test]
fn scan_is_idempotent() {
    let project = jaffle_shop();
    let first = scan(project.path());
    let second = scan(project.path());

    assert_eq!(first.forward(), second.forward());
    assert_eq!(first.reverse(), second.reverse());
}

#[test]
fn reverse_map_round_trips() {
    let project = jaffle_shop();
    write(project.path(), "models/legacy/orders.sql", "select * from {{ ref('stg_customers') }}");
    let graph = scan(project.path());

    for (name, entry) in graph.forward() {
        for parent in &entry.refs {
            assert!(graph.children(parent).contains(name), "{name} missing under {parent}");
        }
    }
    for (parent, children) in graph.reverse() {
        for child in children {
            assert!(graph.entry(child).unwrap().refs.contains(parent));
        }
    }

    // models/legacy sorts before models/marts, so marts/orders.sql wins
    assert_eq!(graph.issues().len(), 1);
    assert_eq!(graph.issues()[0].code, DiagnosticCode::DuplicateModelName);
    assert_eq!(
        graph.entry("orders").unwrap().path,
        PathBuf::from("models/marts/orders.sql")
    );
}

#[test]
fn undecodable_bytes_do_not_abort_scan() {
    let project = jaffle_shop();
    let mut bytes = b"select * from {{ ref('stg_orders') }} -- ".to_vec();
    bytes.extend_from_slice(&[0xff, 0xfe, 0xfd]);
    write(project.path(), "models/binary.sql", bytes);

    let graph = scan(project.path());
    assert!(graph.entry("binary").unwrap().refs.contains("stg_orders"));
    assert!(graph.children("stg_orders").contains(&"binary".to_string()));
}

#[test]
fn three_model_cycle_terminates() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "models/a.sql", "select * from {{ ref('b') }}");
    write(dir.path(), "models/b.sql", "select * from {{ ref('c') }}");
    write(dir.path(), "models/c.sql", "select * from {{ ref('a') }}");

    let graph = scan(dir.path());
    assert_eq!(upstream_names(&graph, "a", 10), vec!["b", "c"]);

    let lineage = LineageTracer::new(&graph).trace("a", 10).unwrap();
    let downstream: Vec<_> = lineage.downstream.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(downstream, vec!["c", "b"]);
}

#[test]
fn depth_bounds_a_linear_chain() {
    let dir = tempfile::tempdir().unwrap();
    for (model, parent) in [("a", "b"), ("b", "c"), ("c", "d"), ("d", "e")] {
        write(
            dir.path(),
            &format!("models/{model}.sql"),
            format!("select * from {{{{ ref('{parent}') }}}}"),
        );
    }
    write(dir.path(), "models/e.sql", "select 1");

    let graph = scan(dir.path());
    assert_eq!(upstream_names(&graph, "a", 2), vec!["b", "c"]);
    assert_eq!(upstream_names(&graph, "a", 10), vec!["b", "c", "d", "e"]);
    assert!(upstream_names(&graph, "a", 0).is_empty());
}

#[test]
fn lineage_report_for_scanned_project() {
    let project = jaffle_shop();
    let graph = scan(project.path());
    let lineage = LineageTracer::new(&graph).trace("customers", 3).unwrap();

    let kinds: Vec<_> = lineage.upstream.iter().map(|n| (n.name.as_str(), n.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            ("stg_customers", NodeKind::Model),
            ("jaffle.raw_customers", NodeKind::Source),
            ("stg_orders", NodeKind::Model),
            ("jaffle.raw_orders", NodeKind::Source),
        ]
    );

    let summary = lineage.summary();
    assert_eq!(summary.upstream_models, 2);
    assert_eq!(summary.upstream_sources, 2);
    assert_eq!(summary.total_nodes, 5);

    let rendered = lineage.render(Direction::Upstream);
    assert_eq!(
        rendered,
        [
            "customers",
            "├── stg_customers",
            "│   └── jaffle.raw_customers (source)",
            "└── stg_orders",
            "    └── jaffle.raw_orders (source)",
        ]
        .join("\n")
    );

    let downstream = LineageTracer::new(&graph)
        .render_tree("stg_orders", 3, Direction::Downstream)
        .unwrap();
    assert_eq!(downstream, "stg_orders\n├── customers\n└── orders");
}

#[test]
fn misspelled_model_gets_bounded_suggestions() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..8 {
        write(dir.path(), &format!("models/stg_source_{i}.sql"), "select 1");
    }
    write(dir.path(), "models/revenue.sql", "select 1");

    let graph = scan(dir.path());
    let err = LineageTracer::new(&graph).trace("STG_Source", 3).unwrap_err();

    match &err {
        LineageError::DidYouMean { suggestions, .. } => {
            assert_eq!(suggestions.len(), 5);
            assert!(suggestions
                .iter()
                .all(|s| s.to_lowercase().contains("stg_source")));
        }
        other => panic!("expected suggestions, got {other:?}"),
    }

    let err = LineageTracer::new(&graph).trace("payments", 3).unwrap_err();
    assert!(matches!(err, LineageError::NotFound { .. }));
}

#[test]
fn model_extraction_merges_companion_file() {
    let project = jaffle_shop();
    let path = project.path().join("models/staging/stg_orders.sql");
    let content = std::fs::read_to_string(&path).unwrap();

    let record = ModelExtractor::extract(&content, &path, &CompanionFileLookup::default());

    assert_eq!(record.name, "stg_orders");
    assert_eq!(record.description.as_deref(), Some("Cleaned orders"));
    assert_eq!(record.materialization, "view");
    assert!(record.sources.contains("jaffle.raw_orders"));

    let tests: Vec<_> = record
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.tests.clone()))
        .collect();
    assert_eq!(
        tests,
        vec![
            ("order_id", vec!["unique".to_string(), "not_null".to_string()]),
            ("customer_id", vec!["relationships".to_string()]),
        ]
    );
}

#[test]
fn model_without_companion_entry_has_no_description() {
    let project = jaffle_shop();
    let path = project.path().join("models/marts/customers.sql");
    let content = std::fs::read_to_string(&path).unwrap();

    let record = ModelExtractor::extract(&content, &path, &CompanionFileLookup::default());

    assert_eq!(record.materialization, "table");
    assert_eq!(record.tags, vec!["core"]);
    assert!(record.description.is_none());
    assert!(record.columns.is_empty());
    assert_eq!(
        record.refs.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["stg_customers", "stg_orders"]
    );
}
