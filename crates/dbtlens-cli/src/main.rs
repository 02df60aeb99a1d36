use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dbtlens_core::{Config, Severity, CONFIG_FILE_NAME};
use dbtlens_dbt::{Direction, Lineage, ModelRecord};
use dbtlens_engine::Session;
use dbtlens_sql::SqlSummary;

/// Columns listed in the text model report
const MAX_REPORTED_COLUMNS: usize = 20;

/// dbtlens - Structural analysis and lineage for dbt projects
#[derive(Parser)]
#[command(name = "dbtlens")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// dbt project root; every path argument must stay inside it
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    /// Path to config file (default: <root>/dbtlens.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DirectionArg {
    Upstream,
    Downstream,
    Both,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the structure of a SQL file or inline query
    Analyze {
        /// SQL file, relative to the project root
        #[arg(required_unless_present = "sql")]
        file: Option<PathBuf>,

        /// Analyze this SQL text instead of a file
        #[arg(long, conflicts_with = "file")]
        sql: Option<String>,
    },

    /// Show a model's config, references and documented columns
    Model {
        /// Model file, relative to the project root
        path: PathBuf,
    },

    /// Trace upstream and downstream lineage of a model
    Lineage {
        /// Model name (file name without extension)
        model: String,

        /// Levels to follow in each direction (default from config)
        #[arg(short, long)]
        depth: Option<usize>,

        /// Which side of the lineage to show
        #[arg(long, value_enum, default_value_t = DirectionArg::Both)]
        direction: DirectionArg,
    },

    /// List every model with its references
    Graph,

    /// Write a default dbtlens.toml
    InitConfig {
        /// Destination (default: <root>/dbtlens.toml)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(root = %cli.root.display(), "Starting dbtlens");

    if let Commands::InitConfig { output, force } = &cli.command {
        let output = output.clone().unwrap_or_else(|| cli.root.join(CONFIG_FILE_NAME));
        return init_config_command(&output, *force);
    }

    let mut session = open_session(&cli)?;

    match cli.command {
        Commands::Analyze { file, sql } => analyze_command(&session, file.as_deref(), sql.as_deref(), cli.format),
        Commands::Model { path } => model_command(&session, &path, cli.format),
        Commands::Lineage { model, depth, direction } => {
            lineage_command(&mut session, &model, depth, direction, cli.format)
        }
        Commands::Graph => graph_command(&mut session, cli.format),
        Commands::InitConfig { .. } => Ok(()),
    }
}

/// Log to stderr; `RUST_LOG` overrides the verbosity flag
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn open_session(cli: &Cli) -> Result<Session> {
    let session = match &cli.config {
        Some(config_path) => {
            let config = Config::from_file(config_path)
                .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
            Session::with_config(&cli.root, config)?
        }
        None => Session::open(&cli.root)?,
    };

    if cli.verbose {
        eprintln!(
            "{} {} ({:?} dialect)",
            "Project root:".cyan(),
            session.sandbox().root().display(),
            session.config().dialect
        );
    }

    Ok(session)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn banner(title: &str) {
    println!("{}", "=".repeat(60).bright_blue());
    println!("{}", title.bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".dimmed().to_string()
    } else {
        items.join(", ")
    }
}

/// Analyze command - structural summary of one query
fn analyze_command(session: &Session, file: Option<&Path>, sql: Option<&str>, format: Format) -> Result<()> {
    let summary = match (file, sql) {
        (_, Some(sql)) => session.analyze_sql(sql)?,
        (Some(file), None) => session.analyze_sql_file(file)?,
        (None, None) => anyhow::bail!("Pass a SQL file or --sql"),
    };

    match format {
        Format::Json => print_json(&summary),
        Format::Text => {
            print_summary(&summary, file);
            Ok(())
        }
    }
}

fn print_summary(summary: &SqlSummary, file: Option<&Path>) {
    banner("SQL Analysis");

    if let Some(file) = file {
        println!("{} {}", "File:".bold(), file.display().to_string().green());
    }
    println!("{} {}", "Query type:".bold(), summary.query_type);

    let score = format!("{}/10", summary.complexity_score);
    let score = match summary.complexity_score {
        1..=3 => score.green(),
        4..=6 => score.yellow(),
        _ => score.red(),
    };
    println!("{} {}", "Complexity:".bold(), score);
    println!();

    println!("{} ({}): {}", "Tables".bold(), summary.tables.len(), list_or_none(&summary.tables));
    println!("{} ({}): {}", "CTEs".bold(), summary.ctes.len(), list_or_none(&summary.ctes));
    println!("{} {}", "Subqueries:".bold(), summary.subqueries);
    println!();

    if !summary.columns.is_empty() {
        println!("{}", "Columns:".bold());
        for column in &summary.columns {
            println!("  - {column}");
        }
        println!();
    }

    if !summary.joins.is_empty() {
        println!("{}", "Joins:".bold());
        for join in &summary.joins {
            let left = if join.is_left_resolved() {
                join.left_table.normal()
            } else {
                join.left_table.dimmed()
            };
            println!(
                "  {} {} {} {}",
                left,
                join.kind.to_string().cyan(),
                join.right_table.yellow(),
                format!("ON {}", join.condition).dimmed()
            );
        }
        println!();
    }
}

/// Model command - metadata of one model file
fn model_command(session: &Session, path: &Path, format: Format) -> Result<()> {
    let record = session.extract_model(path)?;

    match format {
        Format::Json => print_json(&record),
        Format::Text => {
            print_model(&record);
            Ok(())
        }
    }
}

fn print_model(record: &ModelRecord) {
    banner(&format!("Model: {}", record.name));

    println!("{} {}", "Path:".bold(), record.path.display());
    println!("{} {}", "Materialization:".bold(), record.materialization.green());
    if let Some(description) = &record.description {
        println!("{} {}", "Description:".bold(), description);
    }
    println!("{} {}", "Tags:".bold(), list_or_none(&record.tags));
    if let Some(schema) = &record.config.schema {
        println!("{} {}", "Schema:".bold(), schema);
    }
    if let Some(alias) = &record.config.alias {
        println!("{} {}", "Alias:".bold(), alias);
    }
    println!();

    let refs: Vec<String> = record.refs.iter().cloned().collect();
    let sources: Vec<String> = record.sources.iter().cloned().collect();
    println!("{} ({}): {}", "References".bold(), refs.len(), list_or_none(&refs));
    println!("{} ({}): {}", "Sources".bold(), sources.len(), list_or_none(&sources));
    println!();

    if !record.columns.is_empty() {
        println!("{} ({})", "Columns".bold(), record.columns.len());
        for column in record.columns.iter().take(MAX_REPORTED_COLUMNS) {
            let mut line = format!("  - {}", column.name.yellow());
            if let Some(data_type) = &column.data_type {
                line.push_str(&format!(" {}", data_type.dimmed()));
            }
            if let Some(description) = &column.description {
                line.push_str(&format!(": {description}"));
            }
            if !column.tests.is_empty() {
                line.push_str(&format!(" [{}]", column.tests.join(", ").cyan()));
            }
            println!("{line}");
        }
        if record.columns.len() > MAX_REPORTED_COLUMNS {
            println!("  ... and {} more", record.columns.len() - MAX_REPORTED_COLUMNS);
        }
        println!();
    }

    for issue in &record.issues {
        println!("{} {}", "⚠".yellow(), issue);
    }
}

/// Lineage command - upstream/downstream trees of one model
fn lineage_command(
    session: &mut Session,
    model: &str,
    depth: Option<usize>,
    direction: DirectionArg,
    format: Format,
) -> Result<()> {
    let lineage = session.trace_lineage(model, depth)?;

    match format {
        Format::Json => print_json(&serde_json::json!({
            "model": lineage.model,
            "depth": lineage.depth,
            "upstream": lineage.upstream,
            "downstream": lineage.downstream,
            "summary": lineage.summary(),
            "lineage_graph": lineage.graph(),
        })),
        Format::Text => {
            print_lineage(&lineage, direction);
            Ok(())
        }
    }
}

fn print_lineage(lineage: &Lineage, direction: DirectionArg) {
    let summary = lineage.summary();

    banner(&format!("Lineage: {}", lineage.model));
    println!("{} {}", "Total nodes:".bold(), summary.total_nodes);
    println!();

    if direction != DirectionArg::Downstream {
        println!("{}", "Upstream dependencies (what this model needs)".bold());
        if lineage.upstream.is_empty() {
            println!("{}", "No upstream dependencies".dimmed());
        } else {
            println!("{}", lineage.render(Direction::Upstream));
        }
        println!();
    }

    if direction != DirectionArg::Upstream {
        println!("{}", "Downstream dependents (what uses this model)".bold());
        if lineage.downstream.is_empty() {
            println!("{}", "No downstream dependents".dimmed());
        } else {
            println!("{}", lineage.render(Direction::Downstream));
        }
        println!();
    }

    println!("{}", "Summary".bold());
    println!(
        "  Upstream: {} models, {} sources",
        summary.upstream_models, summary.upstream_sources
    );
    println!("  Downstream: {} models depend on this", summary.downstream_models);
}

/// Graph command - every model and its direct references
fn graph_command(session: &mut Session, format: Format) -> Result<()> {
    let graph = session.graph(None)?;

    if format == Format::Json {
        return print_json(&serde_json::json!({
            "models": graph.forward(),
            "reverse": graph.reverse(),
            "issues": graph.issues(),
        }));
    }

    banner("Dependency Graph");
    println!("{} {}", "Models:".bold(), graph.len());
    println!();

    for (name, entry) in graph.forward() {
        println!("{} {}", name.green(), entry.path.display().to_string().dimmed());
        for parent in &entry.refs {
            println!("  {} {}", "ref".cyan(), parent);
        }
        for source in &entry.sources {
            println!("  {} {}", "source".yellow(), source);
        }
        let dependents = graph.children(name);
        if !dependents.is_empty() {
            println!("  {} {}", "used by".magenta(), dependents.join(", "));
        }
    }

    if !graph.issues().is_empty() {
        println!();
        println!("{} ({})", "Issues".bold(), graph.issues().len());
        for issue in graph.issues() {
            let marker = match issue.severity {
                Severity::Error => "✗".red(),
                Severity::Warn => "⚠".yellow(),
                Severity::Info => "ℹ".blue(),
            };
            println!("  {marker} {issue}");
        }
    }

    Ok(())
}

/// Init-config command - write the default configuration
fn init_config_command(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite it",
            output.display()
        );
    }

    Config::default()
        .save_to_file(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("{} {}", "✓ Wrote".green(), output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn lineage_arguments() {
        let cli = Cli::try_parse_from([
            "dbtlens", "--root", "proj", "lineage", "orders", "--depth", "2", "--direction", "upstream",
        ])
        .unwrap();

        assert_eq!(cli.root, PathBuf::from("proj"));
        match cli.command {
            Commands::Lineage { model, depth, direction } => {
                assert_eq!(model, "orders");
                assert_eq!(depth, Some(2));
                assert_eq!(direction, DirectionArg::Upstream);
            }
            _ => panic!("expected lineage command"),
        }
    }

    #[test]
    fn analyze_needs_file_or_sql() {
        assert!(Cli::try_parse_from(["dbtlens", "analyze"]).is_err());
        assert!(Cli::try_parse_from(["dbtlens", "analyze", "--sql", "select 1"]).is_ok());
        assert!(Cli::try_parse_from(["dbtlens", "analyze", "a.sql", "--sql", "select 1"]).is_err());
    }

    #[test]
    fn init_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join(CONFIG_FILE_NAME);

        init_config_command(&output, false).unwrap();
        assert!(Config::from_file(&output).is_ok());
        assert!(init_config_command(&output, false).is_err());
        assert!(init_config_command(&output, true).is_ok());
    }
}
