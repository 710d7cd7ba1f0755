//! Command-line interface
//!
//! Runs federated queries over the SQLite sources declared in
//! `fedquery.toml`. Records are printed one JSON document per line.

use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

use fedquery_core::{Document, FederatedManager, FederatedQuery, Predicate, SourceQuery};
use serde_json::{Map, Value};

use crate::config::{Config, SourceConfig};
use crate::sqlite::SqliteProvider;

#[derive(Parser, Debug)]
#[command(name = "fedquery")]
#[command(about = "Query one record set spread over several SQLite databases", long_about = None)]
pub struct CliArgs {
    /// Directory containing fedquery.toml
    #[arg(short, long, default_value = ".")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Filtering and ordering shared by the query commands
#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Keep records matching field__lookup=value (repeatable)
    #[arg(long = "filter", value_name = "LOOKUP")]
    pub filters: Vec<String>,

    /// Drop records matching field__lookup=value (repeatable)
    #[arg(long = "exclude", value_name = "LOOKUP")]
    pub excludes: Vec<String>,

    /// Order by field, prefix with '-' for descending (repeatable)
    #[arg(long = "order-by", value_name = "FIELD", allow_hyphen_values = true)]
    pub order_by: Vec<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a fedquery.toml declaring the given sources
    Init {
        /// Source as name=path (repeatable, in iteration order)
        #[arg(long = "source", value_name = "NAME=PATH", required = true)]
        sources: Vec<String>,

        /// Source receiving inserts
        #[arg(long)]
        default_source: Option<String>,
    },

    /// List sources with their record counts
    Sources,

    /// Count matching records across all sources
    Count(QueryArgs),

    /// Print whether any record matches
    Exists(QueryArgs),

    /// Print matching records
    List {
        #[command(flatten)]
        query: QueryArgs,

        /// Stop after this many records
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the first matching record
    First(QueryArgs),

    /// Print the single matching record
    Get(QueryArgs),

    /// Insert a record given as a JSON object
    Insert {
        /// Record fields, e.g. '{"type": "hot"}'
        json: String,

        /// Target source (defaults to the configured default)
        #[arg(long)]
        source: Option<String>,
    },
}

/// Build the manager for `Document` records over the configured sources.
pub fn open_manager(config: &Config) -> anyhow::Result<FederatedManager<Document>> {
    let provider = SqliteProvider::from_config(config)?;
    let manager = FederatedManager::new(provider).with_sources(&config.source_names());
    Ok(match &config.default_source {
        Some(source) => manager.with_default_source(source.clone()),
        None => manager,
    })
}

/// Apply the command-line filters and ordering.
pub fn build_query(
    manager: &FederatedManager<Document>,
    args: &QueryArgs,
) -> anyhow::Result<FederatedQuery<Document>> {
    let mut query = manager.all()?;
    for expr in &args.filters {
        query = query.filter(Predicate::parse(expr)?);
    }
    for expr in &args.excludes {
        query = query.exclude(Predicate::parse(expr)?);
    }
    if !args.order_by.is_empty() {
        query = query.order_by(&args.order_by)?;
    }
    Ok(query)
}

/// Run `args.command`, writing results to `out`.
pub fn run(args: &CliArgs, out: &mut impl Write) -> anyhow::Result<()> {
    if let Command::Init {
        sources,
        default_source,
    } = &args.command
    {
        return init(args, sources, default_source.clone(), out);
    }

    let config = Config::load(&args.config)?;
    run_with_config(&config, &args.command, out)
}

/// Run a query command against an already loaded configuration.
pub fn run_with_config(
    config: &Config,
    command: &Command,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let manager = open_manager(config)?;
    execute(&manager, command, out)
}

fn init(
    args: &CliArgs,
    sources: &[String],
    default_source: Option<String>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut declared = Vec::with_capacity(sources.len());
    for spec in sources {
        let Some((name, path)) = spec.split_once('=') else {
            anyhow::bail!("Expected NAME=PATH, got '{}'", spec);
        };
        declared.push(SourceConfig {
            name: name.trim().to_string(),
            path: PathBuf::from(path.trim()),
        });
    }
    let mut config = Config::new(declared);
    config.default_source = default_source;
    config.validate()?;

    std::fs::create_dir_all(&args.config)?;
    config.save(&args.config)?;
    writeln!(
        out,
        "Wrote {}",
        args.config.join(crate::config::CONFIG_FILE_NAME).display()
    )?;
    Ok(())
}

/// Execute a query command against an opened manager.
pub fn execute(
    manager: &FederatedManager<Document>,
    command: &Command,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        Command::Init { .. } => anyhow::bail!("init does not run against sources"),
        Command::Sources => {
            for (source, count) in manager.all()?.count_by_source()? {
                writeln!(out, "{}", serde_json::json!({"source": source, "count": count}))?;
            }
        }
        Command::Count(query) => {
            writeln!(out, "{}", build_query(manager, query)?.count()?)?;
        }
        Command::Exists(query) => {
            writeln!(out, "{}", build_query(manager, query)?.exists()?)?;
        }
        Command::List { query, limit } => {
            let query = build_query(manager, query)?;
            let limit = limit.unwrap_or(usize::MAX);
            for record in query.iter().take(limit) {
                writeln!(out, "{}", serde_json::to_string(&record?)?)?;
            }
        }
        Command::First(query) => match build_query(manager, query)?.first()? {
            Some(record) => writeln!(out, "{}", serde_json::to_string(&record)?)?,
            None => writeln!(out, "null")?,
        },
        Command::Get(query) => {
            let record = build_query(manager, query)?.get(Predicate::All)?;
            writeln!(out, "{}", serde_json::to_string(&record)?)?;
        }
        Command::Insert { json, source } => {
            let fields: Map<String, Value> = serde_json::from_str(json)?;
            let record = match source {
                Some(source) => manager.using(source)?.create(fields)?,
                None => manager.create(fields)?,
            };
            writeln!(out, "{}", serde_json::to_string(&record)?)?;
        }
    }
    Ok(())
}
