//! ctxlog command line
//!
//! Offline access to recorded entry streams.
//!
//! ```text
//! ctxlog import --stream capture.jsonl --store entries.jsonl
//! ctxlog query  --store entries.jsonl --type MethodCallEntry --failed
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ctxlog::entry::{Entry, EntryType};
use ctxlog::io::restriction;
use ctxlog::io::{EntryCriteria, IOEntry, IOEntryManager};
use ctxlog::protocol::EntryReader;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Context logger - record and query captured diagnostic entries
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a captured live stream into a record store
    Import {
        /// Captured stream (line-delimited records)
        #[arg(long)]
        stream: PathBuf,

        /// Record store to append to
        #[arg(long, env = "CTXLOG_STORE")]
        store: PathBuf,
    },

    /// Query a record store
    Query(QueryArgs),
}

#[derive(ClapArgs, Debug)]
struct QueryArgs {
    /// Record store to read
    #[arg(long, env = "CTXLOG_STORE")]
    store: PathBuf,

    /// Entry type, e.g. MessageEntry or MethodCallEntry
    #[arg(long = "type")]
    entry_type: Option<EntryType>,

    /// Text the entry message must contain
    #[arg(long)]
    contains: Option<String>,

    /// Regular expression the entry message must match
    #[arg(long)]
    matches: Option<String>,

    /// Intercepted method name
    #[arg(long)]
    method: Option<String>,

    /// SQL bind parameter index
    #[arg(long)]
    param_index: Option<u32>,

    /// Correlation id the entry was captured under
    #[arg(long)]
    correlation: Option<String>,

    /// Only failures
    #[arg(long)]
    failed: bool,

    /// Print only the first match
    #[arg(long, conflicts_with_all = ["last", "unique"])]
    first: bool,

    /// Print only the last match
    #[arg(long, conflicts_with = "unique")]
    last: bool,

    /// Require at most one match
    #[arg(long)]
    unique: bool,

    /// Print entries as JSON lines
    #[arg(long)]
    json: bool,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    match args.command {
        Command::Import { stream, store } => import(stream, store),
        Command::Query(query_args) => query(query_args),
    }
}

fn import(stream: PathBuf, store: PathBuf) -> anyhow::Result<()> {
    let reader = EntryReader::open(&stream)
        .with_context(|| format!("failed to open stream {}", stream.display()))?;
    let manager = IOEntryManager::open(&store)
        .with_context(|| format!("failed to open store {}", store.display()))?;

    let imported = manager
        .import(reader)
        .with_context(|| format!("failed to import {}", stream.display()))?;

    info!(
        stream = %stream.display(),
        store = %store.display(),
        imported,
        "Import complete"
    );
    Ok(())
}

fn query(args: QueryArgs) -> anyhow::Result<()> {
    if !args.store.exists() {
        bail!("store {} does not exist", args.store.display());
    }
    let manager = IOEntryManager::open(&args.store)
        .with_context(|| format!("failed to open store {}", args.store.display()))?;
    let criteria = build_criteria(&manager, &args)?;
    debug!(?criteria, "Running query");

    let results: Vec<IOEntry> = if args.first {
        criteria.first_result()?.into_iter().collect()
    } else if args.last {
        criteria.last_result()?.into_iter().collect()
    } else if args.unique {
        criteria.unique_result()?.into_iter().collect()
    } else {
        criteria.list()?
    };

    for record in &results {
        if args.json {
            println!("{}", serde_json::to_string(record)?);
        } else {
            println!("{}", summarize(record));
        }
    }

    info!(matched = results.len(), "Query complete");
    Ok(())
}

fn build_criteria<'a>(manager: &'a IOEntryManager, args: &QueryArgs) -> anyhow::Result<EntryCriteria<'a>> {
    let mut criteria = manager.create_criteria();

    if let Some(entry_type) = args.entry_type {
        criteria = criteria.add(restriction::entry_type(entry_type));
    }
    if let Some(text) = &args.contains {
        criteria = criteria.add(restriction::message_contains(text.clone()));
    }
    if let Some(pattern) = &args.matches {
        criteria = criteria.add(restriction::message_matches(pattern)?);
    }
    if let Some(method) = &args.method {
        criteria = criteria.add(restriction::method_name(method.clone()));
    }
    if let Some(index) = args.param_index {
        criteria = criteria.add(restriction::sql_parameter_index(index));
    }
    if let Some(correlation) = &args.correlation {
        criteria = criteria.correlation(correlation.as_str());
    }
    if args.failed {
        criteria = criteria.add(restriction::has_exception());
    }

    Ok(criteria)
}

/// One-line human summary of a record.
fn summarize(record: &IOEntry) -> String {
    let detail = match &record.entry {
        Entry::MethodCall(call) => {
            let outcome = match &call.exception {
                Some(e) => format!("failed: {}", e.message.as_deref().unwrap_or("?")),
                None => call
                    .returned_value
                    .as_deref()
                    .and_then(Entry::message)
                    .map(|v| format!("returned {}", v))
                    .unwrap_or_default(),
            };
            format!("{} {}", call.signature, outcome)
        }
        Entry::SqlParameter(param) => format!(
            "{} #{} = {}",
            param.call.method_name(),
            param.index.map(|i| i.to_string()).unwrap_or_default(),
            param.value().and_then(|v| v.str_value.as_deref()).unwrap_or("null")
        ),
        other => other.message().unwrap_or_default().to_string(),
    };

    let elapsed = record
        .entry
        .elapse_time()
        .map(|e| format!(" ({})", e.pretty_elapsed()))
        .unwrap_or_default();

    format!(
        "{}\t{}\t{}\t{}\t{}{}",
        record.id,
        record.date.to_rfc3339(),
        record.correlation,
        record.entry.type_name(),
        detail,
        elapsed
    )
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
