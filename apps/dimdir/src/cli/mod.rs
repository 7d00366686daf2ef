//! # Dimdir CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show index counts
//! - `ingest` - Ingest a text file as a document
//! - `search` - Find a sentence or token
//! - `resolve` - Resolve an address
//! - `link` - Create (or remove) a relation
//! - `eval` - Evaluate a formula
//! - `mappings` - List, add or remove collection mappings
//! - `pending` / `repair` / `sweep` - Blob store maintenance

mod commands;

use crate::config::{ConfigError, DimdirConfig};
use clap::{Parser, Subcommand};
use dimdir_core::{DimdirError, EntityKind};
use std::path::PathBuf;
use thiserror::Error;

pub use commands::*;

/// Failures surfaced by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Index(#[from] DimdirError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),
}

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Dimensional Directory
///
/// Content-addressable document index: every sentence stored once, every
/// occurrence addressable.
#[derive(Parser, Debug)]
#[command(name = "dimdir")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Show index status
    Status,

    /// Ingest a UTF-8 text file as one document
    Ingest {
        /// Path to the input file
        #[arg(short, long)]
        file: PathBuf,

        /// Collection long id
        #[arg(short, long)]
        long_id: String,

        /// Preferred short id for a new collection
        #[arg(short, long)]
        short_id: Option<String>,

        /// Document title
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Find documents containing a sentence, or occurrences of a token
    Search {
        /// Exact sentence text
        #[arg(long, conflicts_with = "token", required_unless_present = "token")]
        sentence: Option<String>,

        /// Single token
        #[arg(long)]
        token: Option<String>,
    },

    /// Resolve an address
    Resolve {
        address: String,

        /// Also report the relation between this address and the result
        #[arg(short, long)]
        relative_to: Option<String>,
    },

    /// Create a relation between two addresses
    Link {
        source: String,
        target: String,

        /// Relation type
        #[arg(short = 't', long = "type")]
        relation_type: String,

        /// Remove the relation instead
        #[arg(long)]
        remove: bool,
    },

    /// Evaluate a formula
    Eval {
        formula: String,

        /// Cell mapping `A1=<address>` (repeatable)
        #[arg(long = "cell")]
        cells: Vec<String>,

        /// Sheet column `B=<document id>` (repeatable)
        #[arg(long = "column")]
        columns: Vec<String>,

        /// Cell holding the formula, e.g. B3
        #[arg(long)]
        context: Option<String>,
    },

    /// Manage collection mappings
    Mappings {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// List units whose blob payload is missing
    Pending {
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
    },

    /// Re-mirror pending payloads from the relational store
    Repair {
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
    },

    /// Delete blob payloads that have no relational unit
    Sweep {
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
    },
}

#[derive(Subcommand, Debug)]
pub enum MappingAction {
    /// List all mappings
    List,

    /// Register a mapping
    Add {
        long_id: String,

        #[arg(short, long)]
        short_id: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Remove a mapping
    Remove { long_id: String },
}

fn parse_kind(raw: &str) -> Result<EntityKind, String> {
    raw.parse().map_err(|e: DimdirError| e.to_string())
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CliError> {
    let mut config = DimdirConfig::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let json = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&config, &host, port).await,
        Some(Commands::Status) | None => cmd_status(&config, json),
        Some(Commands::Ingest {
            file,
            long_id,
            short_id,
            title,
        }) => cmd_ingest(&config, json, &file, long_id, short_id, title),
        Some(Commands::Search { sentence, token }) => {
            cmd_search(&config, json, sentence.as_deref(), token.as_deref())
        }
        Some(Commands::Resolve {
            address,
            relative_to,
        }) => cmd_resolve(&config, json, &address, relative_to.as_deref()),
        Some(Commands::Link {
            source,
            target,
            relation_type,
            remove,
        }) => cmd_link(&config, json, &source, &target, &relation_type, remove),
        Some(Commands::Eval {
            formula,
            cells,
            columns,
            context,
        }) => cmd_eval(&config, json, formula, &cells, &columns, context),
        Some(Commands::Mappings { action }) => cmd_mappings(&config, json, action),
        Some(Commands::Pending { kind }) => cmd_pending(&config, json, kind),
        Some(Commands::Repair { kind }) => cmd_repair(&config, json, kind),
        Some(Commands::Sweep { kind }) => cmd_sweep(&config, json, kind),
    }
}
