//! kvstash CLI
//!
//! Command-line tools for kvstash data directories.
//!
//! # Commands
//!
//! - `get` / `set` / `remove` - Read and write single raw values
//! - `keys` - List stored keys, optionally within a namespace
//! - `dump` - Print every entry of a scope
//! - `clear` - Clear a namespace, a scope, or everything
//! - `inspect` - Display per-scope statistics and migration versions

mod commands;

use clap::{Parser, Subcommand};
use commands::store::DataDir;
use kvstash_core::Scope;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const PASSPHRASE_ENV: &str = "KVSTASH_PASSPHRASE";

/// kvstash command-line tools.
#[derive(Parser)]
#[command(name = "kvstash")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Passphrase for the encrypted scope (falls back to KVSTASH_PASSPHRASE)
    #[arg(global = true, long)]
    passphrase: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the raw value stored under a key
    Get {
        /// Key to read
        key: String,

        /// Scope to read from (persistent, encrypted)
        #[arg(short, long, default_value = "persistent", value_parser = parse_scope)]
        scope: Scope,

        /// Print the payload of a TTL envelope instead of the envelope
        #[arg(short, long)]
        unwrap: bool,
    },

    /// Store a raw value under a key
    Set {
        /// Key to write
        key: String,

        /// Raw value, usually JSON
        value: String,

        /// Scope to write to (persistent, encrypted)
        #[arg(short, long, default_value = "persistent", value_parser = parse_scope)]
        scope: Scope,

        /// Expire the value after this many seconds
        #[arg(short, long)]
        ttl: Option<u64>,
    },

    /// Remove a key
    Remove {
        /// Key to remove
        key: String,

        /// Scope to remove from (persistent, encrypted)
        #[arg(short, long, default_value = "persistent", value_parser = parse_scope)]
        scope: Scope,
    },

    /// List stored keys
    Keys {
        /// Scope to list (persistent, encrypted)
        #[arg(short, long, default_value = "persistent", value_parser = parse_scope)]
        scope: Scope,

        /// Only list keys in this namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Print every entry of a scope
    Dump {
        /// Scope to dump (persistent, encrypted)
        #[arg(short, long, default_value = "persistent", value_parser = parse_scope)]
        scope: Scope,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Clear stored values
    Clear {
        /// Scope to clear (persistent, encrypted)
        #[arg(short, long, default_value = "persistent", value_parser = parse_scope)]
        scope: Scope,

        /// Only clear keys in this namespace
        #[arg(short, long, conflicts_with = "all")]
        namespace: Option<String>,

        /// Clear every stored scope and the biometric store
        #[arg(short, long)]
        all: bool,
    },

    /// Display per-scope statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn parse_scope(value: &str) -> Result<Scope, String> {
    value.parse::<Scope>().map_err(|err| err.to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("kvstash CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("kvstash core v{}", kvstash_core::VERSION);
        return Ok(());
    }

    let path = cli.path.ok_or("Data directory path required")?;
    let passphrase = cli
        .passphrase
        .or_else(|| std::env::var(PASSPHRASE_ENV).ok());
    let data = DataDir::open(&path, passphrase.as_deref())?;

    match cli.command {
        Commands::Get { key, scope, unwrap } => {
            commands::entry::get(&data, &key, scope, unwrap)?;
        }
        Commands::Set {
            key,
            value,
            scope,
            ttl,
        } => {
            commands::entry::set(&data, &key, &value, scope, ttl.map(Duration::from_secs))?;
        }
        Commands::Remove { key, scope } => {
            commands::entry::remove(&data, &key, scope)?;
        }
        Commands::Keys { scope, namespace } => {
            commands::list::keys(&data, scope, namespace.as_deref())?;
        }
        Commands::Dump { scope, format } => {
            commands::list::dump(&data, scope, &format)?;
        }
        Commands::Clear {
            scope,
            namespace,
            all,
        } => {
            commands::clear::run(&data, scope, namespace.as_deref(), all)?;
        }
        Commands::Inspect { format } => {
            commands::inspect::run(&data, &path, &format)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
