//! QuidStore CLI
//!
//! Command-line tools for QuidStore document stores.
//!
//! # Commands
//!
//! - `inspect` - Display collections, document counts and sizes
//! - `verify` - Check that every document file decodes and matches its name
//! - `find` - Query a collection with a JSON filter
//! - `migrate` - Reconcile a collection with a schema file

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// QuidStore command-line tools.
#[derive(Parser)]
#[command(name = "quidstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store root directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display collections, document counts and sizes
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify that every document decodes and is named after its uuid
    Verify {
        /// Only check this collection
        #[arg(short, long)]
        collection: Option<String>,
    },

    /// Print the documents of a collection matching a filter
    Find {
        /// Collection name
        collection: String,

        /// Filter as JSON, e.g. '{"hp": {"$gt": 0}}'
        #[arg(short = 'q', long, default_value = "{}")]
        filter: String,

        /// Stop after this many documents
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Reconcile every document of a collection with a schema
    Migrate {
        /// Collection name
        collection: String,

        /// Schema file in the JSON shorthand
        #[arg(short, long)]
        schema: PathBuf,

        /// Report what would change without writing
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify { collection } => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path, collection.as_deref())?;
        }
        Commands::Find {
            collection,
            filter,
            limit,
        } => {
            let path = cli.path.ok_or("Store path required for find")?;
            commands::find::run(&path, &collection, &filter, limit)?;
        }
        Commands::Migrate {
            collection,
            schema,
            dry_run,
        } => {
            let path = cli.path.ok_or("Store path required for migrate")?;
            commands::migrate::run(&path, &collection, &schema, dry_run)?;
        }
        Commands::Version => {
            println!("QuidStore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("QuidStore Core v{}", quidstore_core::VERSION);
        }
    }

    Ok(())
}
