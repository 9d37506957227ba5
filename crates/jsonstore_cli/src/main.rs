//! jsonstore CLI
//!
//! Command-line tools for inspecting and editing per-user document stores.
//!
//! # Commands
//!
//! - `info` - List collections with their document and pending-change counts
//! - `provision` - Create or extend a collection
//! - `add` / `find` / `count` / `remove` - Work with documents
//! - `dirty` / `mark-clean` - Inspect and acknowledge pending changes
//! - `drop` - Drop a collection
//! - `change-password` - Rotate the data key under a new password
//! - `destroy` - Delete a user's store directory

mod commands;

use clap::{Parser, Subcommand};
use commands::Context;
use jsonstore_core::DEFAULT_USERNAME;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// jsonstore command-line tools.
#[derive(Parser)]
#[command(name = "jsonstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Application root holding one directory per user
    #[arg(global = true, short, long, default_value = ".")]
    root: PathBuf,

    /// Owner of the store
    #[arg(global = true, short, long, default_value = DEFAULT_USERNAME)]
    username: String,

    /// Password protecting the store's data key
    #[arg(global = true, short, long)]
    password: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List collections with document and pending-change counts
    Info,

    /// Create a collection or extend an existing one
    Provision {
        /// Collection name
        collection: String,

        /// Search fields, e.g. `name:string,age:integer`
        #[arg(short, long, default_value = "")]
        fields: String,

        /// Additional search fields supplied by the caller at store time
        #[arg(short, long, default_value = "")]
        additional: String,

        /// Drop and recreate the collection if the fields are incompatible
        #[arg(long)]
        allow_destructive: bool,
    },

    /// Store documents
    Add {
        /// Collection name
        collection: String,

        /// A JSON object or an array of objects
        documents: String,

        /// Store the documents without marking them dirty
        #[arg(long)]
        clean: bool,
    },

    /// Find documents
    Find {
        /// Collection name
        collection: String,

        /// A JSON object or an array of objects; omit to list everything
        query: Option<String>,

        /// Match values exactly instead of by substring
        #[arg(short, long)]
        exact: bool,

        /// Maximum number of documents
        #[arg(short, long)]
        limit: Option<u64>,

        /// Number of documents to skip
        #[arg(short, long)]
        offset: Option<u64>,

        /// Sort keys, e.g. `age:desc,name`
        #[arg(short, long)]
        sort: Option<String>,
    },

    /// Count documents
    Count {
        /// Collection name
        collection: String,

        /// A JSON object or an array of objects; omit to count everything
        query: Option<String>,

        /// Match values exactly instead of by substring
        #[arg(short, long)]
        exact: bool,
    },

    /// Remove the documents matching a query
    Remove {
        /// Collection name
        collection: String,

        /// A JSON object or an array of objects
        query: String,

        /// Match values exactly instead of by substring
        #[arg(short, long)]
        exact: bool,

        /// Delete the rows instead of recording pending removals
        #[arg(long)]
        clean: bool,
    },

    /// List documents with pending changes, oldest first
    Dirty {
        /// Collection name
        collection: String,
    },

    /// Acknowledge a synchronized change
    MarkClean {
        /// Collection name
        collection: String,

        /// Document id
        id: i64,

        /// Operation that was synchronized (add, replace, remove)
        operation: String,
    },

    /// Drop a collection and its documents
    Drop {
        /// Collection name
        collection: String,
    },

    /// Rotate the data key and protect it with a new password
    ChangePassword {
        /// The new password
        #[arg(short, long)]
        new_password: String,
    },

    /// Delete the user's store directory with all data
    Destroy {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::new(cli.root, cli.username, cli.password);

    match cli.command {
        Commands::Info => commands::collections::info(&ctx)?,
        Commands::Provision {
            collection,
            fields,
            additional,
            allow_destructive,
        } => commands::collections::provision(
            &ctx,
            &collection,
            &fields,
            &additional,
            allow_destructive,
        )?,
        Commands::Add {
            collection,
            documents,
            clean,
        } => commands::documents::add(&ctx, &collection, &documents, !clean)?,
        Commands::Find {
            collection,
            query,
            exact,
            limit,
            offset,
            sort,
        } => commands::documents::find(
            &ctx,
            &collection,
            query.as_deref(),
            commands::find_options(exact, limit, offset, sort.as_deref())?,
        )?,
        Commands::Count {
            collection,
            query,
            exact,
        } => commands::documents::count(&ctx, &collection, query.as_deref(), exact)?,
        Commands::Remove {
            collection,
            query,
            exact,
            clean,
        } => commands::documents::remove(&ctx, &collection, &query, exact, !clean)?,
        Commands::Dirty { collection } => commands::sync::dirty(&ctx, &collection)?,
        Commands::MarkClean {
            collection,
            id,
            operation,
        } => commands::sync::mark_clean(&ctx, &collection, id, &operation)?,
        Commands::Drop { collection } => commands::collections::drop_collection(&ctx, &collection)?,
        Commands::ChangePassword { new_password } => {
            commands::admin::change_password(&ctx, &new_password)?;
        }
        Commands::Destroy { yes } => {
            if !yes {
                return Err("refusing to destroy the store without --yes".into());
            }
            commands::admin::destroy(&ctx)?;
        }
    }

    Ok(())
}
