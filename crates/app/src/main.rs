mod commands;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use services::{CollectionService, CollectionWorker, SqliteCollectionRepository};
use shared::CollectionError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const LOG_ENV: &str = "GHOSTMAN_LOG";

#[derive(Parser)]
#[clap(author, version, about = "Manage Ghostman file collections")]
struct Cli {
    /// Directory holding collections.db
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Print collections as JSON
    #[clap(long, global = true)]
    json: bool,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty collection
    Create {
        name: String,
        #[clap(short, long)]
        description: Option<String>,
        #[clap(short, long, value_delimiter = ',')]
        tags: Vec<String>,
        #[clap(long)]
        chunk_size: Option<u32>,
        #[clap(long)]
        chunk_overlap: Option<u32>,
        #[clap(long)]
        max_size_mb: Option<u32>,
        /// Mark the collection as a reusable template
        #[clap(long)]
        template: bool,
    },
    List {
        /// Include template collections
        #[clap(long)]
        templates: bool,
        #[clap(long = "tag", value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Show a collection and its files
    Show { collection: String },
    Update {
        collection: String,
        #[clap(long)]
        name: Option<String>,
        #[clap(short, long)]
        description: Option<String>,
        #[clap(short, long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
        #[clap(long)]
        chunk_size: Option<u32>,
        #[clap(long)]
        chunk_overlap: Option<u32>,
        #[clap(long)]
        max_size_mb: Option<u32>,
    },
    Delete { collection: String },
    /// Add files to a collection
    Add {
        collection: String,
        #[clap(required = true)]
        files: Vec<PathBuf>,
        /// Skip the lookup for identical content in other collections
        #[clap(long)]
        no_duplicate_check: bool,
    },
    Remove { collection: String, file_id: Uuid },
    /// Re-hash files and report changes
    Verify {
        collection: String,
        #[clap(long)]
        file: Option<Uuid>,
    },
    /// List the built-in templates
    Templates,
    /// Create a collection from a built-in template
    Instantiate {
        template: String,
        name: String,
        files: Vec<PathBuf>,
    },
    Export {
        collection: String,
        output: PathBuf,
        /// Write only the manifest
        #[clap(long)]
        no_files: bool,
    },
    Import {
        archive: PathBuf,
        #[clap(long)]
        name: Option<String>,
        /// Extract the archived files into this directory and add them
        #[clap(long)]
        restore_to: Option<PathBuf>,
    },
    Attach { conversation: String, collection: String },
    Detach { conversation: String, collection: String },
    /// Collections attached to a conversation
    Conversation { conversation: String },
    Search {
        query: String,
        #[clap(long = "tag", value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Content stored more than once across collections
    Duplicates,
}

fn setup_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let (settings, settings_problem) = config::load_settings_or_default();
    setup_logging(&settings.log_filter);
    if let Some(problem) = settings_problem {
        warn!("{}", problem);
    }

    let data_dir = config::resolve_data_dir(&settings, args.data_dir.as_deref())?;
    let repository = SqliteCollectionRepository::open(&data_dir)
        .with_context(|| format!("Failed to open collection store in {}", data_dir.display()))?;
    info!(path = %data_dir.display(), "using collection store");

    let worker = CollectionWorker::start(
        CollectionService::new(Arc::new(repository)),
        settings.worker_threads,
    )
    .context("Failed to start collection worker")?;

    let result = commands::execute(&worker, &settings, args.json, args.command);
    worker.shutdown();

    if let Err(e) = &result {
        if let Some(err) = e.downcast_ref::<CollectionError>() {
            eprintln!("Error: {}", err);
            std::process::exit(exit_code(err));
        }
    }
    result
}

fn exit_code(err: &CollectionError) -> i32 {
    if err.is_validation() {
        2
    } else if err.is_not_found() {
        3
    } else {
        1
    }
}
