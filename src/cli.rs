///
/// This module implements the CLI of upload-sync: command parsing, wiring of the
/// HTTP transport and terminal prompt into the core synchronizer, and output.
///
/// All synchronization logic lives in the [`upload-sync-core`] crate; this module
/// is CLI glue only.
///
/// ## Commands
/// - `upload`: upload files into a field that starts with the given values
/// - `inspect`: show the file list and accept hint derived from the given values
/// - `remove`: remove one entry from the file list derived from the given values
///
/// Every command prints the resulting bound value and file list as JSON.
///
/// [`upload-sync-core`]: ../../upload_sync_core/
use crate::load_config::{load_config, CliConfig};
use crate::prompt::TerminalPrompt;
use crate::upload::HttpUploadTransport;
use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use upload_sync_core::{
    BoundValue, FileEntry, LocalFile, Notice, UploadEvent, UploadOutcome, UploadSynchronizer,
};

/// CLI for upload-sync: drive an upload field from the terminal.
#[derive(Parser)]
#[clap(
    name = "upload-sync",
    version,
    about = "Upload files and keep a form field's bound value in sync with them"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload files through the configured backend
    Upload {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Value the field starts with (repeat for multi-file fields)
        #[clap(long = "value")]
        values: Vec<String>,
        /// Files to upload
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show the file list derived from a bound value
    Inspect {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Bound value (repeat for multi-file fields)
        #[clap(long = "value")]
        values: Vec<String>,
    },
    /// Remove one entry, by position in the file list
    Remove {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Bound value (repeat for multi-file fields)
        #[clap(long = "value")]
        values: Vec<String>,
        /// Zero-based position of the entry to remove
        #[clap(long)]
        index: usize,
    },
}

#[derive(Serialize)]
struct Report<'a> {
    value: &'a BoundValue,
    files: &'a [FileEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    accept: Option<String>,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let result = match cli.command {
        Commands::Upload {
            config,
            values,
            files,
        } => {
            let config = load_config(config)?;
            upload(config, values, files).await
        }
        Commands::Inspect { config, values } => {
            let config = load_config(config)?;
            let sync = synchronizer(&config, values).build();
            print_report(&sync)
        }
        Commands::Remove {
            config,
            values,
            index,
        } => {
            let config = load_config(config)?;
            remove(config, values, index).await
        }
    };

    let exit_span = tracing::info_span!("exit");
    exit_span.in_scope(|| {
        tracing::info!(ok = result.is_ok(), "CLI command finished");
    });
    result
}

fn initial_value(config: &CliConfig, values: Vec<String>) -> BoundValue {
    BoundValue::Multiple(values).conform(config.field.mode())
}

fn synchronizer(
    config: &CliConfig,
    values: Vec<String>,
) -> upload_sync_core::UploadSynchronizerBuilder {
    UploadSynchronizer::builder(config.field.clone())
        .initial_value(initial_value(config, values))
        .prompt(Arc::new(TerminalPrompt))
}

async fn upload(config: CliConfig, values: Vec<String>, files: Vec<PathBuf>) -> Result<()> {
    let transport = HttpUploadTransport::from_settings(&config.api)?;
    let mut sync = synchronizer(&config, values)
        .transport(Arc::new(transport))
        .build();
    let mut events = sync
        .take_events()
        .ok_or_else(|| anyhow::anyhow!("event receiver already taken"))?;

    println!("Upload starting...");
    let mut tasks = Vec::new();
    for path in files {
        let file = match LocalFile::from_path(&path).await {
            Ok(file) => file,
            Err(e) => {
                tracing::error!(path = ?path, error = ?e, "Failed to read file");
                eprintln!("[ERROR] Cannot read {}: {}", path.display(), e);
                continue;
            }
        };
        match sync.add_file(file) {
            Ok(Some(task)) => tasks.push(task),
            Ok(None) => {}
            Err(e) => tracing::warn!(path = ?path, reason = %e, "File refused"),
        }
    }

    let outcomes = join_all(tasks.into_iter().map(|task| task.wait())).await;
    print_notices(&mut events);
    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, UploadOutcome::Failed(_)))
        .count();

    print_report(&sync)?;
    sync.shutdown();
    if failed > 0 {
        anyhow::bail!("{failed} of {} uploads failed", outcomes.len());
    }
    Ok(())
}

async fn remove(config: CliConfig, values: Vec<String>, index: usize) -> Result<()> {
    let mut sync = synchronizer(&config, values).build();
    let mut events = sync
        .take_events()
        .ok_or_else(|| anyhow::anyhow!("event receiver already taken"))?;

    let files = sync.file_list();
    let entry = files.get(index).ok_or_else(|| {
        tracing::error!(index, entries = files.len(), "No entry at index");
        anyhow::anyhow!("no entry at index {index} ({} entries)", files.len())
    })?;

    if sync.remove(&entry.uid).await {
        println!("Removed {}", entry.display_name);
    } else {
        println!("Kept {}", entry.display_name);
    }
    print_notices(&mut events);
    print_report(&sync)
}

fn print_notices(events: &mut UnboundedReceiver<UploadEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            UploadEvent::Notice {
                notice: Notice::Success(msg),
            } => println!("[OK] {msg}"),
            UploadEvent::Notice {
                notice: Notice::Error(msg),
            } => eprintln!("[ERROR] {msg}"),
            UploadEvent::StatusChanged { entry } => {
                tracing::debug!(uid = %entry.uid, status = ?entry.status, "Status changed")
            }
            other => tracing::debug!(event = ?other, "Upload event"),
        }
    }
}

fn print_report(sync: &UploadSynchronizer) -> Result<()> {
    let value = sync.bound_value();
    let files = sync.file_list();
    let report = Report {
        value: &value,
        files: &files,
        accept: sync.accept_str(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
