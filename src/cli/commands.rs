//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

use crate::cli::output::{
    OutputFormat, format_body, format_created, format_run_summary, format_stats, format_status,
    format_stream_list, format_sweep,
};
use crate::cli::parser::{Cli, Commands};
use crate::core::{StreamBody, StreamId, StreamStatus};
use crate::error::{CommandError, Error, Result, StorageError};
use crate::storage::{ChunkStore, SqliteStore};
use crate::streaming::{
    Admission, CoordinatorConfig, NullSink, OutboundSink, Reclaimer, StreamCoordinator,
    WriterSink,
};
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Runtime;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

/// Executes the CLI command.
///
/// # Arguments
///
/// * `cli` - Parsed CLI arguments.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let db_path = cli.get_db_path();

    match &cli.command {
        Commands::Init { force } => cmd_init(&db_path, *force, format),
        Commands::Create => cmd_create(&db_path, format),
        Commands::Status { id } => cmd_status(&db_path, id, format),
        Commands::Show { id, chunks } => cmd_show(&db_path, id, *chunks, format),
        Commands::List { status } => cmd_list(&db_path, status.as_deref(), format),
        Commands::Stats => cmd_stats(&db_path, format),
        Commands::Sweep { stale_after } => cmd_sweep(&db_path, *stale_after, format),
        Commands::Run {
            id,
            file,
            policy,
            delay_ms,
        } => cmd_run(
            &db_path,
            id,
            file.as_deref(),
            policy,
            Duration::from_millis(*delay_ms),
            format,
        ),
        Commands::Watch { id, interval_ms } => {
            cmd_watch(&db_path, id, Duration::from_millis(*interval_ms), format)
        }
    }
}

/// Opens the store and ensures it's initialized.
fn open_store(db_path: &Path) -> Result<SqliteStore> {
    let store = SqliteStore::open(db_path)?;

    if !store.is_initialized()? {
        return Err(StorageError::NotInitialized.into());
    }

    Ok(store)
}

fn parse_id(id: &str) -> Result<StreamId> {
    Ok(id.parse::<StreamId>()?)
}

fn runtime() -> Result<Runtime> {
    Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to start async runtime: {e}")).into()
    })
}

/// Splits input text into word-boundary fragments, the way a token
/// generator would emit it.
fn split_fragments(text: &str) -> Vec<&str> {
    text.split_word_bounds().collect()
}

// ==================== Command Implementations ====================

fn cmd_init(db_path: &Path, force: bool, _format: OutputFormat) -> Result<String> {
    if db_path.exists() && !force {
        return Err(CommandError::ExecutionFailed(
            "Database already exists. Use --force to reinitialize.".to_string(),
        )
        .into());
    }

    if force && db_path.exists() {
        // WAL mode leaves sidecar files next to the database.
        for suffix in ["", "-wal", "-shm"] {
            let mut path = db_path.as_os_str().to_owned();
            path.push(suffix);
            let path = Path::new(&path);
            if path.exists() {
                std::fs::remove_file(path).map_err(|e| {
                    CommandError::ExecutionFailed(format!(
                        "Failed to remove existing database: {e}"
                    ))
                })?;
            }
        }
    }

    let store = SqliteStore::open(db_path)?;
    store.init()?;

    Ok(format!(
        "Initialized ptstream database at: {}\n",
        db_path.display()
    ))
}

fn cmd_create(db_path: &Path, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path)?;
    let id = store.create_stream()?;
    Ok(format_created(&id, format))
}

fn cmd_status(db_path: &Path, id: &str, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path)?;
    let id = parse_id(id)?;
    let status = store.get_status(&id)?;
    Ok(format_status(&id, status, format))
}

fn cmd_show(db_path: &Path, id: &str, chunks: bool, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path)?;
    let id = parse_id(id)?;
    let body = store.get_body(&id)?;

    let chunks = if chunks {
        Some(store.get_chunks(&id)?)
    } else {
        None
    };
    Ok(format_body(&id, &body, chunks.as_deref(), format))
}

fn cmd_list(db_path: &Path, status: Option<&str>, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path)?;
    let status = status
        .map(|s| {
            s.parse::<StreamStatus>()
                .map_err(|e| CommandError::InvalidArgument(format!("--status: {e}")))
        })
        .transpose()?;
    let streams = store.list_streams(status)?;
    Ok(format_stream_list(&streams, format))
}

fn cmd_stats(db_path: &Path, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path)?;
    let stats = store.stats()?;
    Ok(format_stats(&stats, format))
}

fn cmd_sweep(db_path: &Path, stale_after_secs: u64, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path)?;
    let reclaimed = Reclaimer::new(Arc::new(store))
        .stale_after(Duration::from_secs(stale_after_secs))
        .sweep()?;
    Ok(format_sweep(&reclaimed, format))
}

fn cmd_run(
    db_path: &Path,
    id: &str,
    file: Option<&Path>,
    policy: &str,
    delay: Duration,
    format: OutputFormat,
) -> Result<String> {
    let store = open_store(db_path)?;
    let id = parse_id(id)?;
    let config = CoordinatorConfig::from_policy_spec(policy)?;

    let text = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;
            input
        }
    };
    debug!(stream_id = %id, bytes = text.len(), policy, "running stream");

    // JSON output must stay parseable, so text is only echoed in text mode.
    let sink: Box<dyn OutboundSink> = match format {
        OutputFormat::Text => Box::new(WriterSink::new(tokio::io::stdout())),
        OutputFormat::Json => Box::new(NullSink),
    };

    let coordinator = StreamCoordinator::with_config(Arc::new(store), config);
    let summary = runtime()?.block_on(async {
        let admission = coordinator.begin_stream(
            &id,
            move |append| async move {
                for fragment in split_fragments(&text) {
                    append.append(fragment).await?;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Ok(())
            },
            sink,
        )?;

        match admission {
            Admission::Started(task) => task.wait().await,
            Admission::AlreadyStarted => Err(CommandError::ExecutionFailed(format!(
                "stream {id} was already started"
            ))
            .into()),
        }
    })?;

    Ok(format_run_summary(&id, &summary, format))
}

fn cmd_watch(db_path: &Path, id: &str, interval: Duration, format: OutputFormat) -> Result<String> {
    if interval.is_zero() {
        return Err(Error::Config {
            message: "watch interval must be > 0".to_string(),
        });
    }
    let store = open_store(db_path)?;
    let id = parse_id(id)?;
    let echo = format == OutputFormat::Text;

    let body: StreamBody = runtime()?.block_on(async {
        let mut stdout = tokio::io::stdout();
        let mut printed = 0;
        loop {
            let body = store.get_body(&id)?;
            // Chunks are append-only, so the text only ever grows.
            if echo && body.text.len() > printed {
                stdout.write_all(&body.text.as_bytes()[printed..]).await?;
                stdout.flush().await?;
                printed = body.text.len();
            }
            if body.is_final() {
                return Ok::<_, Error>(body);
            }
            tokio::time::sleep(interval).await;
        }
    })?;

    match format {
        OutputFormat::Text => Ok(format!("\n[{}]\n", body.status)),
        OutputFormat::Json => Ok(format_body(&id, &body, None, format)),
    }
}
