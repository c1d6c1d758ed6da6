//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ptstream: persistent text streams.
///
/// Drives text streams whose output is delivered live and persisted in
/// chunks, so readers can always recover what was produced.
#[derive(Parser, Debug)]
#[command(name = "ptstream")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the stream database file.
    ///
    /// Defaults to `.ptstream/streams.db` in the current directory.
    #[arg(short, long, env = "PTSTREAM_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Enable verbose output (debug logging on stderr).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the stream database.
    ///
    /// Creates the database file and schema if they don't exist.
    Init {
        /// Force re-initialization (destroys existing data).
        #[arg(short, long)]
        force: bool,
    },

    /// Create a new pending stream and print its ID.
    Create,

    /// Show the status of a stream.
    Status {
        /// Stream ID.
        id: String,
    },

    /// Show the persisted text of a stream.
    Show {
        /// Stream ID.
        id: String,

        /// List individual chunks instead of the concatenated text.
        #[arg(short, long)]
        chunks: bool,
    },

    /// List streams.
    #[command(alias = "ls")]
    List {
        /// Only list streams with this status
        /// (pending, streaming, done, error, timeout).
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show database statistics.
    Stats,

    /// Mark stale pending/streaming streams as timed out.
    Sweep {
        /// Seconds without progress after which a stream is stale.
        #[arg(long, default_value = "1200")]
        stale_after: u64,
    },

    /// Drive a stream from a file or stdin, echoing text as it is produced.
    Run {
        /// Stream ID (must be pending).
        id: String,

        /// Input file (reads from stdin if not provided).
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Flush policy (sentence, sentence:<chars>, bytes:<n>,
        /// regex:<pattern>, every; combine with '+').
        #[arg(short, long, default_value = crate::flush::DEFAULT_POLICY)]
        policy: String,

        /// Delay between fragments in milliseconds.
        #[arg(long, default_value = "0")]
        delay_ms: u64,
    },

    /// Follow a stream, printing new text until it reaches a final status.
    Watch {
        /// Stream ID.
        id: String,

        /// Poll interval in milliseconds.
        #[arg(long, default_value = "250")]
        interval_ms: u64,
    },
}

impl Cli {
    /// Returns the database path, using the default if not specified.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::storage::DEFAULT_DB_PATH))
    }
}
