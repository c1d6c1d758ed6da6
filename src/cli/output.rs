//! Output formatting for CLI commands.
//!
//! Supports text and JSON output formats.

use crate::core::{Chunk, StreamBody, StreamId, StreamRecord, StreamStatus};
use crate::error::Error;
use crate::storage::traits::StorageStats;
use crate::streaming::RunSummary;
use serde::Serialize;
use std::fmt::Write;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Formats a newly created stream ID.
#[must_use]
pub fn format_created(id: &StreamId, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("{id}\n"),
        OutputFormat::Json => format_json(&serde_json::json!({
            "id": id,
            "status": StreamStatus::Pending,
        })),
    }
}

/// Formats the status of one stream.
#[must_use]
pub fn format_status(id: &StreamId, status: StreamStatus, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("{status}\n"),
        OutputFormat::Json => format_json(&serde_json::json!({
            "id": id,
            "status": status,
        })),
    }
}

/// Formats a stream body, optionally with its chunks.
#[must_use]
pub fn format_body(
    id: &StreamId,
    body: &StreamBody,
    chunks: Option<&[Chunk]>,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => match chunks {
            Some(chunks) => format_chunks_text(id, body.status, chunks),
            None => {
                let mut output = body.text.clone();
                if !output.is_empty() && !output.ends_with('\n') {
                    output.push('\n');
                }
                output
            }
        },
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct BodyOutput<'a> {
                id: &'a StreamId,
                status: StreamStatus,
                text: &'a str,
                #[serde(skip_serializing_if = "Option::is_none")]
                chunks: Option<&'a [Chunk]>,
            }
            format_json(&BodyOutput {
                id,
                status: body.status,
                text: &body.text,
                chunks,
            })
        }
    }
}

fn format_chunks_text(id: &StreamId, status: StreamStatus, chunks: &[Chunk]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Stream: {id} ({status})");
    let _ = writeln!(output, "{:<8} {:<10} Preview", "Chunk", "Size");
    output.push_str(&"-".repeat(60));
    output.push('\n');

    for chunk in chunks {
        let id = chunk.id.map_or_else(|| "-".to_string(), |i| i.to_string());
        let preview = chunk.preview(40).replace('\n', "\\n");
        let _ = writeln!(output, "{:<8} {:<10} {}", id, chunk.size(), preview);
    }
    output
}

/// Formats a stream list.
#[must_use]
pub fn format_stream_list(streams: &[StreamRecord], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_stream_list_text(streams),
        OutputFormat::Json => format_json(&streams),
    }
}

fn format_stream_list_text(streams: &[StreamRecord]) -> String {
    if streams.is_empty() {
        return "No streams found.\n".to_string();
    }

    let mut output = String::new();
    let _ = writeln!(
        output,
        "{:<38} {:<10} {:<8} Size",
        "ID", "Status", "Chunks"
    );
    output.push_str(&"-".repeat(70));
    output.push('\n');

    for stream in streams {
        let _ = writeln!(
            output,
            "{:<38} {:<10} {:<8} {}",
            stream.id,
            stream.status,
            stream.chunk_count,
            format_size(stream.text_size)
        );
    }
    output
}

/// Formats storage statistics.
#[must_use]
pub fn format_stats(stats: &StorageStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_stats_text(stats),
        OutputFormat::Json => format_json(stats),
    }
}

fn format_stats_text(stats: &StorageStats) -> String {
    let mut output = String::new();
    output.push_str("ptstream Status\n");
    output.push_str("===============\n\n");
    let _ = writeln!(output, "  Streams:       {}", stats.stream_count);
    let _ = writeln!(output, "    pending:     {}", stats.pending);
    let _ = writeln!(output, "    streaming:   {}", stats.streaming);
    let _ = writeln!(output, "    done:        {}", stats.done);
    let _ = writeln!(output, "    error:       {}", stats.error);
    let _ = writeln!(output, "    timeout:     {}", stats.timeout);
    let _ = writeln!(output, "  Chunks:        {}", stats.chunk_count);
    let _ = writeln!(output, "  Text size:     {} bytes", stats.total_text_size);
    let _ = writeln!(output, "  Schema:        v{}", stats.schema_version);
    if let Some(size) = stats.db_size {
        let _ = writeln!(output, "  DB size:       {size} bytes");
    }
    output
}

/// Formats the result of a stale-stream sweep.
#[must_use]
pub fn format_sweep(reclaimed: &[StreamId], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Timed out {} stale streams", reclaimed.len());
            for id in reclaimed {
                let _ = writeln!(output, "  {id}");
            }
            output
        }
        OutputFormat::Json => format_json(&serde_json::json!({
            "reclaimed": reclaimed,
        })),
    }
}

/// Formats the outcome of a `run`.
///
/// In text mode the produced text was already echoed live, so only a
/// trailing newline is added.
#[must_use]
pub fn format_run_summary(id: &StreamId, summary: &RunSummary, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => "\n".to_string(),
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct RunOutput<'a> {
                id: &'a StreamId,
                status: StreamStatus,
                #[serde(flatten)]
                summary: &'a RunSummary,
            }
            format_json(&RunOutput {
                id,
                status: StreamStatus::Done,
                summary,
            })
        }
    }
}

/// Formats an error for output.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json => format_json(&serde_json::json!({
            "error": error.to_string(),
            "not_found": error.is_not_found(),
        })),
    }
}

/// Formats a value as JSON.
fn format_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string()) + "\n"
}

/// Formats a byte size as human-readable.
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
