//! CLI layer for ptstream.
//!
//! Provides the command-line interface using clap, with commands for
//! initializing the store, creating, driving and inspecting streams.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
