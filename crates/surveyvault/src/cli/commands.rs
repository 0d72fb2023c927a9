//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Port to listen on (overrides configuration)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind (overrides configuration)
    #[arg(long)]
    pub host: Option<String>,
}

/// Anonymized record commands.
#[derive(Debug, Subcommand)]
pub enum RecordCommand {
    /// Print the anonymized record stored under an identity
    Show {
        /// Submission identity (32 lowercase hex characters)
        identity: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Stats command arguments.
#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
