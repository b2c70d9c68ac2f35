use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pxs", version, about = "PXE netboot stack supervisor")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render configs, launch the daemon stack and supervise it
    Start {
        /// Load environment overrides from this file before resolving config
        #[arg(long)]
        env_file: Option<PathBuf>,
    },
    /// Run the health battery once; the exit code reports the result
    Health {
        /// Emit the report as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Render and validate configs and stage boot files, then exit
    Render,
}
