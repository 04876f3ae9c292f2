use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "hearth",
    about = "Homelab fleet power monitoring and reconciliation",
    version
)]
pub struct Cli {
    /// Path to the config file.
    #[arg(long, short, global = true, default_value = "hearth.yml", env = "HEARTH_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the controller and its periodic loops.
    Run,

    /// Validate the config file without starting anything.
    Check,
}
