use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "callrec")]
#[command(about = "Record a call with supervised capture", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Join a call and record it until stopped
    Record(RecordArgs),
    /// Print version information
    Version,
    /// Print the effective configuration as TOML
    Config,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RecordArgs {
    /// Meeting URL to join
    #[arg(long)]
    pub url: String,
    /// Name used for output files (defaults to the last segment of the URL)
    #[arg(long)]
    pub name: Option<String>,
    /// Account used to join the call
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    /// Override the configured output directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Override the configured restart budget
    #[arg(long)]
    pub max_restarts: Option<u32>,
}

impl RecordArgs {
    pub fn call_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }

        let path = self
            .url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .split("://")
            .last()
            .unwrap_or_default();

        path.split('/')
            .skip(1)
            .filter(|segment| !segment.is_empty())
            .last()
            .unwrap_or("call")
            .to_string()
    }
}
