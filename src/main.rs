use anyhow::Result;
use callrec::{
    app,
    cli::{handle_config_command, load_config, Cli, CliCommand},
    recording::ServiceStatus,
};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        CliCommand::Version => {
            println!("callrec {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Config => {
            handle_config_command(cli.config.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Record(args) => {
            let config = load_config(cli.config.as_deref())?;
            match app::run_recording(config, args).await? {
                ServiceStatus::Finished => Ok(ExitCode::SUCCESS),
                ServiceStatus::Error => Ok(ExitCode::FAILURE),
            }
        }
    }
}
