pub mod args;

use crate::config::Config;
use anyhow::Result;
use std::path::Path;

pub use args::{Cli, CliCommand, RecordArgs};

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

pub fn handle_config_command(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    print!("{}", config.to_toml()?);
    Ok(())
}
