//! `foldershare config` subcommands. Read-only: the service never writes config.

mod show;

use crate::common::config::{config_path, AppConfig};
use anyhow::{Context, Result};

fn defaults_toml() -> Result<String> {
    toml::to_string_pretty(&AppConfig::default()).context("Failed to serialize default config")
}

pub fn run_config_path() -> Result<()> {
    show::write_path(&config_path(), &mut std::io::stdout().lock())
}

/// Prints the config file, or guidance on stderr when there is none.
pub fn run_config_show() -> Result<()> {
    let path = config_path();
    let source = show::read_source(&path)?;
    show::write_source(
        &path,
        &source,
        &mut std::io::stdout().lock(),
        &mut std::io::stderr().lock(),
    )
}

pub fn run_config_defaults() -> Result<()> {
    show::write_defaults(&config_path(), &defaults_toml()?, &mut std::io::stdout().lock())
}
