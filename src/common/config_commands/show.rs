use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// What `config show` found at the resolved location.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum ConfigSource {
    File(String),
    Missing,
}

pub(super) fn read_source(path: &Path) -> Result<ConfigSource> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(ConfigSource::File(text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ConfigSource::Missing),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to read config file {}", path.display()))
        }
    }
}

pub(super) fn write_path(path: &Path, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "{}", path.display())?;
    Ok(())
}

/// File contents go to `out`; guidance for a missing file goes to `notes`.
pub(super) fn write_source(
    path: &Path,
    source: &ConfigSource,
    out: &mut dyn Write,
    notes: &mut dyn Write,
) -> Result<()> {
    match source {
        ConfigSource::File(text) => out.write_all(text.as_bytes())?,
        ConfigSource::Missing => {
            writeln!(notes, "No config file at {}; built-in defaults apply.", path.display())?;
            writeln!(notes, "Run `foldershare config defaults` for a starting point.")?;
        }
    }
    Ok(())
}

pub(super) fn write_defaults(path: &Path, defaults: &str, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "# Save as {}", path.display())?;
    out.write_all(defaults.as_bytes())?;
    Ok(())
}
