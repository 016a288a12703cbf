//! Platform-specific config directory helpers.
//!
//! Uses the `dirs` crate to resolve platform-appropriate directories:
//! - Linux:   `~/.config/ftpmirror/`
//! - Windows: `%APPDATA%\ftpmirror\`
//! - macOS:   `~/Library/Application Support/ftpmirror/`

use std::path::PathBuf;

use crate::error::MirrorError;

/// File name of the settings file inside the config directory.
pub const SETTINGS_FILE: &str = "ftpmirror.toml";

/// Get the ftpmirror config directory. Does not create it.
pub fn config_dir() -> Result<PathBuf, MirrorError> {
    let base = dirs::config_dir()
        .ok_or_else(|| MirrorError::Config("Could not determine config directory".into()))?;
    Ok(base.join("ftpmirror"))
}

/// Default location of the settings file.
pub fn default_settings_path() -> Result<PathBuf, MirrorError> {
    Ok(config_dir()?.join(SETTINGS_FILE))
}
