use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Local root not found: {}", path.display())]
    LocalRootNotFound { path: PathBuf },

    #[error("Local root is not a directory: {}", path.display())]
    LocalRootNotDirectory { path: PathBuf },

    #[error("Invalid exclusion pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("Nothing to calibrate: the local inventory is empty")]
    NothingToCalibrate,
}

impl MirrorError {
    /// Returns a user-friendly suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            MirrorError::LocalRootNotFound { .. } => {
                Some("Check `local_path` in the settings file or pass --local-path.")
            }
            MirrorError::LocalRootNotDirectory { .. } => {
                Some("`local_path` must point at the directory to mirror, not a file.")
            }
            MirrorError::InvalidPattern { .. } => {
                Some("`exclude` is a regular expression (e.g. '\\.tmp$'); `exclude_globs` take globs (e.g. '**/*.log').")
            }
            MirrorError::Config(_) => {
                Some("Run with --config <file> or create ftpmirror.toml in the config directory.")
            }
            MirrorError::InvalidUrl { .. } => {
                Some("Use the form ftp://host[:port]/optional/base/path.")
            }
            MirrorError::Schedule(_) => {
                Some("Use a cron expression like '*/5 * * * *' or --interval <seconds>.")
            }
            MirrorError::NothingToCalibrate => {
                Some("Calibration needs at least one local file whose directory exists remotely.")
            }
            _ => None,
        }
    }
}

impl From<globset::Error> for MirrorError {
    fn from(err: globset::Error) -> Self {
        MirrorError::InvalidPattern {
            pattern: err.glob().map(|g| g.to_string()).unwrap_or_default(),
            reason: err.kind().to_string(),
        }
    }
}

impl From<toml::de::Error> for MirrorError {
    fn from(err: toml::de::Error) -> Self {
        MirrorError::Config(format!("Invalid settings file: {}", err))
    }
}

impl From<std::path::StripPrefixError> for MirrorError {
    fn from(err: std::path::StripPrefixError) -> Self {
        MirrorError::Io {
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, err),
        }
    }
}
