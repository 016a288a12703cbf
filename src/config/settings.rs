//! Settings file loading and command-line overrides.
//!
//! The settings file is TOML. Every field may also be supplied on the command
//! line; a flag always wins over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::config::types::{Credentials, ServerEndpoint, SyncConfig};
use crate::error::MirrorError;

/// Environment variable consulted when no password is configured.
pub const PASSWORD_ENV: &str = "FTPMIRROR_PASSWORD";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// On-disk settings. Every field is optional so a file can hold a partial
/// configuration completed by flags.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    pub url: Option<String>,
    pub remote_path: Option<String>,
    pub local_path: Option<PathBuf>,
    pub recursive: Option<bool>,
    pub exclude: Option<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl SettingsFile {
    /// Load settings from `path`.
    ///
    /// An explicitly requested file must exist. The default location is
    /// optional and yields empty settings when absent.
    pub fn load(path: &Path, explicit: bool) -> Result<Self, MirrorError> {
        if !path.exists() {
            if explicit {
                return Err(MirrorError::Config(format!(
                    "Settings file not found: {}",
                    path.display()
                )));
            }
            tracing::debug!(path = %path.display(), "No settings file, using flags only");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let settings: SettingsFile = toml::from_str(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded settings file");
        Ok(settings)
    }
}

/// Typed command-line overrides applied on top of the settings file.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Overrides {
    /// FTP server URL (e.g. ftp://ftp.example.com/www)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Remote base directory below the server URL
    #[arg(long, global = true)]
    pub remote_path: Option<String>,

    /// Local directory to mirror
    #[arg(long, global = true)]
    pub local_path: Option<PathBuf>,

    /// Mirror subdirectories too
    #[arg(long, global = true, conflicts_with = "no_recursive")]
    pub recursive: bool,

    /// Mirror only the top level of the local directory
    #[arg(long, global = true)]
    pub no_recursive: bool,

    /// Regular expression of relative paths to leave alone
    #[arg(long, global = true)]
    pub exclude: Option<String>,

    /// Glob of relative paths to leave alone (can be repeated)
    #[arg(long = "exclude-glob", global = true, action = clap::ArgAction::Append)]
    pub exclude_globs: Vec<String>,

    /// FTP user name
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// FTP password (prefer the settings file or FTPMIRROR_PASSWORD)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Per-command network timeout in seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,
}

impl Overrides {
    fn recursive(&self) -> Option<bool> {
        match (self.recursive, self.no_recursive) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// Merge file settings and overrides into a validated `SyncConfig`.
pub fn resolve(file: &SettingsFile, overrides: &Overrides) -> Result<SyncConfig, MirrorError> {
    let raw_url = overrides
        .url
        .clone()
        .or_else(|| file.url.clone())
        .ok_or_else(|| MirrorError::Config("No server URL configured".to_string()))?;
    let server = parse_server_url(&raw_url)?;

    let local_root = overrides
        .local_path
        .clone()
        .or_else(|| file.local_path.clone())
        .ok_or_else(|| MirrorError::Config("No local path configured".to_string()))?;

    let mut exclude_globs = file.exclude_globs.clone();
    exclude_globs.extend(overrides.exclude_globs.iter().cloned());

    let username = overrides
        .username
        .clone()
        .or_else(|| file.username.clone())
        .filter(|u| !u.is_empty());
    let explicit_password = overrides.password.clone().or_else(|| file.password.clone());
    let credentials = resolve_credentials(username, explicit_password)?;

    Ok(SyncConfig {
        server,
        remote_path: overrides
            .remote_path
            .clone()
            .or_else(|| file.remote_path.clone())
            .unwrap_or_default(),
        local_root,
        recursive: overrides.recursive().or(file.recursive).unwrap_or(false),
        exclude: overrides
            .exclude
            .clone()
            .or_else(|| file.exclude.clone())
            .filter(|p| !p.is_empty()),
        exclude_globs,
        credentials,
        timeout: Duration::from_secs(
            overrides
                .timeout_secs
                .or(file.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        ),
    })
}

/// Password order: explicit value, `FTPMIRROR_PASSWORD`, interactive prompt.
/// Without a user name the login is anonymous and nothing is asked.
fn resolve_credentials(
    username: Option<String>,
    explicit_password: Option<String>,
) -> Result<Credentials, MirrorError> {
    let Some(username) = username else {
        return Ok(Credentials::anonymous());
    };

    let password = match explicit_password.or_else(|| std::env::var(PASSWORD_ENV).ok()) {
        Some(password) => password,
        None => rpassword::prompt_password(format!("FTP password for {}: ", username))
            .map_err(|e| MirrorError::Config(format!("Could not read password: {}", e)))?,
    };

    Ok(Credentials { username, password })
}

/// Parse an `ftp://host[:port]/path` URL into a `ServerEndpoint`.
pub fn parse_server_url(raw: &str) -> Result<ServerEndpoint, MirrorError> {
    let invalid = |reason: &str| MirrorError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "ftp" {
        return Err(invalid("scheme must be ftp"));
    }
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("missing host"))?
        .to_string();

    Ok(ServerEndpoint {
        host,
        port: url.port_or_known_default().unwrap_or(21),
        url_path: url.path().trim_matches('/').to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides_with_basics() -> Overrides {
        Overrides {
            url: Some("ftp://ftp.example.com/www".to_string()),
            local_path: Some(PathBuf::from("/srv/site")),
            ..Overrides::default()
        }
    }

    #[test]
    fn parse_url_with_default_port() {
        let endpoint = parse_server_url("ftp://ftp.example.com/www/").unwrap();
        assert_eq!(endpoint.host, "ftp.example.com");
        assert_eq!(endpoint.port, 21);
        assert_eq!(endpoint.url_path, "www");
    }

    #[test]
    fn parse_url_with_explicit_port_and_no_path() {
        let endpoint = parse_server_url("ftp://10.0.0.5:2121").unwrap();
        assert_eq!(endpoint.port, 2121);
        assert_eq!(endpoint.url_path, "");
    }

    #[test]
    fn parse_url_rejects_other_schemes() {
        let err = parse_server_url("https://example.com/").unwrap_err();
        assert!(format!("{}", err).contains("scheme must be ftp"));
    }

    #[test]
    fn parse_url_rejects_garbage() {
        assert!(parse_server_url("not a url").is_err());
    }

    #[test]
    fn resolve_from_overrides_only_is_anonymous() {
        let config = resolve(&SettingsFile::default(), &overrides_with_basics()).unwrap();
        assert_eq!(config.server.host, "ftp.example.com");
        assert_eq!(config.local_root, PathBuf::from("/srv/site"));
        assert_eq!(config.credentials.username, "anonymous");
        assert!(!config.recursive);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.exclude.is_none());
    }

    #[test]
    fn overrides_win_over_file() {
        let file = SettingsFile {
            url: Some("ftp://old.example.com".to_string()),
            local_path: Some(PathBuf::from("/old")),
            recursive: Some(false),
            exclude: Some("\\.bak$".to_string()),
            exclude_globs: vec!["*.log".to_string()],
            username: Some("deploy".to_string()),
            password: Some("from-file".to_string()),
            ..SettingsFile::default()
        };
        let overrides = Overrides {
            recursive: true,
            exclude_globs: vec!["cache/**".to_string()],
            ..overrides_with_basics()
        };

        let config = resolve(&file, &overrides).unwrap();
        assert_eq!(config.server.host, "ftp.example.com");
        assert_eq!(config.local_root, PathBuf::from("/srv/site"));
        assert!(config.recursive);
        assert_eq!(config.exclude.as_deref(), Some("\\.bak$"));
        assert_eq!(config.exclude_globs, vec!["*.log", "cache/**"]);
        assert_eq!(config.credentials.username, "deploy");
        assert_eq!(config.credentials.password, "from-file");
    }

    #[test]
    fn empty_exclude_means_no_exclusion() {
        let overrides = Overrides {
            exclude: Some(String::new()),
            ..overrides_with_basics()
        };
        let config = resolve(&SettingsFile::default(), &overrides).unwrap();
        assert!(config.exclude.is_none());
    }

    #[test]
    fn missing_url_is_config_error() {
        let overrides = Overrides {
            local_path: Some(PathBuf::from("/srv/site")),
            ..Overrides::default()
        };
        let err = resolve(&SettingsFile::default(), &overrides).unwrap_err();
        assert!(format!("{}", err).contains("No server URL"));
    }

    #[test]
    fn load_settings_file_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ftpmirror.toml");
        std::fs::write(
            &path,
            r#"
url = "ftp://ftp.example.com"
remote_path = "public_html"
local_path = "/srv/site"
recursive = true
exclude = "\\.git/"
exclude_globs = ["*.tmp"]
username = "deploy"
password = "secret"
"#,
        )
        .unwrap();

        let settings = SettingsFile::load(&path, true).unwrap();
        assert_eq!(settings.remote_path.as_deref(), Some("public_html"));
        assert_eq!(settings.recursive, Some(true));
        assert_eq!(settings.exclude.as_deref(), Some("\\.git/"));
        assert_eq!(settings.exclude_globs, vec!["*.tmp"]);
    }

    #[test]
    fn load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = SettingsFile::load(&dir.path().join("nope.toml"), true);
        assert!(result.is_err());
    }

    #[test]
    fn load_missing_default_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsFile::load(&dir.path().join("nope.toml"), false).unwrap();
        assert!(settings.url.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ftpmirror.toml");
        std::fs::write(&path, "hostname = \"x\"\n").unwrap();
        let err = SettingsFile::load(&path, true).unwrap_err();
        assert!(format!("{}", err).contains("Invalid settings file"));
    }
}
