//! Single-command FTP execution.
//!
//! A `Transport` runs exactly one command against one remote path and reports
//! the outcome as a `Reply`. Failures are values, never errors: callers decide
//! what a non-success code means for them.

pub mod ftp;

use std::fmt;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub use ftp::FtpTransport;

/// How long the activity indicator stays lit after a command.
const ACTIVITY_FLASH: Duration = Duration::from_secs(5);

/// The FTP operations the mirror needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FtpCommand {
    Upload,
    List,
    Delete,
    MakeDirectory,
}

impl FtpCommand {
    /// Wire verb, used in log lines.
    pub fn verb(&self) -> &'static str {
        match self {
            FtpCommand::Upload => "STOR",
            FtpCommand::List => "LIST",
            FtpCommand::Delete => "DELE",
            FtpCommand::MakeDirectory => "MKD",
        }
    }

    /// Reply code the server sends when the command completes normally.
    ///
    /// The client only reports success after reading the completion reply it
    /// expects, without handing the reply back, so successful replies carry
    /// this nominal code. A transfer may in fact have closed with 250
    /// instead of 226.
    pub fn success_code(&self) -> ReplyCode {
        match self {
            FtpCommand::Upload | FtpCommand::List => ReplyCode::CLOSING_DATA_CONNECTION,
            FtpCommand::Delete => ReplyCode::FILE_ACTION_OK,
            FtpCommand::MakeDirectory => ReplyCode::PATH_CREATED,
        }
    }
}

impl fmt::Display for FtpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Numeric FTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(pub u32);

impl ReplyCode {
    /// No reply was received from the server.
    pub const UNDEFINED: ReplyCode = ReplyCode(0);
    pub const CLOSING_DATA_CONNECTION: ReplyCode = ReplyCode(226);
    pub const FILE_ACTION_OK: ReplyCode = ReplyCode(250);
    pub const PATH_CREATED: ReplyCode = ReplyCode(257);
    #[cfg(test)]
    pub const FILE_UNAVAILABLE: ReplyCode = ReplyCode(550);
    /// Requested action not taken, file name not allowed. Servers answer
    /// this to STOR when a parent directory is missing.
    pub const FILE_NAME_NOT_ALLOWED: ReplyCode = ReplyCode(553);

    /// First code of the transient/permanent failure ranges.
    const FAILURE_THRESHOLD: u32 = 400;

    /// A real server reply below 400. `UNDEFINED` is never a success.
    pub fn is_success(&self) -> bool {
        *self != Self::UNDEFINED && self.0 < Self::FAILURE_THRESHOLD
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::UNDEFINED {
            f.write_str("undefined")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: ReplyCode,
    /// Full listing text for `List`; `None` otherwise or on failure.
    pub body: Option<String>,
}

impl Reply {
    /// Successful completion of `command`, with its nominal
    /// [`FtpCommand::success_code`] rather than a code read off the wire.
    pub fn success(command: FtpCommand, body: Option<String>) -> Self {
        Self {
            code: command.success_code(),
            body,
        }
    }

    pub fn failure(code: ReplyCode) -> Self {
        Self { code, body: None }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

/// Request body for an upload. Opened lazily, once the connection is up.
#[derive(Debug, Clone)]
pub enum Payload {
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        match self {
            Payload::File(path) => Ok(Box::new(io::BufReader::new(std::fs::File::open(path)?))),
            Payload::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.as_slice()))),
        }
    }
}

/// Executes one FTP command against a path relative to the configured remote base.
pub trait Transport: Send + Sync {
    fn execute(&self, command: FtpCommand, path: &str, payload: Option<&Payload>) -> Reply;
}

/// Deadline-based "something is happening" indicator refreshed by every command.
#[derive(Debug, Clone, Default)]
pub struct Activity {
    deadline: Arc<Mutex<Option<Instant>>>,
}

impl Activity {
    pub fn touch(&self) {
        let mut deadline = self.deadline.lock().unwrap_or_else(|e| e.into_inner());
        *deadline = Some(Instant::now() + ACTIVITY_FLASH);
    }

    pub fn is_active(&self) -> bool {
        let deadline = self.deadline.lock().unwrap_or_else(|e| e.into_inner());
        deadline.map_or(false, |d| Instant::now() < d)
    }
}

/// Join remote path pieces with `/`, dropping empty segments and normalizing
/// backslashes. The result never starts or ends with a slash.
pub fn join_remote(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|part| part.split(['/', '\\']))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
