//! In-memory transport and clock for exercising passes without a server.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::transport::{FtpCommand, Payload, Reply, ReplyCode, Transport};

use super::clock::Clock;
use super::scan::parent_of;

/// Clock that only moves when told to.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        FakeClock {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
struct Server {
    commands: Vec<(FtpCommand, String)>,
    listings: BTreeMap<String, Vec<String>>,
    probe_time: Option<NaiveDateTime>,
    failures: HashMap<FtpCommand, ReplyCode>,
    /// When set, uploads into a directory not in this set answer 553.
    directories: Option<BTreeSet<String>>,
    files: BTreeMap<String, Vec<u8>>,
}

/// Records every command and answers like a small, well-behaved server.
#[derive(Default)]
pub struct FakeTransport {
    server: Mutex<Server>,
}

impl FakeTransport {
    /// Uploaded probes appear in their directory's listing at `remote`.
    pub fn list_probe_at(&self, remote: NaiveDateTime) {
        self.server.lock().unwrap().probe_time = Some(remote);
    }

    pub fn add_listing(&self, dir: &str, line: &str) {
        self.server
            .lock()
            .unwrap()
            .listings
            .entry(dir.to_string())
            .or_default()
            .push(line.to_string());
    }

    /// Every `command` answers `550` from now on.
    pub fn fail_command(&self, command: FtpCommand) {
        self.fail_command_with(command, ReplyCode::FILE_UNAVAILABLE);
    }

    pub fn fail_command_with(&self, command: FtpCommand, code: ReplyCode) {
        self.server.lock().unwrap().failures.insert(command, code);
    }

    pub fn heal(&self) {
        self.server.lock().unwrap().failures.clear();
    }

    /// Start with only the root directory; uploads below a missing one get 553.
    pub fn require_directories(&self) {
        self.server.lock().unwrap().directories = Some(BTreeSet::new());
    }

    pub fn commands(&self) -> Vec<(FtpCommand, String)> {
        self.server.lock().unwrap().commands.clone()
    }

    pub fn count(&self, command: FtpCommand) -> usize {
        self.commands().iter().filter(|(c, _)| *c == command).count()
    }

    pub fn clear_commands(&self) {
        self.server.lock().unwrap().commands.clear();
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.server.lock().unwrap().files.get(path).cloned()
    }
}

fn directory_exists(dirs: &BTreeSet<String>, dir: &str) -> bool {
    dir.is_empty() || dirs.contains(dir)
}

impl Transport for FakeTransport {
    fn execute(&self, command: FtpCommand, path: &str, payload: Option<&Payload>) -> Reply {
        let mut server = self.server.lock().unwrap();
        server.commands.push((command, path.to_string()));

        if let Some(code) = server.failures.get(&command) {
            return Reply::failure(*code);
        }

        match command {
            FtpCommand::Upload => {
                let parent = parent_of(path).to_string();
                if let Some(dirs) = &server.directories {
                    if !directory_exists(dirs, &parent) {
                        return Reply::failure(ReplyCode::FILE_NAME_NOT_ALLOWED);
                    }
                }
                let mut bytes = Vec::new();
                if let Some(payload) = payload {
                    payload.open().unwrap().read_to_end(&mut bytes).unwrap();
                }
                if let Some(remote) = server.probe_time {
                    if path.contains("ftpmirror-probe-") {
                        let name = path.rsplit('/').next().unwrap_or(path);
                        let line = format!(
                            "-rw-r--r-- 1 ftp ftp {} {} {}",
                            bytes.len(),
                            remote.format("%b %e %H:%M"),
                            name
                        );
                        server.listings.entry(parent).or_default().push(line);
                    }
                }
                server.files.insert(path.to_string(), bytes);
                Reply::success(command, None)
            }
            FtpCommand::List => {
                let body = server
                    .listings
                    .get(path)
                    .map(|lines| lines.join("\r\n"))
                    .unwrap_or_default();
                Reply::success(command, Some(body))
            }
            FtpCommand::Delete => {
                if server.files.remove(path).is_none() {
                    return Reply::failure(ReplyCode::FILE_UNAVAILABLE);
                }
                Reply::success(command, None)
            }
            FtpCommand::MakeDirectory => {
                if let Some(dirs) = server.directories.as_mut() {
                    if !dirs.insert(path.to_string()) {
                        return Reply::failure(ReplyCode::FILE_UNAVAILABLE);
                    }
                }
                Reply::success(command, None)
            }
        }
    }
}
