//! FTP transport using `suppaftp`'s blocking client.
//!
//! One connection per command: connect, log in, switch to binary, run the
//! command, quit. Nothing is kept open between calls.

use std::io;
use std::net::ToSocketAddrs;
use std::time::Duration;

use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};

use crate::config::types::{Credentials, ServerEndpoint, SyncConfig};
use crate::transport::{join_remote, Activity, FtpCommand, Payload, Reply, ReplyCode, Transport};

/// Transport talking to a real FTP server.
pub struct FtpTransport {
    server: ServerEndpoint,
    remote_base: String,
    credentials: Credentials,
    timeout: Duration,
    activity: Activity,
}

/// Why a command did not complete, with the best reply code available.
#[derive(Debug)]
struct CommandFailure {
    code: ReplyCode,
    message: String,
}

impl From<FtpError> for CommandFailure {
    fn from(err: FtpError) -> Self {
        let code = match &err {
            FtpError::UnexpectedResponse(response) => ReplyCode(response.status.code()),
            _ => ReplyCode::UNDEFINED,
        };
        CommandFailure {
            code,
            message: err.to_string(),
        }
    }
}

impl From<io::Error> for CommandFailure {
    fn from(err: io::Error) -> Self {
        CommandFailure {
            code: ReplyCode::UNDEFINED,
            message: err.to_string(),
        }
    }
}

impl FtpTransport {
    pub fn new(config: &SyncConfig) -> Self {
        if config.credentials.username != "anonymous" {
            tracing::debug!(
                server = %config.server.address(),
                "FTP sends credentials in plaintext"
            );
        }
        FtpTransport {
            server: config.server.clone(),
            remote_base: config.remote_path.clone(),
            credentials: config.credentials.clone(),
            timeout: config.timeout,
            activity: Activity::default(),
        }
    }

    /// Handle on the activity indicator refreshed by every command.
    pub fn activity(&self) -> Activity {
        self.activity.clone()
    }

    /// Full server-side path for a path relative to the mirror root.
    fn remote_path(&self, relative: &str) -> String {
        join_remote(&[&self.server.url_path, &self.remote_base, relative])
    }

    fn connect(&self) -> Result<FtpStream, CommandFailure> {
        let address = self
            .server
            .address()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| CommandFailure {
                code: ReplyCode::UNDEFINED,
                message: format!("could not resolve {}", self.server.address()),
            })?;

        let mut stream = FtpStream::connect_timeout(address, self.timeout)?;
        stream.get_ref().set_read_timeout(Some(self.timeout))?;
        stream.get_ref().set_write_timeout(Some(self.timeout))?;
        stream.login(&self.credentials.username, &self.credentials.password)?;
        stream.transfer_type(FileType::Binary)?;
        Ok(stream)
    }

    fn run(
        &self,
        command: FtpCommand,
        remote: &str,
        payload: Option<&Payload>,
    ) -> Result<Option<String>, CommandFailure> {
        let mut stream = self.connect()?;
        let result = dispatch(&mut stream, command, remote, payload);
        if let Err(e) = stream.quit() {
            tracing::trace!("QUIT failed: {}", e);
        }
        result
    }
}

fn dispatch(
    stream: &mut FtpStream,
    command: FtpCommand,
    remote: &str,
    payload: Option<&Payload>,
) -> Result<Option<String>, CommandFailure> {
    match command {
        FtpCommand::Upload => {
            let mut reader: Box<dyn io::Read + '_> = match payload {
                Some(payload) => payload.open()?,
                None => Box::new(io::empty()),
            };
            let written = stream.put_file(remote, &mut reader)?;
            tracing::trace!(bytes = written, "Upload stream closed");
            Ok(None)
        }
        FtpCommand::List => {
            let target = if remote.is_empty() { None } else { Some(remote) };
            let lines = stream.list(target)?;
            Ok(Some(lines.join("\n")))
        }
        FtpCommand::Delete => {
            stream.rm(remote)?;
            Ok(None)
        }
        FtpCommand::MakeDirectory => {
            stream.mkdir(remote)?;
            Ok(None)
        }
    }
}

impl Transport for FtpTransport {
    fn execute(&self, command: FtpCommand, path: &str, payload: Option<&Payload>) -> Reply {
        self.activity.touch();
        let remote = self.remote_path(path);

        match self.run(command, &remote, payload) {
            Ok(body) => {
                tracing::info!("{} {} success", command, path);
                Reply::success(command, body)
            }
            Err(failure) => {
                tracing::warn!("{} {} failure - {}", command, path, failure.message);
                Reply::failure(failure.code)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(url_path: &str, remote_path: &str) -> SyncConfig {
        SyncConfig {
            server: ServerEndpoint {
                host: "127.0.0.1".to_string(),
                // Port 9 (discard) is closed on test machines.
                port: 9,
                url_path: url_path.to_string(),
            },
            remote_path: remote_path.to_string(),
            local_root: PathBuf::from("/srv/site"),
            recursive: true,
            exclude: None,
            exclude_globs: Vec::new(),
            credentials: Credentials::anonymous(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn remote_path_joins_url_base_and_relative() {
        let transport = FtpTransport::new(&config("www", "/site/"));
        assert_eq!(transport.remote_path("img/a.png"), "www/site/img/a.png");
    }

    #[test]
    fn remote_path_without_bases() {
        let transport = FtpTransport::new(&config("", ""));
        assert_eq!(transport.remote_path("a.txt"), "a.txt");
        assert_eq!(transport.remote_path(""), "");
    }

    #[test]
    fn unreachable_server_yields_undefined_reply() {
        let transport = FtpTransport::new(&config("", ""));
        let reply = transport.execute(FtpCommand::List, "", None);
        assert_eq!(reply.code, ReplyCode::UNDEFINED);
        assert!(reply.body.is_none());
        assert!(!reply.is_success());
    }

    #[test]
    fn every_call_refreshes_activity() {
        let transport = FtpTransport::new(&config("", ""));
        let activity = transport.activity();
        assert!(!activity.is_active());
        let _ = transport.execute(FtpCommand::Delete, "gone.txt", None);
        assert!(activity.is_active());
    }

    #[test]
    fn server_reply_code_is_kept_on_failure() {
        let failure: CommandFailure = FtpError::ConnectionError(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "refused",
        ))
        .into();
        assert_eq!(failure.code, ReplyCode::UNDEFINED);
        assert!(failure.message.contains("refused"));
    }
}
