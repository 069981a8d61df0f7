// Session module - 设备会话模块
// 从设备获取配置文本；审计核心只消费结果文本

pub mod telnet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::config::ConfigDocument;
use crate::error::Result;

pub use telnet::TelnetSession;

/// Where and as whom to connect. `username` and `password` answer the
/// device's login prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub hostname: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionInfo {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: None,
            username: None,
            password: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }
}

/// Session tuning. Every field has a default, so a partial YAML/JSON
/// document is enough to override one setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Connection attempts before giving up.
    pub max_session_tries: u32,
    /// Settle time after a command before the output is read.
    pub command_timeout_ms: u64,
    /// Limit for each connection attempt.
    pub open_session_timeout_ms: u64,
    /// Appended to outgoing commands that do not already end with it.
    pub eol: String,
    /// Bytes requested per read.
    pub max_buffer_length: usize,
    /// Reads per drain before the output is considered complete.
    pub max_buffer_cycle: usize,
    pub default_port: u16,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_session_tries: 3,
            command_timeout_ms: 3_000,
            open_session_timeout_ms: 5_000,
            eol: "\n".to_string(),
            max_buffer_length: 9_999,
            max_buffer_cycle: 10,
            default_port: 23,
        }
    }
}

impl SessionOptions {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn open_session_timeout(&self) -> Duration {
        Duration::from_millis(self.open_session_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// The last connect, read or write failed; only `reconnect` recovers.
    Failed,
}

/// Output captured from the remote side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub stdout: String,
    pub stderr: String,
}

/// A persistent session with a network device.
///
/// State changes are explicit: `send_command` never reconnects on its own.
#[async_trait]
pub trait RemoteSession: Send {
    fn state(&self) -> ConnectionState;

    /// Opens the session and returns whatever the device sent first
    /// (banner, prompt).
    async fn connect(&mut self) -> Result<Response>;

    /// Drops any current connection and connects again.
    async fn reconnect(&mut self) -> Result<Response>;

    async fn send_command(&mut self, command: &str, timeout: Option<Duration>) -> Result<Response>;

    fn last_response(&self) -> Option<&Response>;
}

/// `command` terminated with `eol`, unless it already is.
pub fn with_eol(command: &str, eol: &str) -> String {
    if command.ends_with(eol) {
        command.to_string()
    } else {
        format!("{}{}", command, eol)
    }
}

/// Sends `command` and wraps its output as a configuration snapshot,
/// connecting first if the session is not connected yet.
pub async fn fetch_document<S>(
    session: &mut S,
    command: &str,
    timeout: Option<Duration>,
) -> Result<ConfigDocument>
where
    S: RemoteSession + ?Sized,
{
    match session.state() {
        ConnectionState::Connected => {}
        ConnectionState::Disconnected => {
            session.connect().await?;
        }
        ConnectionState::Failed => {
            session.reconnect().await?;
        }
    }

    let response = session.send_command(command, timeout).await?;
    if !response.stderr.is_empty() {
        warn!(command, stderr = %response.stderr, "device wrote to stderr");
    }
    Ok(ConfigDocument::new(response.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;

    #[test]
    fn eol_is_appended_once() {
        assert_eq!(with_eol("show run", "\n"), "show run\n");
        assert_eq!(with_eol("show run\n", "\n"), "show run\n");
        assert_eq!(with_eol("show run", "\r\n"), "show run\r\n");
    }

    #[test]
    fn partial_options_keep_defaults() {
        let options: SessionOptions = serde_yaml::from_str("max_session_tries: 5\n").unwrap();
        assert_eq!(options.max_session_tries, 5);
        assert_eq!(options.command_timeout(), Duration::from_secs(3));
        assert_eq!(options.default_port, 23);
    }

    /// Scripted session used to check the state handling of `fetch_document`.
    struct Scripted {
        state: ConnectionState,
        connects: usize,
        reconnects: usize,
        output: String,
        last: Option<Response>,
    }

    impl Scripted {
        fn new(state: ConnectionState) -> Self {
            Self {
                state,
                connects: 0,
                reconnects: 0,
                output: "hostname lab\n".to_string(),
                last: None,
            }
        }
    }

    #[async_trait]
    impl RemoteSession for Scripted {
        fn state(&self) -> ConnectionState {
            self.state
        }

        async fn connect(&mut self) -> Result<Response> {
            self.connects += 1;
            self.state = ConnectionState::Connected;
            Ok(Response::default())
        }

        async fn reconnect(&mut self) -> Result<Response> {
            self.reconnects += 1;
            self.connect().await
        }

        async fn send_command(
            &mut self,
            _command: &str,
            _timeout: Option<Duration>,
        ) -> Result<Response> {
            if self.state != ConnectionState::Connected {
                return Err(AuditError::Session("not connected".to_string()));
            }
            let response = Response {
                stdout: self.output.clone(),
                stderr: String::new(),
            };
            self.last = Some(response.clone());
            Ok(response)
        }

        fn last_response(&self) -> Option<&Response> {
            self.last.as_ref()
        }
    }

    #[tokio::test]
    async fn fetch_connects_a_fresh_session() {
        let mut session = Scripted::new(ConnectionState::Disconnected);
        let doc = fetch_document(&mut session, "show running-config", None).await.unwrap();
        assert_eq!(doc.contents(), "hostname lab\n");
        assert_eq!(session.connects, 1);
        assert_eq!(session.reconnects, 0);
    }

    #[tokio::test]
    async fn fetch_reconnects_a_failed_session() {
        let mut session = Scripted::new(ConnectionState::Failed);
        fetch_document(&mut session, "show running-config", None).await.unwrap();
        assert_eq!(session.reconnects, 1);
    }

    #[tokio::test]
    async fn fetch_reuses_a_connected_session() {
        let mut session = Scripted::new(ConnectionState::Connected);
        fetch_document(&mut session, "show running-config", None).await.unwrap();
        assert_eq!(session.connects, 0);
        assert!(session.last_response().is_some());
    }
}
