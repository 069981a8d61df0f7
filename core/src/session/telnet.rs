use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::{with_eol, ConnectionInfo, ConnectionState, RemoteSession, Response, SessionOptions};
use crate::error::{AuditError, Result};

// Telnet command bytes (RFC 854).
const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

/// How long a single read waits for more output before the drain stops.
const READ_POLL: Duration = Duration::from_millis(100);

const USERNAME_PROMPT: &str = "Username:";
const PASSWORD_PROMPT: &str = "Password:";

/// Clear-text telnet session. Every option the device asks for is refused.
#[derive(Debug)]
pub struct TelnetSession {
    connection: ConnectionInfo,
    options: SessionOptions,
    stream: Option<TcpStream>,
    state: ConnectionState,
    last_response: Option<Response>,
}

impl TelnetSession {
    pub fn new(connection: ConnectionInfo, options: SessionOptions) -> Self {
        Self {
            connection,
            options,
            stream: None,
            state: ConnectionState::Disconnected,
            last_response: None,
        }
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    async fn open(&mut self) -> Result<()> {
        let host = self.connection.hostname.as_str();
        let port = self.connection.port.unwrap_or(self.options.default_port);
        let limit = self.options.open_session_timeout();
        let tries = self.options.max_session_tries.max(1);

        let mut last_error = None;
        for attempt in 1..=tries {
            match timeout(limit, TcpStream::connect((host, port))).await {
                Ok(Ok(stream)) => {
                    debug!(host, port, attempt, "telnet session opened");
                    self.stream = Some(stream);
                    self.state = ConnectionState::Connected;
                    return Ok(());
                }
                Ok(Err(e)) => {
                    debug!(host, port, attempt, error = %e, "telnet connect failed");
                    last_error = Some(AuditError::Io(e));
                }
                Err(_) => {
                    debug!(host, port, attempt, "telnet connect timed out");
                    last_error = Some(AuditError::Timeout(limit));
                }
            }
        }

        warn!(host, port, tries, "giving up on telnet session");
        self.state = ConnectionState::Failed;
        Err(last_error.unwrap_or_else(|| {
            AuditError::Session(format!("could not connect to {}:{}", host, port))
        }))
    }

    /// Reads whatever the device has sent, in at most `max_buffer_cycle`
    /// reads of `max_buffer_length` bytes, and answers option negotiation.
    async fn drain(&mut self) -> Result<Response> {
        let Self {
            stream,
            state,
            options,
            ..
        } = self;
        let stream = stream
            .as_mut()
            .ok_or_else(|| AuditError::Session("telnet session is not connected".to_string()))?;

        let mut raw = Vec::new();
        let mut buffer = vec![0u8; options.max_buffer_length.max(1)];
        for _ in 0..options.max_buffer_cycle {
            match timeout(READ_POLL, stream.read(&mut buffer)).await {
                Err(_) => break,
                Ok(Ok(0)) => {
                    debug!("device closed the telnet session");
                    *state = ConnectionState::Disconnected;
                    break;
                }
                Ok(Ok(n)) => raw.extend_from_slice(&buffer[..n]),
                Ok(Err(e)) => {
                    *state = ConnectionState::Failed;
                    return Err(e.into());
                }
            }
        }

        let (data, replies) = negotiate(&raw);
        if !replies.is_empty() && *state == ConnectionState::Connected {
            if let Err(e) = stream.write_all(&replies).await {
                *state = ConnectionState::Failed;
                return Err(e.into());
            }
        }

        Ok(Response {
            stdout: String::from_utf8_lossy(&data).into_owned(),
            stderr: String::new(),
        })
    }

    /// Writes one line, waits `wait` for the device to answer and drains
    /// the answer.
    async fn exchange(&mut self, line: &str, wait: Duration) -> Result<Response> {
        let payload = escape(with_eol(line, &self.options.eol).as_bytes());

        let written = match self.stream.as_mut() {
            Some(stream) => timeout(wait.max(READ_POLL), stream.write_all(&payload)).await,
            None => return Err(AuditError::Session("telnet session is not connected".to_string())),
        };
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.state = ConnectionState::Failed;
                return Err(e.into());
            }
            Err(_) => {
                self.state = ConnectionState::Failed;
                return Err(AuditError::Timeout(wait));
            }
        }

        sleep(wait).await;
        self.drain().await
    }

    /// Answers `Username:` and `Password:` prompts from the connection
    /// credentials. Returns what the device sent after the last answer.
    async fn login(&mut self, mut response: Response) -> Result<Response> {
        let wait = self.options.command_timeout();

        if response.stdout.contains(USERNAME_PROMPT) {
            let username = self.connection.username.clone().ok_or_else(|| missing("username"))?;
            debug!(host = %self.connection.hostname, "answering username prompt");
            response = self.exchange(&username, wait).await?;
        }

        if response.stdout.contains(PASSWORD_PROMPT) {
            let password = self.connection.password.clone().ok_or_else(|| missing("password"))?;
            debug!(host = %self.connection.hostname, "answering password prompt");
            response = self.exchange(&password, wait).await?;
        }

        Ok(response)
    }

    fn remember(&mut self, response: Response) -> Response {
        self.last_response = Some(response.clone());
        response
    }
}

#[async_trait]
impl RemoteSession for TelnetSession {
    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn connect(&mut self) -> Result<Response> {
        if self.state != ConnectionState::Connected {
            self.open().await?;
        }
        sleep(self.options.command_timeout()).await;
        let banner = self.drain().await?;
        let response = self.login(banner).await?;
        Ok(self.remember(response))
    }

    async fn reconnect(&mut self) -> Result<Response> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.state = ConnectionState::Disconnected;
        self.connect().await
    }

    async fn send_command(&mut self, command: &str, wait: Option<Duration>) -> Result<Response> {
        if self.state != ConnectionState::Connected {
            return Err(AuditError::Session(format!(
                "cannot send '{}': telnet session is {:?}",
                command.trim_end(),
                self.state
            )));
        }
        let wait = wait.unwrap_or_else(|| self.options.command_timeout());
        let response = self.exchange(command, wait).await?;
        Ok(self.remember(response))
    }

    fn last_response(&self) -> Option<&Response> {
        self.last_response.as_ref()
    }
}

fn missing(credential: &str) -> AuditError {
    AuditError::Session(format!("device asked for a {} but none is configured", credential))
}

/// Splits raw bytes into payload and the replies refusing every option.
/// An incomplete command at the end of the buffer is dropped.
fn negotiate(raw: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut data = Vec::with_capacity(raw.len());
    let mut replies = Vec::new();
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != IAC {
            data.push(raw[i]);
            i += 1;
            continue;
        }
        match raw.get(i + 1).copied() {
            Some(IAC) => {
                data.push(IAC);
                i += 2;
            }
            Some(verb @ (DO | DONT | WILL | WONT)) => {
                if let Some(&option) = raw.get(i + 2) {
                    match verb {
                        DO => replies.extend_from_slice(&[IAC, WONT, option]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, option]),
                        _ => {}
                    }
                }
                i += 3;
            }
            Some(SB) => {
                // Skip to IAC SE.
                let end = raw[i + 2..]
                    .windows(2)
                    .position(|w| w == [IAC, SE])
                    .map(|p| i + 2 + p + 2);
                i = end.unwrap_or(raw.len());
            }
            Some(_) => i += 2,
            None => i += 1,
        }
    }

    (data, replies)
}

// Literal 0xFF bytes must be doubled on the wire.
fn escape(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for &b in bytes {
        out.push(b);
        if b == IAC {
            out.push(IAC);
        }
    }
    out
}
