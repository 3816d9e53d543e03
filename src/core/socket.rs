//! Persistent socket transport.
//!
//! One TCP connection is opened lazily and reused for every command. The
//! first command on a fresh connection is preceded by a `login` carrying the
//! stored credentials. A broken connection is retried once by reconnecting
//! and logging in again; application errors are never retried.

use crate::core::framing::{encode_request, read_frame, write_frame};
use crate::core::API_VERSION;
use crate::domain::model::{check_service_error, parse_response, Command, Credentials, Payload};
use crate::domain::ports::Transport;
use crate::utils::error::{CaptchaError, Result};
use rand::Rng;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "api.dbcapi.me";
pub const DEFAULT_FIRST_PORT: u16 = 8123;
pub const DEFAULT_LAST_PORT: u16 = 8130;
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(60);

/// Floor for the overall socket timeout, so each I/O operation still gets
/// a non-zero quarter of it.
pub const MIN_SOCKET_TIMEOUT: Duration = Duration::from_millis(4);

const MAX_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    pub host: String,
    /// First port of the closed range connections are spread over.
    pub first_port: u16,
    /// Last port of the range, inclusive.
    pub last_port: u16,
    /// Bound on establishing a connection. Each read and write gets a quarter of it.
    pub timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            first_port: DEFAULT_FIRST_PORT,
            last_port: DEFAULT_LAST_PORT,
            timeout: DEFAULT_SOCKET_TIMEOUT,
        }
    }
}

impl SocketConfig {
    /// Single-port config, mostly useful against a local endpoint.
    pub fn single(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            first_port: port,
            last_port: port,
            ..Self::default()
        }
    }

    /// Values below `MIN_SOCKET_TIMEOUT` are raised to it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(MIN_SOCKET_TIMEOUT);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.timeout.max(MIN_SOCKET_TIMEOUT)
    }

    pub fn io_timeout(&self) -> Duration {
        self.connect_timeout() / 4
    }

    fn pick_port(&self) -> u16 {
        let (low, high) = if self.first_port <= self.last_port {
            (self.first_port, self.last_port)
        } else {
            (self.last_port, self.first_port)
        };
        rand::thread_rng().gen_range(low..=high)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    LoggedIn,
}

#[derive(Debug)]
enum ConnectionState {
    Disconnected,
    Connected(TcpStream),
    LoggedIn(TcpStream),
}

#[derive(Debug)]
pub struct SocketTransport {
    credentials: Credentials,
    config: SocketConfig,
    state: ConnectionState,
}

impl SocketTransport {
    pub fn new(credentials: Credentials, config: SocketConfig) -> Self {
        Self {
            credentials,
            config,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.state {
            ConnectionState::Disconnected => ConnectionStatus::Disconnected,
            ConnectionState::Connected(_) => ConnectionStatus::Connected,
            ConnectionState::LoggedIn(_) => ConnectionStatus::LoggedIn,
        }
    }

    fn is_logged_in(&self) -> bool {
        matches!(self.state, ConnectionState::LoggedIn(_))
    }

    fn connect(&mut self) -> Result<()> {
        let host = self.config.host.clone();
        let port = self.config.pick_port();
        tracing::debug!("Connecting to {}:{}", host, port);

        let addrs = (host.as_str(), port).to_socket_addrs().map_err(|e| {
            CaptchaError::connection(format!("failed to resolve {}:{}", host, port), Some(e))
        })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout()) {
                Ok(stream) => {
                    configure_stream(&stream, self.config.io_timeout()).map_err(|e| {
                        CaptchaError::connection("failed to configure socket timeouts", Some(e))
                    })?;
                    tracing::info!("Connected to {}", addr);
                    self.state = ConnectionState::Connected(stream);
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!("Connection to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(CaptchaError::connection(
            format!("failed to connect to {}:{}", host, port),
            last_error,
        ))
    }

    fn ensure_connected(&mut self) -> Result<&mut TcpStream> {
        if matches!(self.state, ConnectionState::Disconnected) {
            self.connect()?;
        }
        match &mut self.state {
            ConnectionState::Connected(stream) | ConnectionState::LoggedIn(stream) => Ok(stream),
            ConnectionState::Disconnected => Err(CaptchaError::connection("not connected", None)),
        }
    }

    fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        let stream = self.ensure_connected()?;
        write_frame(stream, frame)?;
        read_frame(stream)
    }

    fn login(&mut self) -> Result<()> {
        tracing::debug!("Logging in as {}", self.credentials.username());
        let payload = self.credentials.to_payload();
        self.call_with_retries(Command::Login, &payload)?;
        Ok(())
    }

    /// Up to `MAX_ATTEMPTS` exchanges; only connection failures lead to another one.
    /// The implicit login is a call of its own with a separate budget.
    fn call_with_retries(&mut self, command: Command, payload: &Payload) -> Result<Payload> {
        let frame = encode_request(command, API_VERSION, payload)?;
        let mut last_error = None;

        for attempt in 1..=MAX_ATTEMPTS {
            if command != Command::Login && !self.is_logged_in() {
                self.login()?;
            }

            match self.exchange(&frame) {
                Ok(message) => return self.handle_response(command, &message),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        "{} attempt {}/{} failed: {}",
                        command,
                        attempt,
                        MAX_ATTEMPTS,
                        e
                    );
                    self.close();
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| CaptchaError::connection("connection lost", None)))
    }

    fn handle_response(&mut self, command: Command, message: &[u8]) -> Result<Payload> {
        tracing::debug!("Received {} bytes for {}", message.len(), command);
        let response = parse_response(message)?;
        check_service_error(&response)?;
        if command == Command::Login {
            self.promote();
        }
        Ok(response)
    }

    fn promote(&mut self) {
        self.state = match std::mem::replace(&mut self.state, ConnectionState::Disconnected) {
            ConnectionState::Connected(stream) => {
                tracing::info!("Logged in as {}", self.credentials.username());
                ConnectionState::LoggedIn(stream)
            }
            other => other,
        };
    }
}

fn configure_stream(stream: &TcpStream, io_timeout: Duration) -> std::io::Result<()> {
    stream.set_read_timeout(Some(io_timeout))?;
    stream.set_write_timeout(Some(io_timeout))?;
    stream.set_nodelay(true)
}

impl Transport for SocketTransport {
    fn call(&mut self, command: Command, payload: Payload) -> Result<Payload> {
        let result = self.call_with_retries(command, &payload);
        if let Err(e) = &result {
            tracing::warn!("{} failed, dropping connection: {}", command, e);
            self.close();
        }
        result
    }

    fn close(&mut self) {
        match std::mem::replace(&mut self.state, ConnectionState::Disconnected) {
            ConnectionState::Disconnected => {}
            ConnectionState::Connected(stream) | ConnectionState::LoggedIn(stream) => {
                if let Err(e) = stream.shutdown(Shutdown::Both) {
                    tracing::debug!("Socket shutdown reported: {}", e);
                }
                tracing::debug!("Connection closed");
            }
        }
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}
