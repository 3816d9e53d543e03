use crate::core::client::{Client, DEFAULT_DECODE_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::core::http::{HttpConfig, HttpTransport, DEFAULT_BASE_URL, DEFAULT_HTTP_TIMEOUT};
use crate::core::socket::{
    SocketConfig, SocketTransport, DEFAULT_FIRST_PORT, DEFAULT_HOST, DEFAULT_LAST_PORT,
    DEFAULT_SOCKET_TIMEOUT,
};
use crate::domain::model::Credentials;
use crate::domain::ports::Transport;
use crate::utils::error::{CaptchaError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_range, validate_url, Validate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

const MAX_TIMEOUT_SECONDS: u64 = 3600;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    pub socket: Option<SocketSection>,
    pub http: Option<HttpSection>,
    pub decode: Option<DecodeConfig>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Socket,
    Http,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocketSection {
    pub host: Option<String>,
    pub first_port: Option<u16>,
    pub last_port: Option<u16>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpSection {
    pub base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecodeConfig {
    pub timeout_seconds: Option<u64>,
    pub poll_interval_seconds: Option<u64>,
}

impl ClientConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            CaptchaError::config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content)
            .map_err(|e| CaptchaError::config(format!("TOML parsing error: {}", e)))
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are left as-is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| CaptchaError::config(format!("invalid substitution pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("credentials.username", &self.credentials.username)?;
        validate_non_empty_string("credentials.password", &self.credentials.password)?;

        if let Some(socket) = &self.socket {
            if let Some(host) = &socket.host {
                validate_non_empty_string("socket.host", host)?;
            }
            let first = socket.first_port.unwrap_or(DEFAULT_FIRST_PORT);
            let last = socket.last_port.unwrap_or(DEFAULT_LAST_PORT);
            validate_range("socket.first_port", first, 1, u16::MAX)?;
            validate_range("socket.last_port", last, first, u16::MAX)?;
            if let Some(timeout) = socket.timeout_seconds {
                validate_range("socket.timeout_seconds", timeout, 1, MAX_TIMEOUT_SECONDS)?;
            }
        }

        if let Some(http) = &self.http {
            if let Some(base_url) = &http.base_url {
                validate_url("http.base_url", base_url)?;
            }
            if let Some(timeout) = http.timeout_seconds {
                validate_range("http.timeout_seconds", timeout, 1, MAX_TIMEOUT_SECONDS)?;
            }
        }

        if let Some(decode) = &self.decode {
            if let Some(interval) = decode.poll_interval_seconds {
                validate_range("decode.poll_interval_seconds", interval, 1, 60)?;
            }
            if let Some(timeout) = decode.timeout_seconds {
                validate_range("decode.timeout_seconds", timeout, 0, MAX_TIMEOUT_SECONDS)?;
            }
        }

        Ok(())
    }

    pub fn credentials(&self) -> Result<Credentials> {
        Credentials::new(
            self.credentials.username.clone(),
            self.credentials.password.clone(),
        )
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind
    }

    pub fn socket_config(&self) -> SocketConfig {
        let section = self.socket.clone().unwrap_or_default();
        SocketConfig {
            host: section.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            first_port: section.first_port.unwrap_or(DEFAULT_FIRST_PORT),
            last_port: section.last_port.unwrap_or(DEFAULT_LAST_PORT),
            timeout: section
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SOCKET_TIMEOUT),
        }
    }

    pub fn http_config(&self) -> HttpConfig {
        let section = self.http.clone().unwrap_or_default();
        HttpConfig {
            base_url: section
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout: section
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_HTTP_TIMEOUT),
        }
    }

    /// Zero or unset falls back to the default.
    pub fn decode_timeout(&self) -> Duration {
        self.decode
            .as_ref()
            .and_then(|d| d.timeout_seconds)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_DECODE_TIMEOUT)
    }

    pub fn poll_interval(&self) -> Duration {
        self.decode
            .as_ref()
            .and_then(|d| d.poll_interval_seconds)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    /// Validates the configuration and builds a client over the configured transport.
    pub fn build_client(&self) -> Result<Client<Box<dyn Transport>>> {
        self.validate_config()?;
        let credentials = self.credentials()?;

        let transport: Box<dyn Transport> = match self.transport.kind {
            TransportKind::Socket => {
                tracing::debug!("Using socket transport: {:?}", self.socket_config());
                Box::new(SocketTransport::new(credentials, self.socket_config()))
            }
            TransportKind::Http => {
                tracing::debug!("Using HTTP transport: {:?}", self.http_config());
                Box::new(HttpTransport::new(credentials, self.http_config())?)
            }
        };

        Ok(Client::new(transport)
            .with_poll_interval(self.poll_interval())
            .with_default_timeout(self.decode_timeout()))
    }
}

impl Validate for ClientConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
