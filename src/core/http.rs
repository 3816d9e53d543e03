//! Stateless HTTP transport.
//!
//! Each call is one request with the credentials attached, sent through a
//! pooled blocking client. Nothing is retried here.

use crate::core::API_VERSION;
use crate::domain::model::{check_service_error, parse_response, Command, Credentials, Payload};
use crate::domain::ports::Transport;
use crate::utils::error::{CaptchaError, Result};
use crate::utils::validation::validate_url;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://api.dbcapi.me/api";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct HttpTransport {
    credentials: Credentials,
    base_url: Url,
    client: Client,
}

impl HttpTransport {
    pub fn new(credentials: Credentials, config: HttpConfig) -> Result<Self> {
        let base_url = validate_url("http.base_url", &config.base_url)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(API_VERSION)
            .build()
            .map_err(|e| CaptchaError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            base_url,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn route(&self, command: Command, payload: &Payload) -> Result<(Method, String)> {
        let route = match command {
            Command::Login | Command::User => (Method::GET, self.endpoint("user")),
            Command::Upload => (Method::POST, self.endpoint("captcha")),
            Command::Captcha => (
                Method::GET,
                self.endpoint(&format!("captcha/{}", captcha_id(payload)?)),
            ),
            Command::Report => (
                Method::POST,
                self.endpoint(&format!("captcha/{}/report", captcha_id(payload)?)),
            ),
        };
        Ok(route)
    }

    /// Credentials plus the command fields, flattened to strings.
    fn form_fields(&self, command: Command, payload: &Payload) -> Vec<(String, String)> {
        let mut fields = vec![
            ("username".to_string(), self.credentials.username().to_string()),
            ("password".to_string(), self.credentials.password().to_string()),
        ];

        for (key, value) in payload {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            match (command, key.as_str()) {
                (Command::Upload, "captcha") => {
                    fields.push(("captchafile".to_string(), format!("base64:{}", value)))
                }
                (Command::Upload, "banner") => {
                    fields.push(("banner".to_string(), format!("base64:{}", value)))
                }
                (Command::Captcha, "captcha") | (Command::Report, "captcha") => {}
                _ => fields.push((key.clone(), value)),
            }
        }
        fields
    }
}

fn captcha_id(payload: &Payload) -> Result<u64> {
    payload
        .get("captcha")
        .and_then(Value::as_u64)
        .filter(|id| *id > 0)
        .ok_or_else(|| CaptchaError::invalid_captcha("missing CAPTCHA id"))
}

fn check_status(status: StatusCode) -> Result<()> {
    match status.as_u16() {
        403 => Err(CaptchaError::access_denied(
            "access denied, check your credentials and/or balance",
        )),
        400 | 413 => Err(CaptchaError::invalid_captcha(
            "CAPTCHA was rejected by the service, check if it's a valid image",
        )),
        503 => Err(CaptchaError::ServiceOverload),
        _ => Ok(()),
    }
}

impl Transport for HttpTransport {
    fn call(&mut self, command: Command, payload: Payload) -> Result<Payload> {
        let (method, url) = self.route(command, &payload)?;
        let fields = self.form_fields(command, &payload);
        tracing::debug!("{} {} ({})", method, url, command);

        let request = if method == Method::GET {
            self.client.get(&url).query(&fields)
        } else {
            self.client.post(&url).form(&fields)
        };
        let response = request.header(ACCEPT, "application/json").send()?;

        let status = response.status();
        tracing::debug!("API response status: {}", status);
        check_status(status)?;

        let body = response.bytes()?;
        let parsed = match parse_response(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(CaptchaError::server(format!(
                    "unexpected HTTP status {}",
                    status
                )))
            }
            Err(e) => return Err(e),
        };
        check_service_error(&parsed)?;
        if !status.is_success() {
            return Err(CaptchaError::server(format!(
                "unexpected HTTP status {}",
                status
            )));
        }
        Ok(parsed)
    }

    fn close(&mut self) {
        tracing::debug!("HTTP transport holds no connection to close");
    }
}
