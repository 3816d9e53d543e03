use crate::utils::error::{CaptchaError, Result};
use crate::utils::validation::validate_non_empty_string;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Command fields keyed by name, as they go on the wire.
pub type Payload = serde_json::Map<String, Value>;

/// Commands understood by the solving service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Login,
    User,
    Upload,
    Captcha,
    Report,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Login => "login",
            Command::User => "user",
            Command::Upload => "upload",
            Command::Captcha => "captcha",
            Command::Report => "report",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account credentials, checked once when built and never changed afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let password = password.into();
        validate_non_empty_string("username", &username)?;
        validate_non_empty_string("password", &password)?;
        Ok(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub(crate) fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("username".to_string(), Value::String(self.username.clone()));
        payload.insert("password".to_string(), Value::String(self.password.clone()));
        payload
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: u64,
    /// Balance in US cents.
    pub balance: f64,
    pub is_banned: bool,
}

impl UserAccount {
    /// Reads a `user` response; a missing or non-positive id means there is no account.
    pub fn from_response(response: &Payload) -> Option<Self> {
        let id = positive_id(response.get("user"))?;
        Some(Self {
            id,
            balance: response.get("balance").and_then(as_f64).unwrap_or(0.0),
            is_banned: response.get("is_banned").map(truthy).unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaRecord {
    pub id: u64,
    /// Solved text, `None` until a solver has answered.
    pub text: Option<String>,
    pub is_correct: bool,
}

impl CaptchaRecord {
    pub fn from_response(response: &Payload) -> Option<Self> {
        let id = positive_id(response.get("captcha"))?;
        let text = response
            .get("text")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        Some(Self {
            id,
            text,
            is_correct: response.get("is_correct").map(truthy).unwrap_or(false),
        })
    }

    pub fn is_solved(&self) -> bool {
        self.text.is_some()
    }
}

fn positive_id(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().filter(|id| *id > 0),
        Value::String(s) => s.trim().parse::<u64>().ok().filter(|id| *id > 0),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Turns a decoded frame or HTTP body into a response object.
pub(crate) fn parse_response(body: &[u8]) -> Result<Payload> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) | Err(_) => Err(CaptchaError::server("invalid API response")),
    }
}

/// Fails with the mapped error kind when the response carries an `error` field.
pub(crate) fn check_service_error(response: &Payload) -> Result<()> {
    match response.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(()),
        Some(Value::String(code)) if code.is_empty() => Ok(()),
        Some(Value::String(code)) => Err(CaptchaError::from_service_code(code)),
        Some(other) => Err(CaptchaError::from_service_code(&other.to_string())),
    }
}
