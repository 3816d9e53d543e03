use thiserror::Error;

/// Failure classes shared by every transport, grouped by who has to act on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Io,
    AccessDenied,
    InvalidCaptcha,
    ServiceOverload,
    Server,
}

#[derive(Error, Debug)]
pub enum CaptchaError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Connection error: {message}")]
    ConnectionError {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    #[error("Invalid CAPTCHA: {message}")]
    InvalidCaptcha { message: String },

    #[error("Service overloaded, try again later")]
    ServiceOverload,

    #[error("Server error: {message}")]
    ServerError { message: String },
}

impl CaptchaError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>, source: Option<std::io::Error>) -> Self {
        Self::ConnectionError {
            message: message.into(),
            source,
        }
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    pub fn invalid_captcha(message: impl Into<String>) -> Self {
        Self::InvalidCaptcha {
            message: message.into(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::ServerError {
            message: message.into(),
        }
    }

    /// Maps the `error` field of a service response onto the taxonomy.
    pub fn from_service_code(code: &str) -> Self {
        match code {
            "not-logged-in" => Self::access_denied("access denied, check your credentials"),
            "banned" => Self::access_denied("access denied, account is suspended"),
            "insufficient-funds" => Self::access_denied("access denied, balance is too low"),
            "invalid-captcha" => Self::invalid_captcha("CAPTCHA was rejected by the service"),
            "service-overload" => Self::ServiceOverload,
            other => Self::server(format!("API server error occurred: {}", other)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigError { .. } => ErrorKind::Configuration,
            Self::ConnectionError { .. } | Self::IoError(_) | Self::HttpError(_) => ErrorKind::Io,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::InvalidCaptcha { .. } => ErrorKind::InvalidCaptcha,
            Self::ServiceOverload => ErrorKind::ServiceOverload,
            Self::ServerError { .. } => ErrorKind::Server,
        }
    }

    /// Only broken connections are worth another attempt; everything else
    /// would be rejected again.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Io
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Configuration => "check the credentials and the configuration file",
            ErrorKind::Io => "check network connectivity and try again",
            ErrorKind::AccessDenied => "verify the account credentials, status and balance",
            ErrorKind::InvalidCaptcha => "make sure the image is a valid, non-empty CAPTCHA",
            ErrorKind::ServiceOverload => "the service is busy, retry in a few moments",
            ErrorKind::Server => "retry later or report the response to the service",
        }
    }
}

pub type Result<T> = std::result::Result<T, CaptchaError>;
