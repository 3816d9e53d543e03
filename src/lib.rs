pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliArgs;

pub use config::{ClientConfig, TransportKind};
pub use crate::core::client::{Client, HttpClient, SocketClient};
pub use crate::core::http::{HttpConfig, HttpTransport};
pub use crate::core::socket::{ConnectionStatus, SocketConfig, SocketTransport};
pub use domain::image::{CaptchaImage, UploadOptions};
pub use domain::model::{CaptchaRecord, Command, Credentials, Payload, UserAccount};
pub use domain::ports::Transport;
pub use utils::error::{CaptchaError, ErrorKind, Result};
