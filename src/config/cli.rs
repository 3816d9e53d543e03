use crate::config::{ClientConfig, TransportKind};
use crate::utils::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "captcha-client")]
#[command(about = "Submit CAPTCHA images to a solving service and fetch the answers")]
pub struct CliArgs {
    #[arg(long, short, help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Account username, overrides the configuration file")]
    pub username: Option<String>,

    #[arg(long, help = "Account password, overrides the configuration file")]
    pub password: Option<String>,

    #[arg(long, value_enum, help = "Transport to use, overrides the configuration file")]
    pub transport: Option<TransportKind>,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(long, short, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Show account details
    User,
    /// Show the account balance in US cents
    Balance,
    /// Upload an image without waiting for the answer
    Upload {
        image: PathBuf,
        #[arg(long)]
        banner_text: Option<String>,
    },
    /// Show the state of an uploaded CAPTCHA
    Status { id: u64 },
    /// Print the solved text of a CAPTCHA
    Text { id: u64 },
    /// Report a CAPTCHA as incorrectly solved
    Report { id: u64 },
    /// Upload an image and wait for the answer
    Decode {
        image: PathBuf,
        #[arg(long, help = "Seconds to wait for an answer")]
        timeout: Option<u64>,
        #[arg(long)]
        banner_text: Option<String>,
    },
}

impl CliArgs {
    /// Loads the configuration file, if any, and applies command-line overrides.
    pub fn resolve_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::default(),
        };

        if let Some(username) = &self.username {
            config.credentials.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.credentials.password = password.clone();
        }
        if let Some(kind) = self.transport {
            config.transport.kind = kind;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decode_command() {
        let args = CliArgs::parse_from([
            "captcha-client",
            "--username",
            "alice",
            "--password",
            "secret",
            "--transport",
            "http",
            "decode",
            "image.png",
            "--timeout",
            "30",
        ]);

        match &args.command {
            CliCommand::Decode { image, timeout, .. } => {
                assert_eq!(image, &PathBuf::from("image.png"));
                assert_eq!(*timeout, Some(30));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let config = args.resolve_config().unwrap();
        assert_eq!(config.credentials.username, "alice");
        assert_eq!(config.transport_kind(), TransportKind::Http);
    }

    #[test]
    fn test_flags_override_config_file() {
        use std::io::Write;
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[credentials]\nusername = \"file\"\npassword = \"pw\"\n")
            .unwrap();

        let path = temp_file.path().to_str().unwrap().to_string();
        let args = CliArgs::parse_from(["captcha-client", "-c", path.as_str(), "--username", "cli", "balance"]);
        let config = args.resolve_config().unwrap();

        assert_eq!(config.credentials.username, "cli");
        assert_eq!(config.credentials.password, "pw");
        assert_eq!(config.transport_kind(), TransportKind::Socket);
    }
}
