use anyhow::Context;
use captcha_client::config::cli::CliCommand;
use captcha_client::utils::{logger, validation::Validate};
use captcha_client::{CaptchaError, CaptchaImage, CliArgs, Client, ErrorKind, Transport, UploadOptions};
use clap::Parser;
use std::path::Path;
use std::time::Duration;

fn main() {
    let args = CliArgs::parse();

    if args.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::debug!("Command: {:?}", args.command);

    if let Err(e) = run(&args) {
        let exit_code = match e.downcast_ref::<CaptchaError>() {
            Some(err) => {
                tracing::error!("❌ {} ({:?})", err, err.kind());
                eprintln!("❌ {:#}", e);
                eprintln!("💡 {}", err.recovery_suggestion());
                exit_code(err.kind())
            }
            None => {
                eprintln!("❌ {:#}", e);
                1
            }
        };
        std::process::exit(exit_code);
    }
}

fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Configuration => 2,
        ErrorKind::Io => 3,
        ErrorKind::AccessDenied => 4,
        ErrorKind::InvalidCaptcha => 5,
        ErrorKind::ServiceOverload => 6,
        ErrorKind::Server => 7,
    }
}

fn run(args: &CliArgs) -> anyhow::Result<()> {
    let config = args.resolve_config()?;
    config.validate()?;
    let mut client = config.build_client()?;

    match &args.command {
        CliCommand::User => match client.get_user()? {
            Some(user) => println!(
                "user {}: balance {:.3} US cents{}",
                user.id,
                user.balance,
                if user.is_banned { " (banned)" } else { "" }
            ),
            None => println!("no account data returned"),
        },
        CliCommand::Balance => match client.get_balance()? {
            Some(balance) => println!("{:.3}", balance),
            None => println!("no account data returned"),
        },
        CliCommand::Upload { image, banner_text } => {
            let image = load_image(image)?;
            match client.upload(&image, &options(banner_text))? {
                Some(record) => println!("{}", record.id),
                None => println!("upload was not accepted"),
            }
        }
        CliCommand::Status { id } => match client.get_captcha(*id)? {
            Some(record) => println!(
                "{}: {} (correct: {})",
                record.id,
                record.text.as_deref().unwrap_or("<pending>"),
                record.is_correct
            ),
            None => println!("CAPTCHA {} not found", id),
        },
        CliCommand::Text { id } => match client.get_text(*id)? {
            Some(text) => println!("{}", text),
            None => println!("<pending>"),
        },
        CliCommand::Report { id } => {
            if client.report(*id)? {
                println!("CAPTCHA {} reported", id);
            } else {
                println!("CAPTCHA {} could not be reported", id);
            }
        }
        CliCommand::Decode {
            image,
            timeout,
            banner_text,
        } => {
            let image = load_image(image)?;
            decode(&mut client, &image, &options(banner_text), timeout.map(Duration::from_secs))?;
        }
    }

    client.close();
    Ok(())
}

fn decode<T: Transport>(
    client: &mut Client<T>,
    image: &CaptchaImage,
    options: &UploadOptions,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    match client.decode(image, options, timeout)? {
        Some(record) => {
            tracing::info!("✅ CAPTCHA {} solved", record.id);
            println!("{}", record.text.unwrap_or_default());
        }
        None => {
            tracing::warn!("No answer before the deadline");
            println!("<unsolved>");
        }
    }
    Ok(())
}

fn load_image(path: &Path) -> anyhow::Result<CaptchaImage> {
    CaptchaImage::from_path(path).with_context(|| format!("reading image {}", path.display()))
}

fn options(banner_text: &Option<String>) -> UploadOptions {
    UploadOptions {
        banner_text: banner_text.clone(),
        ..UploadOptions::default()
    }
}
