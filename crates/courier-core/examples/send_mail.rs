//! Sends one message using a JSON configuration file.
//!
//! ```text
//! cargo run --example send_mail -- config.json from@example.com to@example.com
//! ```
//!
//! Example `config.json`:
//!
//! ```json
//! {
//!   "hostname": "smtp.example.com",
//!   "port": 587,
//!   "starttls": "required",
//!   "login": "required",
//!   "username": "user@example.com",
//!   "password": "secret"
//! }
//! ```
//!
//! Set `RUST_LOG=courier_smtp=debug` to see the masked protocol trace.

use anyhow::{Context, bail};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courier_core::{MailConfig, MailMessage, MailService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_core=debug,courier_smtp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [path, from, to] = args.as_slice() else {
        bail!("usage: send_mail <config.json> <from> <to>");
    };

    let json = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let config = MailConfig::from_json(&json)?;
    info!(?config, "Loaded configuration");

    let service = MailService::new(&config)?;
    service.start()?;

    let message =
        MailMessage::new(from.as_str(), "Test message", "Sent by courier.\n").to(to.as_str());
    let result = service.send_mail(&message).await;
    service.stop().await;

    result?;
    info!("Done");
    Ok(())
}
