use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::prelude::*;
use weddingwin_shell_bridge::protocol::{BridgeMessage, now_millis};
use weddingwin_shell_bridge::{
    BridgeConfig, CallbackOutcome, CallbackTarget, IncomingLink, classify_incoming, load_config,
    parse_callback, rewrite_redirect_uri,
};

#[derive(Parser, Debug)]
#[command(
    name = "bridge-inspect",
    about = "Inspect WeddingWin sign-in bridge inputs the way the shell sees them",
    version
)]
struct Opts {
    /// Bridge config file (camelCase JSON); defaults apply when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a callback or deep-link URL
    Callback { url: String },
    /// Rewrite an authorization URL to the configured callback address
    Rewrite {
        auth_url: String,
        /// Client id to fill in when the URL has none (overrides config)
        #[arg(long)]
        client_id: Option<String>,
    },
    /// Validate a page-to-shell bridge message
    Message { json: String },
    /// Print the effective, validated config
    Config,
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    init_tracing();

    let config = match &opts.config {
        Some(path) => load_config(path)
            .with_context(|| format!("loading bridge config from {}", path.display()))?,
        None => {
            let config = BridgeConfig::default();
            config.validate()?;
            config
        }
    };
    let target = CallbackTarget::parse(&config.callback_url)?;

    let output = match opts.command {
        Command::Callback { url } => {
            let link = match classify_incoming(&url, &target) {
                IncomingLink::Callback(_) => "callback",
                IncomingLink::Unrelated => "unrelated",
                IncomingLink::Unparseable => "unparseable",
            };
            let outcome = parse_callback(&url, now_millis());
            let expires = match &outcome {
                CallbackOutcome::Credential { credential, .. } => credential
                    .expires_at
                    .and_then(chrono::DateTime::from_timestamp_millis)
                    .map(|at| at.to_rfc3339()),
                _ => None,
            };
            json!({
                "link": link,
                "outcome": outcome,
                "expires": expires,
            })
        }
        Command::Rewrite {
            auth_url,
            client_id,
        } => {
            let client_id = client_id.or_else(|| config.client_id.clone());
            let rewritten = rewrite_redirect_uri(&auth_url, &target, client_id.as_deref())?;
            info!(host = rewritten.host_str().unwrap_or_default(), "rewrote authorization url");
            json!({ "url": rewritten.as_str() })
        }
        Command::Message { json } => {
            let message = BridgeMessage::from_json(&json).context("decoding bridge message")?;
            serde_json::to_value(&message)?
        }
        Command::Config => serde_json::to_value(&config)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
