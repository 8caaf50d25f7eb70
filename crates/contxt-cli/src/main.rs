//! # contxt-bus
//!
//! Publish to or subscribe on a contxt message-bus channel from the shell.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use contxt_bus::{Ack, HandlerError, MessageBus, MessageBusConnection, Subscribe};
use contxt_core::OrganizationId;
use contxt_settings::BusSettings;
use serde_json::Value;

/// contxt message-bus client.
#[derive(Parser, Debug)]
#[command(name = "contxt-bus", about = "contxt message-bus client")]
struct Cli {
    /// API token (overrides `CONTXT_API_TOKEN` and the settings file).
    #[arg(long, global = true)]
    token: Option<String>,

    /// Message-bus base URL (overrides `CONTXT_BUS_URL`).
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish one JSON message to a channel.
    Publish {
        #[command(flatten)]
        target: Target,

        /// Message body as JSON. Bare words are sent as strings.
        message: String,
    },
    /// Print every message on a channel as a JSON line until interrupted.
    Subscribe {
        #[command(flatten)]
        target: Target,

        /// Consumer group; members of one group share the channel's messages.
        #[arg(long)]
        group: Option<String>,
    },
}

#[derive(Args, Debug)]
struct Target {
    /// Organization whose stream to connect to.
    #[arg(long)]
    org: String,

    /// Service client the messages are attributed to.
    #[arg(long)]
    service_id: String,

    /// Channel name.
    #[arg(long)]
    channel: String,
}

impl Cli {
    /// Layer the global flags over loaded settings and re-check them.
    fn apply_to(&self, settings: &mut BusSettings) -> Result<()> {
        if let Some(token) = &self.token {
            settings.api.token = Some(token.clone());
        }
        if let Some(url) = &self.url {
            settings.api.base_url.clone_from(url);
        }
        contxt_settings::validate(settings).context("Invalid command-line settings")
    }
}

/// Parse a CLI message argument, falling back to a JSON string.
fn parse_message(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

async fn open(settings: &BusSettings, bus: &MessageBus, org: &str) -> Result<MessageBusConnection> {
    let token = settings
        .api
        .token
        .as_deref()
        .context("An API token is required: pass --token or set CONTXT_API_TOKEN")?;

    let connection = bus
        .connect(&OrganizationId::from(org))
        .await
        .with_context(|| format!("Failed to connect to organization {org}"))?;
    let _ = connection
        .authorize(token)
        .await
        .context("Message bus authorization failed")?;
    Ok(connection)
}

async fn publish(connection: &MessageBusConnection, target: &Target, message: &str) -> Result<()> {
    let result = connection
        .publish(&target.service_id, &target.channel, parse_message(message))
        .await
        .context("Publish failed")?;
    println!("{result}");
    Ok(())
}

async fn subscribe(
    connection: &MessageBusConnection,
    target: &Target,
    group: Option<&str>,
) -> Result<()> {
    let mut request = Subscribe::new(target.service_id.as_str(), target.channel.as_str())
        .on_message(|body: Value, _ack: Ack| async move {
            println!("{body}");
            Ok::<(), HandlerError>(())
        })
        .on_error(|error: Value| tracing::error!(%error, "subscription error"));
    if let Some(group) = group {
        request = request.group(group);
    }

    let result = connection
        .subscribe(request)
        .await
        .context("Subscribe failed")?;
    tracing::info!(%result, channel = %target.channel, "subscribed");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = contxt_settings::load_settings().context("Failed to load settings")?;
    args.apply_to(&mut settings)?;
    contxt_core::logging::init_subscriber(&settings.logging.level);

    let bus = MessageBus::new(settings.api.clone());
    let org = match &args.command {
        Command::Publish { target, .. } | Command::Subscribe { target, .. } => target.org.clone(),
    };
    let connection = open(&settings, &bus, &org).await?;

    let outcome = match &args.command {
        Command::Publish { target, message } => publish(&connection, target, message).await,
        Command::Subscribe { target, group } => {
            subscribe(&connection, target, group.as_deref()).await
        }
    };

    let _ = bus.disconnect(&OrganizationId::from(org)).await;
    outcome
}
