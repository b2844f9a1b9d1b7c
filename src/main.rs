//! # Notifier Main Entry Point
//!
//! ```bash
//! # Run the API, delivery worker and maintenance loop
//! notifier serve
//!
//! # Apply migrations and seed channel rows
//! notifier migrate
//!
//! # Push one event through the pipeline and deliver it
//! notifier send-test user.registered --user 1 --email jane@example.com --data plan=pro
//! ```

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use notifier::{
    config::{AppConfig, ConfigLoader},
    db,
    models::{ChannelType, Recipient},
    repositories::ChannelRepository,
    server::{AppState, run_server},
    telemetry,
};

/// Notification dispatch service
#[derive(Parser, Debug)]
#[command(name = "notifier")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API with the delivery worker (default)
    Serve,
    /// Apply pending migrations and seed channel rows
    Migrate,
    /// Dispatch an event to a user and deliver it immediately
    SendTest {
        /// Event key, e.g. user.registered
        event: String,
        /// Recipient user id
        #[arg(long)]
        user: i64,
        /// Recipient email address
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
        /// Send to this channel only, ignoring preferences
        #[arg(long)]
        channel: Option<ChannelType>,
        /// Template variable as key=value; repeatable
        #[arg(long = "data", value_parser = parse_key_value)]
        data: Vec<(String, String)>,
        /// Tenant to send as, when multitenancy is enabled
        #[arg(long)]
        tenant: Option<Uuid>,
    },
    /// Clear open/click analytics older than the retention window
    CleanupAnalytics {
        /// Only report how many notifications would be cleared
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        tenant: Option<Uuid>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;
    telemetry::init_tracing(&config).context("Failed to initialise tracing")?;
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Loaded configuration");
    }

    let db = db::init_pool(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            db::run_migrations(&db).await?;
            run_server(config, db).await
        }
        Command::Migrate => {
            db::run_migrations(&db).await?;
            let created = ChannelRepository::new(&db)
                .ensure_defaults(None, &config.enabled_channels)
                .await
                .context("Failed to seed channel rows")?;
            tracing::info!(created, "Migrations applied");
            Ok(())
        }
        Command::SendTest {
            event,
            user,
            email,
            name,
            channel,
            data,
            tenant,
        } => {
            let mut recipient = Recipient::new(user).with_email(email);
            if let Some(name) = name {
                recipient = recipient.with_name(name);
            }
            let data: Map<String, JsonValue> = data
                .into_iter()
                .map(|(key, value)| (key, JsonValue::String(value)))
                .collect();
            send_test(config, db, tenant, &recipient, &event, channel, data.into()).await
        }
        Command::CleanupAnalytics { dry_run, tenant } => {
            let state =
                AppState::build(Arc::new(config), db).context("Failed to build transports")?;
            state.tenant.set_override(tenant);
            let affected = state
                .analytics
                .cleanup(dry_run)
                .await
                .context("Analytics cleanup failed")?;
            if dry_run {
                println!("{affected} notification(s) would be cleared");
            } else {
                println!("Cleared analytics on {affected} notification(s)");
            }
            Ok(())
        }
    }
}

async fn send_test(
    config: AppConfig,
    db: sea_orm::DatabaseConnection,
    tenant: Option<Uuid>,
    recipient: &Recipient,
    event: &str,
    channel: Option<ChannelType>,
    data: JsonValue,
) -> Result<()> {
    let state = AppState::build(Arc::new(config), db).context("Failed to build transports")?;
    state.tenant.set_override(tenant);

    let ids = match channel {
        Some(channel) => state
            .dispatcher
            .send_to_channel(recipient, event, channel, data)
            .await
            .into_iter()
            .collect(),
        None => state.dispatcher.send(recipient, event, data).await,
    };
    if ids.is_empty() {
        bail!("No notification was dispatched for '{event}'; check the logs for the reason");
    }

    let processed = state
        .delivery_worker(Arc::clone(&state.transports))
        .drain()
        .await
        .context("Delivery failed")?;

    println!(
        "Dispatched {} notification(s), processed {processed} delivery job(s)",
        ids.len()
    );
    for id in ids {
        println!("  {id}");
    }
    Ok(())
}
