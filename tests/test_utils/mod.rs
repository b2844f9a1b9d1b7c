//! Test utilities for database testing.
//!
//! In-memory SQLite with migrations applied, plus fixture helpers for
//! channels, templates and fully wired application state.

use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use notifier::config::{AppConfig, QueueConfig};
use notifier::models::{ChannelType, template};
use notifier::repositories::{
    ChannelRepository, EventChannelSettingRepository, NewTemplate, TemplateRepository,
};
use notifier::server::AppState;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;

    Migrator::up(&db, None).await?;

    // Fixtures insert notifications and jobs independently of each other.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Configuration used by integration tests: serial worker, no backoff delay.
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        app_name: "Test".to_string(),
        app_url: "https://notify.test".to_string(),
        queue: QueueConfig {
            concurrency: 1,
            backoff_base_seconds: 0,
            backoff_max_seconds: 0,
            backoff_jitter_factor: 0.0,
            ..QueueConfig::default()
        },
        ..AppConfig::default()
    }
}

/// Fresh database plus application state built from `config`.
#[allow(dead_code)]
pub async fn setup_state(config: AppConfig) -> Result<AppState> {
    let db = setup_test_db().await?;
    Ok(AppState::build(Arc::new(config), db)?)
}

/// Create or replace a channel row.
#[allow(dead_code)]
pub async fn upsert_channel(
    db: &DatabaseConnection,
    tenant_id: Option<Uuid>,
    channel_type: ChannelType,
    active: bool,
    settings: Option<JsonValue>,
) -> Result<()> {
    ChannelRepository::new(db)
        .upsert(tenant_id, channel_type, active, settings)
        .await?;
    Ok(())
}

/// Create an active template for `event_key`.
#[allow(dead_code)]
pub async fn create_template(
    db: &DatabaseConnection,
    tenant_id: Option<Uuid>,
    event_key: &str,
    subject: &str,
    content: &str,
) -> Result<template::Model> {
    let template = TemplateRepository::new(db)
        .create(
            tenant_id,
            NewTemplate {
                name: format!("{event_key} template"),
                event_key: event_key.to_string(),
                subject: subject.to_string(),
                content: content.to_string(),
                variables: None,
                active: true,
            },
        )
        .await?;
    Ok(template)
}

/// Set the admin default channels for `event_key`.
#[allow(dead_code)]
pub async fn set_event_channels(
    db: &DatabaseConnection,
    tenant_id: Option<Uuid>,
    event_key: &str,
    channels: &[ChannelType],
) -> Result<()> {
    EventChannelSettingRepository::new(db)
        .upsert(tenant_id, event_key, channels)
        .await?;
    Ok(())
}

/// Email channel row plus the welcome template used by most scenarios.
#[allow(dead_code)]
pub async fn seed_welcome_event(db: &DatabaseConnection) -> Result<template::Model> {
    upsert_channel(db, None, ChannelType::Email, true, None).await?;
    create_template(
        db,
        None,
        "user.registered",
        "Welcome to {{app_name}}, {{name}}!",
        "<p>Hello {{name}}, see <a href=\"https://example.com/start\">getting started</a>.</p>",
    )
    .await
}
