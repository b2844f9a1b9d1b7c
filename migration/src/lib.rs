//! Database migrations for the notifier service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_02_01_000001_create_notifier_events;
mod m2025_02_01_000002_create_notifier_channels;
mod m2025_02_01_000003_create_notifier_templates;
mod m2025_02_01_000004_create_notifier_preferences;
mod m2025_02_01_000005_create_notifier_settings;
mod m2025_02_01_000006_create_notifier_notifications;
mod m2025_02_01_000007_create_notifier_delivery_jobs;
mod m2025_02_01_000008_create_notifier_rate_limit_counters;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_02_01_000001_create_notifier_events::Migration),
            Box::new(m2025_02_01_000002_create_notifier_channels::Migration),
            Box::new(m2025_02_01_000003_create_notifier_templates::Migration),
            Box::new(m2025_02_01_000004_create_notifier_preferences::Migration),
            Box::new(m2025_02_01_000005_create_notifier_settings::Migration),
            Box::new(m2025_02_01_000006_create_notifier_notifications::Migration),
            Box::new(m2025_02_01_000007_create_notifier_delivery_jobs::Migration),
            Box::new(m2025_02_01_000008_create_notifier_rate_limit_counters::Migration),
        ]
    }
}
