//! # Notifier Library
//!
//! Multi-tenant notification dispatch: events, channels, user preferences,
//! rate limiting, template rendering, queued delivery through channel
//! transports, and open/click analytics, plus the HTTP surface over them.

pub mod analytics;
pub mod auth;
pub mod channels;
pub mod config;
pub mod db;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handlers;
pub mod maintenance;
pub mod models;
pub mod preferences;
pub mod rate_limit;
pub mod repositories;
pub mod server;
pub mod settings;
pub mod telemetry;
pub mod template;
pub mod tenant;
pub mod token_cache;
pub mod tracking;
pub mod transports;
pub use migration;
