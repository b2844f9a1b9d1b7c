//! # Server Configuration
//!
//! Service wiring, the Axum router and the server lifecycle. The delivery
//! worker and the maintenance loop run next to the HTTP listener and stop on
//! the same shutdown signal.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::analytics::AnalyticsRecorder;
use crate::auth::auth_middleware;
use crate::channels::ChannelRegistry;
use crate::config::AppConfig;
use crate::delivery::DeliveryWorker;
use crate::dispatch::{DispatchDeps, DispatchOrchestrator};
use crate::events::{EventRegistry, event_source_from_config};
use crate::handlers;
use crate::maintenance::MaintenanceLoop;
use crate::preferences::PreferenceResolver;
use crate::rate_limit::{RateLimiter, SqlCounterStore};
use crate::repositories::ChannelRepository;
use crate::settings::SettingsStore;
use crate::telemetry;
use crate::template::TemplateRenderer;
use crate::tenant::TenantContext;
use crate::token_cache::TrackingTokenCache;
use crate::transports::{TransportError, TransportRegistry};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub tenant: TenantContext,
    pub events: Arc<EventRegistry>,
    pub channels: Arc<ChannelRegistry>,
    pub settings: Arc<SettingsStore>,
    pub preferences: Arc<PreferenceResolver>,
    pub rate_limiter: Arc<RateLimiter>,
    pub dispatcher: Arc<DispatchOrchestrator>,
    pub analytics: Arc<AnalyticsRecorder>,
    pub transports: Arc<TransportRegistry>,
}

impl AppState {
    /// Build every service from configuration over one connection pool.
    pub fn build(config: Arc<AppConfig>, db: DatabaseConnection) -> Result<Self, TransportError> {
        let transports = Arc::new(TransportRegistry::with_defaults()?);
        let tenant = TenantContext::new(config.multitenancy_enabled);
        let settings = Arc::new(SettingsStore::new(
            db.clone(),
            tenant.clone(),
            Arc::clone(&config),
        ));
        let events = Arc::new(EventRegistry::new(
            event_source_from_config(&config, &db),
            db.clone(),
            tenant.clone(),
        ));
        let channels = Arc::new(ChannelRegistry::new(
            db.clone(),
            tenant.clone(),
            config.enabled_channels.clone(),
        ));
        let preferences = Arc::new(PreferenceResolver::new(
            db.clone(),
            tenant.clone(),
            Arc::clone(&channels),
            Arc::clone(&events),
            Arc::clone(&settings),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            Arc::new(SqlCounterStore::new(db.clone())),
            Arc::clone(&settings),
            tenant.clone(),
        ));
        let token_cache = TrackingTokenCache::with_ttl_days(config.tracking_token_ttl_days);

        let dispatcher = Arc::new(DispatchOrchestrator::new(DispatchDeps {
            db: db.clone(),
            tenant: tenant.clone(),
            events: Arc::clone(&events),
            channels: Arc::clone(&channels),
            preferences: Arc::clone(&preferences),
            rate_limiter: Arc::clone(&rate_limiter),
            settings: Arc::clone(&settings),
            renderer: TemplateRenderer::new(config.app_name.clone(), config.app_url_trimmed()),
            token_cache: token_cache.clone(),
            max_attempts: config.queue.max_attempts,
        }));
        let analytics = Arc::new(AnalyticsRecorder::new(
            db.clone(),
            tenant.clone(),
            Arc::clone(&settings),
            token_cache,
        ));

        Ok(Self {
            config,
            db,
            tenant,
            events,
            channels,
            settings,
            preferences,
            rate_limiter,
            dispatcher,
            analytics,
            transports,
        })
    }

    /// Worker draining the delivery queue through `transports`.
    pub fn delivery_worker(&self, transports: Arc<TransportRegistry>) -> DeliveryWorker {
        DeliveryWorker::new(
            self.db.clone(),
            self.tenant.clone(),
            Arc::clone(&self.channels),
            transports,
            Arc::clone(&self.settings),
            &self.config.queue,
            self.config.app_url_trimmed().to_string(),
        )
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/preferences", get(handlers::preferences::list_preferences))
        .route(
            "/preferences/available",
            get(handlers::preferences::available),
        )
        .route(
            "/preferences/{event_key}",
            get(handlers::preferences::get_preference)
                .put(handlers::preferences::update_preference),
        )
        .route(
            "/admin/notifications",
            get(handlers::admin::list_notifications),
        )
        .route(
            "/admin/notifications/{id}/resend",
            post(handlers::admin::resend_notification),
        )
        .route("/admin/rate-limit", get(handlers::admin::rate_limit_status))
        .route(
            "/admin/events/{event_key}/channels",
            put(handlers::admin::update_event_channels),
        )
        .route(
            "/admin/channels/{channel_type}",
            put(handlers::admin::configure_channel),
        )
        .route(
            "/admin/templates/{event_key}",
            put(handlers::admin::upsert_template),
        )
        .route("/admin/send-test", post(handlers::admin::send_test))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let public = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::health::healthz))
        .route("/readyz", get(handlers::health::readyz))
        .route("/track/open/{token}", get(handlers::tracking::track_open))
        .route("/track/click/{token}", get(handlers::tracking::track_click));

    public
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(telemetry::trace_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Starts the server, the delivery worker and the maintenance loop.
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let addr = config
        .bind_addr()
        .with_context(|| format!("Invalid server address: {}", config.api_bind_addr))?;

    ChannelRepository::new(&db)
        .ensure_defaults(None, &config.enabled_channels)
        .await
        .context("Failed to seed channel rows")?;

    let state =
        AppState::build(Arc::clone(&config), db).context("Failed to build transports")?;

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(
        state
            .delivery_worker(Arc::clone(&state.transports))
            .run(shutdown.clone()),
    );
    let maintenance = tokio::spawn(
        MaintenanceLoop::new(
            Arc::clone(&state.rate_limiter),
            config.maintenance_tick_seconds,
        )
        .run(shutdown.clone()),
    );

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            signal.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    let _ = tokio::join!(worker, maintenance);
    tracing::info!("Server stopped");
    Ok(())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health::healthz,
        crate::handlers::health::readyz,
        crate::handlers::tracking::track_open,
        crate::handlers::tracking::track_click,
        crate::handlers::preferences::list_preferences,
        crate::handlers::preferences::available,
        crate::handlers::preferences::get_preference,
        crate::handlers::preferences::update_preference,
        crate::handlers::admin::list_notifications,
        crate::handlers::admin::resend_notification,
        crate::handlers::admin::rate_limit_status,
        crate::handlers::admin::update_event_channels,
        crate::handlers::admin::configure_channel,
        crate::handlers::admin::upsert_template,
        crate::handlers::admin::send_test,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::ChannelType,
            crate::models::NotificationStatus,
            crate::error::ApiError,
            crate::rate_limit::RateLimitStatus,
            crate::rate_limit::WindowLimits,
            crate::rate_limit::WindowStatus,
            crate::events::Event,
            crate::channels::Channel,
            crate::handlers::health::HealthResponse,
            crate::handlers::preferences::EventPreference,
            crate::handlers::preferences::PreferenceListResponse,
            crate::handlers::preferences::PreferenceResponse,
            crate::handlers::preferences::AvailableResponse,
            crate::handlers::preferences::AvailableEvent,
            crate::handlers::preferences::AvailableChannel,
            crate::handlers::preferences::UpdatePreferenceRequest,
            crate::handlers::preferences::UpdatedPreference,
            crate::handlers::preferences::UpdatePreferenceResponse,
            crate::handlers::admin::NotificationSummary,
            crate::handlers::admin::NotificationListResponse,
            crate::handlers::admin::PageInfo,
            crate::handlers::admin::UpdateEventChannelsRequest,
            crate::handlers::admin::ConfigureChannelRequest,
            crate::handlers::admin::UpsertTemplateRequest,
            crate::handlers::admin::TemplateResponse,
            crate::handlers::admin::SendTestRequest,
            crate::handlers::admin::SendTestResponse,
        )
    ),
    modifiers(&BearerAuth),
    info(
        title = "Notifier API",
        description = "Notification preferences, tracking and administration",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
