//! # Server Configuration
//!
//! This module contains the server setup and configuration for the Leadflow
//! engine: shared application state, router wiring, and middleware layering.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::operator_auth_middleware;
use crate::classify::{OpenAiClassifier, OptionClassifier};
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::mailer::{EmailNotifier, LeadNotifier};
use crate::wa::{CloudApiSender, WhatsAppSender};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub crypto_key: CryptoKey,
    pub sender: Arc<dyn WhatsAppSender>,
    pub classifier: Arc<dyn OptionClassifier>,
    pub notifier: Arc<dyn LeadNotifier>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let operator_routes = Router::new()
        .route("/api/v1/leads/{id}/take", post(handlers::leads::take_lead))
        .route("/api/v1/leads/{id}/close", post(handlers::leads::close_lead))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            operator_auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/webhooks/whatsapp",
            get(handlers::webhook::verify_webhook).post(handlers::webhook::receive_webhook),
        )
        .route(
            "/internal/reminders/process",
            post(handlers::reminders::process_reminders)
                .get(handlers::reminders::process_reminders),
        )
        .merge(operator_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let crypto_key = CryptoKey::new(config.crypto_key.clone().unwrap_or_default())
        .map_err(|e| format!("Invalid crypto key: {}", e))?;

    let sender: Arc<dyn WhatsAppSender> = Arc::new(CloudApiSender::new(&config.whatsapp));
    let classifier: Arc<dyn OptionClassifier> = Arc::new(OpenAiClassifier::new(&config.classifier));
    let notifier: Arc<dyn LeadNotifier> = Arc::new(EmailNotifier::new(&config.email));

    // Resolve the configured bind address before consuming the config
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState {
        config: Arc::new(config),
        db,
        crypto_key,
        sender,
        classifier,
        notifier,
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::webhook::verify_webhook,
        crate::handlers::webhook::receive_webhook,
        crate::handlers::reminders::process_reminders,
        crate::handlers::leads::take_lead,
        crate::handlers::leads::close_lead,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::webhook::WebhookAck,
            crate::handlers::leads::LeadActionResponse,
            crate::scheduler::ReminderRunSummary,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Leadflow Engine API",
        description = "Multi-tenant WhatsApp conversation engine",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
