//! Server start-up: configuration, seeding, middleware and graceful shutdown.

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use forward_x402_types::facilitator::Facilitator;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use tower_http::trace::TraceLayer;

#[cfg(feature = "telemetry")]
use crate::telemetry::Telemetry;

use crate::config::Config;
use crate::handlers;
use crate::mailer::LogMailer;
use crate::sig_down::SigDown;
use crate::state::AppState;
use crate::store::{EndpointStore, MemoryStore};

/// The HTTP application with its middleware, ready to be served.
pub fn app<F>(state: AppState<F>) -> Router
where
    F: Facilitator + Send + Sync + 'static,
    F::Error: Send,
{
    Router::new()
        .merge(handlers::routes().with_state(Arc::new(state)))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        )
}

/// Creates the endpoints listed in the configuration.
pub fn seed_store(store: &dyn EndpointStore, config: &Config) -> Result<(), crate::store::StoreError> {
    let settings = config.forward_settings();
    for seed in config.endpoints() {
        let endpoint = store.create(seed.clone().into())?;
        tracing::info!(
            label = %endpoint.label,
            price = %endpoint.base_price,
            url = %settings.forward_url(&endpoint),
            "endpoint ready"
        );
    }
    Ok(())
}

#[cfg(not(feature = "telemetry"))]
fn init_logging() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Starts the forwarding server.
///
/// - Loads `.env` variables.
/// - Installs logging, and OpenTelemetry tracing when configured.
/// - Builds the facilitator client and seeds the endpoint store.
/// - Serves until SIGTERM or SIGINT.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    #[cfg(feature = "telemetry")]
    let _telemetry = Telemetry::try_new()?;
    #[cfg(not(feature = "telemetry"))]
    init_logging();

    let config = Config::load()?;
    let facilitator = config.facilitator().client()?;
    tracing::info!(
        url = %facilitator.base_url(),
        signed = config.facilitator().signs_requests(),
        "using facilitator"
    );

    let settings = config.forward_settings();
    if settings.pay_to.is_empty() {
        tracing::warn!("X402_PAYMENT_ADDRESS is not set; paid requests will fail");
    }

    let store = Arc::new(MemoryStore::new());
    seed_store(store.as_ref(), &config)?;

    let state = AppState::new(facilitator, store, Arc::new(LogMailer), settings);
    let http_endpoints = app(state);

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;
    sig_down.recv().await;

    Ok(())
}
