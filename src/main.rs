//! Tollgate service entry point.
//!
//! Loads configuration, wires the adapters to the application handlers, and
//! serves the billing API.

use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tollgate::adapters::email::ResendNotifier;
use tollgate::adapters::http::{billing_router, BillingAppState};
use tollgate::adapters::postgres::PostgresUserStore;
use tollgate::adapters::stripe::{StripeGateway, WebhookSignatureVerifier};
use tollgate::config::AppConfig;
use tollgate::ports::{NoopBillingHooks, NoopNotifier, Notifier};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.server.log_level))
        .init();

    config.validate()?;
    let catalog = config.billing.load_catalog()?;
    tracing::info!(
        plans = catalog.plans.plans().len(),
        coupons = catalog.coupons.len(),
        "loaded billing catalog"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;
    sqlx::migrate!().run(&pool).await?;

    let notifier: Arc<dyn Notifier> = match (
        &config.email.resend_api_key,
        &config.email.from_address,
    ) {
        (Some(key), Some(from)) => Arc::new(ResendNotifier::new(key.clone(), from.clone())),
        _ => {
            tracing::warn!("email not configured; notifications will be dropped");
            Arc::new(NoopNotifier)
        }
    };

    let webhook_verifier = config
        .payment
        .stripe_webhook_secret
        .as_ref()
        .map(|secret| Arc::new(WebhookSignatureVerifier::new(secret.clone())));
    if webhook_verifier.is_none() {
        tracing::warn!("webhook signature verification disabled");
    }

    if config.payment.is_test_mode() {
        tracing::info!("Stripe is in test mode");
    }

    let state = BillingAppState {
        store: Arc::new(PostgresUserStore::new(pool)),
        gateway: Arc::new(StripeGateway::new(config.payment.stripe_api_key.clone())),
        notifier,
        hooks: Arc::new(NoopBillingHooks),
        catalog: Arc::new(catalog),
        settings: Arc::new(config.billing.clone()),
        webhook_verifier,
    };

    let app = Router::new()
        .nest("/billing", billing_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.server.socket_addr();
    tracing::info!(%addr, environment = ?config.server.environment, "starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
