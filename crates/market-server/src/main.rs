//! Service Marketplace HTTP Server
//!
//! Axum-based server for accounts, service listings and plan subscriptions
//! through Stripe hosted checkout.

mod config;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_payments::{PaymentProcessor, PlanCatalog, ReconciliationSweep, StripeClient};

use crate::config::{PaymentConfig, ServerConfig};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;

    // Plan catalog
    let catalog = PlanCatalog::from_lookup(|key| std::env::var(key).ok());
    for plan in catalog.list() {
        match &plan.price_id {
            Some(price) => tracing::info!("  • {} → {}", plan.name, price),
            None => tracing::warn!("  • {} has no price configured", plan.name),
        }
    }

    let mut state = AppState::new(catalog);

    // Initialize payments
    let processor: Option<Arc<dyn PaymentProcessor>> = match PaymentConfig::from_env() {
        Ok(payments) => {
            if payments.is_test_mode() {
                tracing::info!("✓ Stripe configured (test mode)");
            } else {
                tracing::info!("✓ Stripe configured");
            }
            let stripe: Arc<dyn PaymentProcessor> = Arc::new(StripeClient::new(&payments.secret_key));
            state = state.with_payments(
                stripe.clone(),
                &payments.webhook_secret,
                &config.base_url,
                config.webhook_tolerance_secs,
            );
            Some(stripe)
        }
        Err(e) => {
            tracing::warn!("⚠ Stripe not configured - payments disabled ({e})");
            tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
            None
        }
    };

    // Reconciliation sweep
    match (config.reconcile_interval, processor) {
        (Some(every), Some(processor)) => {
            let sweep = ReconciliationSweep::new(state.users.clone(), processor);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(every);
                // The first tick completes immediately
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    sweep.run().await;
                }
            });
            tracing::info!("✓ Reconciliation sweep every {}s", every.as_secs());
        }
        (None, Some(_)) => tracing::info!("Reconciliation sweep disabled"),
        _ => {}
    }

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 market server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    for (method, path, purpose) in routes::ENDPOINTS {
        tracing::info!("  {method} {path:<24} - {purpose}");
    }
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
