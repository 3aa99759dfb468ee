//! Application State

use std::sync::Arc;

use market_core::{ListingStore, MemoryListingStore, MemorySessionStore, MemoryUserStore, UserStore};
use market_payments::{CheckoutInitiator, PaymentProcessor, PlanCatalog, WebhookReceiver};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Subscription state store
    pub users: Arc<dyn UserStore>,

    pub listings: Arc<dyn ListingStore>,

    /// Bearer token sessions
    pub sessions: Arc<MemorySessionStore>,

    pub catalog: Arc<PlanCatalog>,

    /// Checkout initiator (None if payments are not configured)
    pub checkout: Option<Arc<CheckoutInitiator>>,

    /// Webhook receiver (None if payments are not configured)
    pub webhook: Option<Arc<WebhookReceiver<dyn UserStore>>>,
}

impl AppState {
    /// In-memory stores, payments disabled
    pub fn new(catalog: PlanCatalog) -> Self {
        Self {
            users: Arc::new(MemoryUserStore::new()),
            listings: Arc::new(MemoryListingStore::new()),
            sessions: Arc::new(MemorySessionStore::new()),
            catalog: Arc::new(catalog),
            checkout: None,
            webhook: None,
        }
    }

    /// Enable checkout and webhook handling against a processor
    pub fn with_payments(
        mut self,
        processor: Arc<dyn PaymentProcessor>,
        webhook_secret: &str,
        base_url: &str,
        tolerance_secs: i64,
    ) -> Self {
        self.checkout = Some(Arc::new(CheckoutInitiator::new(
            processor,
            (*self.catalog).clone(),
            base_url,
        )));
        self.webhook = Some(Arc::new(
            WebhookReceiver::<dyn UserStore>::new(self.users.clone(), webhook_secret)
                .with_tolerance(tolerance_secs),
        ));
        self
    }

    pub fn payments_configured(&self) -> bool {
        self.checkout.is_some() && self.webhook.is_some()
    }
}
