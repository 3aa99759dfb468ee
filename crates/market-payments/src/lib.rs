//! # market-payments
//!
//! Checkout initiation, webhook handling and reconciliation for the service
//! marketplace.
//!
//! ## Subscription Flow
//!
//! **Flow:** Pricing page → Stripe hosted checkout → Dashboard return
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │   Pricing   │────▶│  Stripe Hosted  │────▶│    Dashboard     │
//! │ (initiator) │     │  Checkout Page  │     │ (return handler) │
//! └─────────────┘     └────────┬────────┘     └──────────────────┘
//!                              │ signed webhook
//!                              ▼
//!                     ┌─────────────────┐     ┌──────────────────┐
//!                     │ WebhookReceiver │────▶│    UserStore     │
//!                     └─────────────────┘     └──────────────────┘
//!                                                      ▲
//!                     ┌─────────────────┐              │
//!                     │ Reconciliation  │──────────────┘
//!                     └─────────────────┘
//! ```
//!
//! The webhook is the only path that activates a subscription. The browser
//! return trip writes an advisory plan hint, and the periodic sweep repairs
//! anything a lost delivery left behind.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use market_payments::{AuthenticatedCheckout, CheckoutInitiator, PlanCatalog, StripeClient};
//!
//! let stripe = Arc::new(StripeClient::new("sk_test_xxx"));
//! let catalog = PlanCatalog::from_lookup(|k| std::env::var(k).ok());
//! let initiator = CheckoutInitiator::new(stripe, catalog, "https://market.example");
//!
//! let started = initiator.start_authenticated(Some(&user_id), AuthenticatedCheckout {
//!     price_id: "price_premium".into(),
//!     quantity: None,
//!     plan_name: "Premium".into(),
//!     user_id: None,
//! }).await?;
//!
//! // Redirect user to: started.checkout_url
//! ```

mod checkout;
mod error;
pub mod mock;
mod plan;
mod reconcile;
mod stripe_client;
mod webhook;

pub use checkout::{
    AuthenticatedCheckout, CheckoutInitiator, CheckoutSessionParams, CheckoutStarted,
    CorrelatedCheckout, CreatedSession, METADATA_PLAN_NAME, METADATA_USER_ID, PaymentProcessor,
    ProcessorSession, ProcessorSubscriptionState, SessionState,
};
pub use error::{PaymentError, Result};
pub use plan::{BillingInterval, PlanCatalog, PlanPricing, pricing};
pub use reconcile::{ReconciliationSweep, SweepReport};
pub use stripe_client::StripeClient;
pub use webhook::{
    CompletedCheckout, DEFAULT_TOLERANCE_SECS, EndedSubscription, SIGNATURE_HEADER,
    WebhookEvent, WebhookOutcome, WebhookReceiver, sign_payload, verify_signature,
};
