//! Checkout Session Initiation
//!
//! Opens a hosted checkout session with the payment processor and returns the
//! session identifier. Nothing is stored locally; the plan and user travel
//! with the session and come back in the completion event.
//!
//! Two entry points exist:
//!
//! - **Correlated** (`{planId, userId}`): no caller authentication; the user ID
//!   rides along as `client_reference_id` and in the success URL. The webhook
//!   does not trust it.
//! - **Authenticated** (`{priceId, quantity?, planName}`): the caller must be a
//!   signed-in principal; `userId` and `planName` are attached as session
//!   metadata, which is what the webhook applies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use market_core::{Plan, UserId};
use market_core::checkout_return::{PLAN_PARAM, SESSION_PARAM, STATUS_PARAM};

use crate::error::{PaymentError, Result};
use crate::plan::PlanCatalog;

/// Placeholder the processor substitutes with the real session ID
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Metadata keys read back by the webhook receiver
pub const METADATA_USER_ID: &str = "userId";
pub const METADATA_PLAN_NAME: &str = "planName";

/// Landing route for the return trip
pub const RETURN_PATH: &str = "/dashboard";

/// Parameters for a processor checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSessionParams {
    pub price_id: String,
    pub quantity: u64,
    pub success_url: String,
    pub cancel_url: String,
    pub client_reference_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// A session as returned at creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSession {
    pub id: String,
    pub url: Option<String>,
}

/// Processor-side lifecycle of a checkout session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Complete,
    Expired,
}

/// A session as retrieved later (for reconciliation)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorSession {
    pub id: String,
    pub state: SessionState,
    pub paid: bool,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
    /// Unix seconds
    pub created: i64,
}

/// Processor view of a subscription
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessorSubscriptionState {
    /// Active or trialing
    Active,
    /// Any other status (canceled, unpaid, past_due, ...)
    Inactive(String),
}

/// Payment processor trait (Strategy pattern)
///
/// Implemented by the live Stripe client and by `MockProcessor`.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a hosted checkout session
    async fn create_checkout_session(&self, params: CheckoutSessionParams) -> Result<CreatedSession>;

    /// Look up a checkout session by ID
    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<ProcessorSession>;

    /// Current state of a subscription
    async fn subscription_state(&self, subscription_id: &str) -> Result<ProcessorSubscriptionState>;

    /// Processor name
    fn name(&self) -> &str;
}

/// Correlated (unauthenticated) checkout request
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelatedCheckout {
    /// Processor price ID
    #[serde(default, alias = "priceId")]
    pub plan_id: String,

    #[serde(default, alias = "uid")]
    pub user_id: String,
}

/// Authenticated checkout request
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedCheckout {
    #[serde(default)]
    pub price_id: String,

    #[serde(default)]
    pub quantity: Option<u64>,

    #[serde(default)]
    pub plan_name: String,

    /// Must equal the caller when present
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Result handed back to the caller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStarted {
    pub session_id: String,
    pub checkout_url: Option<String>,
}

/// Builds and submits checkout sessions
pub struct CheckoutInitiator {
    processor: Arc<dyn PaymentProcessor>,
    catalog: PlanCatalog,
    base_url: String,
}

impl CheckoutInitiator {
    pub fn new(processor: Arc<dyn PaymentProcessor>, catalog: PlanCatalog, base_url: impl Into<String>) -> Self {
        Self {
            processor,
            catalog,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Start a checkout correlated only by `client_reference_id`
    pub async fn start_correlated(&self, request: CorrelatedCheckout) -> Result<CheckoutStarted> {
        let plan_id = request.plan_id.trim();
        let user_id = request.user_id.trim();
        if plan_id.is_empty() || user_id.is_empty() {
            return Err(PaymentError::InvalidArgument("Price ID and User ID are required.".into()));
        }
        let plan = self
            .catalog
            .plan_for_price(plan_id)
            .ok_or_else(|| PaymentError::InvalidArgument(format!("unknown price '{plan_id}'")))?;

        let params = CheckoutSessionParams {
            price_id: plan_id.to_string(),
            quantity: 1,
            success_url: format!(
                "{}&userId={}",
                self.success_url(plan),
                urlencoding::encode(user_id)
            ),
            cancel_url: self.cancel_url(),
            client_reference_id: Some(user_id.to_string()),
            metadata: BTreeMap::new(),
        };

        self.submit(params, user_id).await
    }

    /// Start a checkout for a signed-in principal, carrying trusted metadata
    pub async fn start_authenticated(
        &self,
        principal: Option<&UserId>,
        request: AuthenticatedCheckout,
    ) -> Result<CheckoutStarted> {
        let principal = principal.ok_or_else(|| {
            PaymentError::Unauthenticated("The function must be called while authenticated.".into())
        })?;
        if let Some(user_id) = request.user_id.as_deref().filter(|u| !u.is_empty()) {
            if user_id != principal.as_str() {
                return Err(PaymentError::Unauthenticated(
                    "userId does not match the signed-in user".into(),
                ));
            }
        }

        let price_id = request.price_id.trim();
        if price_id.is_empty() || request.plan_name.trim().is_empty() {
            return Err(PaymentError::InvalidArgument(
                "Missing priceId, userId, or planName.".into(),
            ));
        }
        let plan = Plan::parse_paid(&request.plan_name).ok_or_else(|| {
            PaymentError::InvalidArgument(format!("unknown plan '{}'", request.plan_name))
        })?;
        // The metadata is trusted later, so the price must really be this plan's
        if self.catalog.plan_for_price(price_id) != Some(plan) {
            return Err(PaymentError::InvalidArgument(format!(
                "price '{price_id}' does not belong to plan {plan}"
            )));
        }
        let quantity = request.quantity.unwrap_or(1);
        if quantity == 0 {
            return Err(PaymentError::InvalidArgument("quantity must be at least 1".into()));
        }

        let mut metadata = BTreeMap::new();
        metadata.insert(METADATA_USER_ID.to_string(), principal.to_string());
        metadata.insert(METADATA_PLAN_NAME.to_string(), plan.as_str().to_string());

        let params = CheckoutSessionParams {
            price_id: price_id.to_string(),
            quantity,
            success_url: self.success_url(plan),
            cancel_url: self.cancel_url(),
            client_reference_id: Some(principal.to_string()),
            metadata,
        };

        self.submit(params, principal.as_str()).await
    }

    /// `…/dashboard?payment_status=success&session_id={CHECKOUT_SESSION_ID}&plan=…`
    pub fn success_url(&self, plan: Plan) -> String {
        format!(
            "{}{RETURN_PATH}?{STATUS_PARAM}=success&{SESSION_PARAM}={SESSION_ID_PLACEHOLDER}&{PLAN_PARAM}={}",
            self.base_url,
            plan.as_str()
        )
    }

    /// `…/dashboard?payment_status=cancelled`
    pub fn cancel_url(&self) -> String {
        format!("{}{RETURN_PATH}?{STATUS_PARAM}=cancelled", self.base_url)
    }

    // Single attempt; the user retries from the pricing page
    async fn submit(&self, params: CheckoutSessionParams, user_id: &str) -> Result<CheckoutStarted> {
        let price_id = params.price_id.clone();
        match self.processor.create_checkout_session(params).await {
            Ok(session) => {
                tracing::info!(
                    session_id = %session.id,
                    user_id = %user_id,
                    price_id = %price_id,
                    processor = self.processor.name(),
                    "Created checkout session"
                );
                Ok(CheckoutStarted {
                    session_id: session.id,
                    checkout_url: session.url,
                })
            }
            Err(err) => {
                tracing::error!(error = %err, user_id = %user_id, "Error creating checkout session");
                Err(match err {
                    PaymentError::Upstream(_) => err,
                    other => PaymentError::Upstream(other.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProcessor;

    fn initiator(processor: Arc<MockProcessor>) -> CheckoutInitiator {
        let catalog = PlanCatalog::new()
            .with_price(Plan::Basic, "price_basic")
            .with_price(Plan::Premium, "price_premium");
        CheckoutInitiator::new(processor, catalog, "https://market.test/")
    }

    fn premium_request() -> AuthenticatedCheckout {
        AuthenticatedCheckout {
            price_id: "price_premium".into(),
            quantity: None,
            plan_name: "Premium".into(),
            user_id: None,
        }
    }

    #[test]
    fn test_callback_urls() {
        let init = initiator(Arc::new(MockProcessor::new()));
        assert_eq!(
            init.success_url(Plan::Basic),
            "https://market.test/dashboard?payment_status=success&session_id={CHECKOUT_SESSION_ID}&plan=Basic"
        );
        assert_eq!(init.cancel_url(), "https://market.test/dashboard?payment_status=cancelled");
    }

    #[tokio::test]
    async fn test_authenticated_checkout_attaches_metadata() {
        let processor = Arc::new(MockProcessor::new());
        let init = initiator(processor.clone());
        let user = UserId::from_string("u1");

        let started = init.start_authenticated(Some(&user), premium_request()).await.unwrap();
        assert!(started.session_id.starts_with("cs_test_"));

        let requests = processor.created_requests();
        assert_eq!(requests.len(), 1);
        let params = &requests[0];
        assert_eq!(params.quantity, 1);
        assert_eq!(params.metadata.get(METADATA_USER_ID).map(String::as_str), Some("u1"));
        assert_eq!(params.metadata.get(METADATA_PLAN_NAME).map(String::as_str), Some("Premium"));
        assert!(params.success_url.contains(SESSION_ID_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_authenticated_checkout_requires_principal() {
        let init = initiator(Arc::new(MockProcessor::new()));
        let result = init.start_authenticated(None, premium_request()).await;
        assert!(matches!(result, Err(PaymentError::Unauthenticated(_))));

        let mut other = premium_request();
        other.user_id = Some("u2".into());
        let result = init.start_authenticated(Some(&UserId::from_string("u1")), other).await;
        assert!(matches!(result, Err(PaymentError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn test_authenticated_checkout_validates_arguments() {
        let processor = Arc::new(MockProcessor::new());
        let init = initiator(processor.clone());
        let user = UserId::from_string("u1");

        let mut missing = premium_request();
        missing.plan_name = String::new();
        assert!(matches!(
            init.start_authenticated(Some(&user), missing).await,
            Err(PaymentError::InvalidArgument(_))
        ));

        let mut mismatched = premium_request();
        mismatched.price_id = "price_basic".into();
        assert!(matches!(
            init.start_authenticated(Some(&user), mismatched).await,
            Err(PaymentError::InvalidArgument(_))
        ));

        let mut zero = premium_request();
        zero.quantity = Some(0);
        assert!(matches!(
            init.start_authenticated(Some(&user), zero).await,
            Err(PaymentError::InvalidArgument(_))
        ));

        assert!(processor.created_requests().is_empty());
    }

    #[tokio::test]
    async fn test_correlated_checkout() {
        let processor = Arc::new(MockProcessor::new());
        let init = initiator(processor.clone());

        let started = init
            .start_correlated(CorrelatedCheckout {
                plan_id: "price_basic".into(),
                user_id: "user 7".into(),
            })
            .await
            .unwrap();
        assert!(!started.session_id.is_empty());

        let params = &processor.created_requests()[0];
        assert_eq!(params.client_reference_id.as_deref(), Some("user 7"));
        assert!(params.metadata.is_empty());
        assert!(params.success_url.ends_with("&plan=Basic&userId=user%207"));

        let missing = init
            .start_correlated(CorrelatedCheckout {
                plan_id: String::new(),
                user_id: "u1".into(),
            })
            .await;
        assert!(matches!(missing, Err(PaymentError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_surfaced_without_retry() {
        let processor = Arc::new(MockProcessor::new());
        processor.fail_next_with("No such price: 'price_premium'");
        let init = initiator(processor.clone());

        let result = init
            .start_authenticated(Some(&UserId::from_string("u1")), premium_request())
            .await;
        match result {
            Err(PaymentError::Upstream(msg)) => assert!(msg.contains("No such price")),
            other => panic!("expected upstream error, got {other:?}"),
        }
        assert_eq!(processor.create_attempts(), 1);
    }
}
