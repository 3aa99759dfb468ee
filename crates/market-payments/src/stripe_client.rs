//! Stripe Checkout Integration
//!
//! Live `PaymentProcessor` backed by Stripe's hosted checkout.

use async_trait::async_trait;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionId, CheckoutSessionMode,
    CheckoutSessionPaymentStatus, CheckoutSessionStatus, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, StripeError, Subscription, SubscriptionId,
};

use crate::checkout::{
    CheckoutSessionParams, CreatedSession, PaymentProcessor, ProcessorSession,
    ProcessorSubscriptionState, SessionState,
};
use crate::error::{PaymentError, Result};

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }
}

/// A 404 from Stripe means the object does not exist
fn lookup_error(err: StripeError, what: &str) -> PaymentError {
    match &err {
        StripeError::Stripe(request) if request.http_status == 404 => PaymentError::NotFound(what.to_string()),
        _ => PaymentError::Upstream(err.to_string()),
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_checkout_session(&self, params: CheckoutSessionParams) -> Result<CreatedSession> {
        let mut create = CreateCheckoutSession::new();
        create.mode = Some(CheckoutSessionMode::Subscription);
        create.success_url = Some(&params.success_url);
        create.cancel_url = Some(&params.cancel_url);
        create.client_reference_id = params.client_reference_id.as_deref();

        if !params.metadata.is_empty() {
            create.metadata = Some(params.metadata.clone().into_iter().collect());
        }

        create.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(params.price_id.clone()),
            quantity: Some(params.quantity),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, create)
            .await
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;

        Ok(CreatedSession {
            id: session.id.to_string(),
            url: session.url,
        })
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<ProcessorSession> {
        let what = format!("checkout session {session_id}");
        // Not a Stripe session ID, so Stripe cannot have it
        let id = session_id
            .parse::<CheckoutSessionId>()
            .map_err(|_| PaymentError::NotFound(what.clone()))?;

        let session = StripeCheckoutSession::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| lookup_error(e, &what))?;

        let state = match session.status {
            Some(CheckoutSessionStatus::Complete) => SessionState::Complete,
            Some(CheckoutSessionStatus::Expired) => SessionState::Expired,
            _ => SessionState::Open,
        };

        Ok(ProcessorSession {
            id: session.id.to_string(),
            state,
            paid: session.payment_status == CheckoutSessionPaymentStatus::Paid,
            customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
            subscription_id: session.subscription.as_ref().map(|s| s.id().to_string()),
            metadata: session
                .metadata
                .clone()
                .unwrap_or_default()
                .into_iter()
                .collect(),
            created: session.created,
        })
    }

    async fn subscription_state(&self, subscription_id: &str) -> Result<ProcessorSubscriptionState> {
        let what = format!("subscription {subscription_id}");
        let id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|_| PaymentError::NotFound(what.clone()))?;

        let subscription = Subscription::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| lookup_error(e, &what))?;

        Ok(match subscription.status {
            stripe::SubscriptionStatus::Active | stripe::SubscriptionStatus::Trialing => {
                ProcessorSubscriptionState::Active
            }
            other => ProcessorSubscriptionState::Inactive(other.to_string()),
        })
    }

    fn name(&self) -> &str {
        "Stripe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use stripe::RequestError;

    #[test]
    fn test_missing_objects_map_to_not_found() {
        let missing = StripeError::Stripe(RequestError {
            http_status: 404,
            ..Default::default()
        });
        assert!(matches!(lookup_error(missing, "cs_x"), PaymentError::NotFound(_)));

        let limited = StripeError::Stripe(RequestError {
            http_status: 429,
            ..Default::default()
        });
        assert!(matches!(lookup_error(limited, "cs_x"), PaymentError::Upstream(_)));

        let timeout = StripeError::Timeout;
        assert!(matches!(lookup_error(timeout, "cs_x"), PaymentError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_malformed_session_id_is_not_found() {
        let client = StripeClient::new("sk_test_xxx");
        assert_eq!(client.name(), "Stripe");
        assert!(matches!(
            client.retrieve_checkout_session("not-a-session").await,
            Err(PaymentError::NotFound(_))
        ));
    }
}
