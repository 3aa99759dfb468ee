//! Stripe Webhook Handling
//!
//! The authoritative path for subscription changes. Every delivery is
//! verified against the raw body before anything is parsed, decoded into a
//! closed set of event variants, and applied with a guarded store update so
//! that redelivery and out-of-order delivery are harmless.
//!
//! Once the signature checks out the receiver always acknowledges, even when
//! the store write fails: a non-2xx answer would only make the processor
//! redeliver in a loop. The reconciliation sweep repairs those cases.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;

use market_core::{CoreError, Plan, SkipReason, UpdateOutcome, UserId, UserPatch, UserStore};

use crate::checkout::{METADATA_PLAN_NAME, METADATA_USER_ID};
use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum accepted age of a signature timestamp
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// Verify a webhook signature over the raw body.
///
/// Header format: `t=<timestamp>,v1=<hex>[,v1=<hex>...]`; the signed payload
/// is `"<timestamp>." + body`. Any matching `v1` entry is accepted.
pub fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| PaymentError::SignatureInvalid("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(PaymentError::SignatureInvalid("missing v1 signature".into()));
    }
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| PaymentError::SignatureInvalid("malformed timestamp".into()))?;
    if tolerance_secs > 0 && (now - ts).abs() > tolerance_secs {
        return Err(PaymentError::SignatureInvalid("timestamp outside tolerance".into()));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::SignatureInvalid(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(PaymentError::SignatureInvalid("no matching signature".into()))
    }
}

/// Produce a signature header the way the processor does
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes())))
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: i64,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

/// Reference that may arrive as a bare ID or an expanded object
#[derive(Deserialize)]
#[serde(untagged)]
enum ExpandableId {
    Id(String),
    Object { id: String },
}

impl ExpandableId {
    fn into_id(self) -> String {
        match self {
            ExpandableId::Id(id) | ExpandableId::Object { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct SessionObject {
    id: String,
    #[serde(default)]
    customer: Option<ExpandableId>,
    #[serde(default)]
    subscription: Option<ExpandableId>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
struct SubscriptionObject {
    id: String,
}

/// Completed checkout session as read from the event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedCheckout {
    pub event_id: String,
    pub created: i64,
    pub session_id: String,
    pub user_id: Option<UserId>,
    /// Raw `planName` metadata value
    pub plan_name: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
}

/// Subscription that ended at the processor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndedSubscription {
    pub event_id: String,
    pub created: i64,
    pub subscription_id: String,
}

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Checkout completed - apply the plan from metadata
    CheckoutSessionCompleted(CompletedCheckout),

    /// Subscription deleted - drop back to no plan
    SubscriptionDeleted(EndedSubscription),

    /// Anything else is acknowledged and ignored
    Unknown { event_id: String, event_type: String },
}

impl WebhookEvent {
    /// Decode a verified payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        match raw.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                let session: SessionObject = serde_json::from_value(raw.data.object)
                    .map_err(|e| PaymentError::WebhookParse(format!("checkout session: {e}")))?;
                let mut metadata = session.metadata.unwrap_or_default();
                let user_id = metadata
                    .remove(METADATA_USER_ID)
                    .filter(|u| !u.trim().is_empty())
                    .map(UserId::from_string);
                let plan_name = metadata
                    .remove(METADATA_PLAN_NAME)
                    .filter(|p| !p.trim().is_empty());

                Ok(WebhookEvent::CheckoutSessionCompleted(CompletedCheckout {
                    event_id: raw.id,
                    created: raw.created,
                    session_id: session.id,
                    user_id,
                    plan_name,
                    customer_id: session.customer.map(ExpandableId::into_id),
                    subscription_id: session.subscription.map(ExpandableId::into_id),
                }))
            }
            SUBSCRIPTION_DELETED => {
                let subscription: SubscriptionObject = serde_json::from_value(raw.data.object)
                    .map_err(|e| PaymentError::WebhookParse(format!("subscription: {e}")))?;
                Ok(WebhookEvent::SubscriptionDeleted(EndedSubscription {
                    event_id: raw.id,
                    created: raw.created,
                    subscription_id: subscription.id,
                }))
            }
            _ => Ok(WebhookEvent::Unknown {
                event_id: raw.id,
                event_type: raw.event_type,
            }),
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            WebhookEvent::CheckoutSessionCompleted(_) => CHECKOUT_SESSION_COMPLETED,
            WebhookEvent::SubscriptionDeleted(_) => SUBSCRIPTION_DELETED,
            WebhookEvent::Unknown { event_type, .. } => event_type,
        }
    }

    pub fn event_id(&self) -> &str {
        match self {
            WebhookEvent::CheckoutSessionCompleted(c) => &c.event_id,
            WebhookEvent::SubscriptionDeleted(s) => &s.event_id,
            WebhookEvent::Unknown { event_id, .. } => event_id,
        }
    }
}

/// What the receiver did with a verified event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Subscription state written
    Applied { user_id: UserId },

    /// Guard skipped the write (replay, stale or superseded)
    Skipped { user_id: UserId, reason: SkipReason },

    /// Event carried nothing we can act on
    Ignored { reason: String },

    /// Write failed; acknowledged anyway
    PersistFailed { user_id: UserId, error: String },

    /// Unknown event type
    Acknowledged { event_type: String },
}

/// Webhook receiver
pub struct WebhookReceiver<S: UserStore + ?Sized> {
    store: Arc<S>,
    secret: String,
    tolerance_secs: i64,
}

impl<S: UserStore + ?Sized> WebhookReceiver<S> {
    pub fn new(store: Arc<S>, secret: impl Into<String>) -> Self {
        Self {
            store,
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Override the timestamp tolerance (0 disables the age check)
    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify signature and parse event
    pub fn verify(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent> {
        let now = chrono::Utc::now().timestamp();
        verify_signature(payload, signature, &self.secret, self.tolerance_secs, now)?;
        WebhookEvent::parse(payload)
    }

    /// Full delivery: verify, parse, dispatch.
    ///
    /// Errors only for `SignatureInvalid` and `WebhookParse`; the caller maps
    /// them to a 400 and the processor redelivers.
    pub async fn receive(&self, payload: &[u8], signature: &str) -> Result<WebhookOutcome> {
        let event = self.verify(payload, signature)?;
        Ok(self.handle(event).await)
    }

    /// Process a verified event
    pub async fn handle(&self, event: WebhookEvent) -> WebhookOutcome {
        tracing::info!(
            event_id = %event.event_id(),
            event_type = %event.event_type(),
            "Processing Stripe webhook"
        );

        match event {
            WebhookEvent::CheckoutSessionCompleted(completed) => self.checkout_completed(completed).await,
            WebhookEvent::SubscriptionDeleted(ended) => self.subscription_deleted(ended).await,
            WebhookEvent::Unknown { event_type, .. } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                WebhookOutcome::Acknowledged { event_type }
            }
        }
    }

    async fn checkout_completed(&self, completed: CompletedCheckout) -> WebhookOutcome {
        let Some(user_id) = completed.user_id else {
            tracing::info!(session_id = %completed.session_id, "Checkout completion without userId metadata");
            return WebhookOutcome::Ignored {
                reason: "missing userId metadata".into(),
            };
        };
        let Some(raw_plan) = completed.plan_name else {
            tracing::info!(session_id = %completed.session_id, user_id = %user_id, "Checkout completion without planName metadata");
            return WebhookOutcome::Ignored {
                reason: "missing planName metadata".into(),
            };
        };
        let Some(plan) = Plan::parse_paid(&raw_plan) else {
            tracing::warn!(plan_name = %raw_plan, user_id = %user_id, "Checkout completion for unknown plan");
            return WebhookOutcome::Ignored {
                reason: format!("unknown plan '{raw_plan}'"),
            };
        };

        let patch = UserPatch::checkout_completed(
            completed.session_id.clone(),
            completed.created,
            plan,
            completed.customer_id,
            completed.subscription_id,
        );

        match self.store.update(&user_id, patch).await {
            Ok(UpdateOutcome::Applied) => {
                tracing::info!(user_id = %user_id, plan = %plan, session_id = %completed.session_id, "User subscribed");
                WebhookOutcome::Applied { user_id }
            }
            Ok(UpdateOutcome::Skipped(reason)) => {
                tracing::info!(user_id = %user_id, session_id = %completed.session_id, ?reason, "Checkout completion already reflected");
                WebhookOutcome::Skipped { user_id, reason }
            }
            Err(CoreError::NotFound(_)) => {
                tracing::warn!(user_id = %user_id, "Checkout completion for unknown user");
                WebhookOutcome::Ignored {
                    reason: format!("unknown user {user_id}"),
                }
            }
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "Error updating user subscription");
                WebhookOutcome::PersistFailed {
                    user_id,
                    error: err.to_string(),
                }
            }
        }
    }

    async fn subscription_deleted(&self, ended: EndedSubscription) -> WebhookOutcome {
        let user = match self.store.find_by_subscription(&ended.subscription_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::info!(subscription_id = %ended.subscription_id, "No user holds deleted subscription");
                return WebhookOutcome::Ignored {
                    reason: format!("unknown subscription {}", ended.subscription_id),
                };
            }
            Err(err) => {
                tracing::error!(subscription_id = %ended.subscription_id, error = %err, "Error looking up subscription owner");
                return WebhookOutcome::Ignored {
                    reason: err.to_string(),
                };
            }
        };

        let patch = UserPatch::subscription_ended(ended.subscription_id.clone(), ended.created);
        match self.store.update(&user.id, patch).await {
            Ok(UpdateOutcome::Applied) => {
                tracing::info!(user_id = %user.id, subscription_id = %ended.subscription_id, "Subscription ended");
                WebhookOutcome::Applied { user_id: user.id }
            }
            Ok(UpdateOutcome::Skipped(reason)) => WebhookOutcome::Skipped {
                user_id: user.id,
                reason,
            },
            Err(err) => {
                tracing::error!(user_id = %user.id, error = %err, "Error ending subscription");
                WebhookOutcome::PersistFailed {
                    user_id: user.id,
                    error: err.to_string(),
                }
            }
        }
    }
}
