//! Checkout Return Handling
//!
//! State machine for the browser landing back on the dashboard after hosted
//! checkout. It is a pure function of the URL parameters, the per-session
//! "already processed" marker and the sign-in state; the caller owns the
//! marker storage, the URL and the actual write.
//!
//! ```text
//!            success + session + signed in + marker unset
//!   ┌──────┐ ───────────────────────────────────────────▶ ┌────────────────────┐
//!   │ Idle │                                              │ OptimisticApplying │
//!   └──────┘ ──── cancelled ────┐                         └────────────────────┘
//!                               ▼                              │ ok / err
//!                          ┌─────────┐ ◀───────────────────────┘
//!                          │ Settled │
//!                          └─────────┘
//! ```
//!
//! The write performed here has no authority. It only warms the displayed
//! plan until the signed webhook settles the session.

use std::fmt::Display;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::user::{Plan, UserId};

/// Query key carrying the payment outcome
pub const STATUS_PARAM: &str = "payment_status";
/// Older success/cancel URLs used this key
pub const LEGACY_STATUS_PARAM: &str = "checkout";
pub const SESSION_PARAM: &str = "session_id";
pub const PLAN_PARAM: &str = "plan";

/// Outcome flag from the return URL
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Cancelled,
}

impl PaymentOutcome {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(PaymentOutcome::Success),
            "cancelled" | "canceled" => Some(PaymentOutcome::Cancelled),
            _ => None,
        }
    }
}

/// Parameters read from the return URL
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReturnParams {
    pub outcome: Option<PaymentOutcome>,
    pub session_id: Option<String>,
    pub plan: Option<Plan>,
}

impl ReturnParams {
    /// Build from any query-map lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let outcome = lookup(STATUS_PARAM)
            .or_else(|| lookup(LEGACY_STATUS_PARAM))
            .and_then(|s| PaymentOutcome::parse(&s));
        let session_id = lookup(SESSION_PARAM).filter(|s| !s.trim().is_empty());
        let plan = lookup(PLAN_PARAM).and_then(|p| Plan::parse_paid(&p));

        Self {
            outcome,
            session_id,
            plan,
        }
    }
}

/// Per-browser-session de-duplication flag
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessedPaymentMarker {
    #[default]
    Unset,
    Processed,
}

impl ProcessedPaymentMarker {
    pub fn is_set(&self) -> bool {
        matches!(self, ProcessedPaymentMarker::Processed)
    }
}

/// Who is signed in on this browser
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    SignedIn(UserId),
}

/// The local write the handler asks for
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticUpdate {
    pub user_id: UserId,
    pub session_id: String,
    pub plan: Plan,
}

/// Message shown to the user once settled
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    PaymentSuccessful { plan: Plan },
    /// Paid, but the plan will appear once the processor confirms
    PaymentPending,
    PaymentCancelled,
    UpdateFailed(String),
}

impl Notice {
    pub fn title(&self) -> &'static str {
        match self {
            Notice::PaymentSuccessful { .. } => "Payment Successful!",
            Notice::PaymentPending => "Payment Received",
            Notice::PaymentCancelled => "Payment Cancelled",
            Notice::UpdateFailed(_) => "Payment Error",
        }
    }

    pub fn description(&self) -> String {
        match self {
            Notice::PaymentSuccessful { plan } => format!("Your plan has been updated to {plan}!"),
            Notice::PaymentPending => "Your plan will update as soon as the payment is confirmed.".into(),
            Notice::PaymentCancelled => "You chose not to complete the payment.".into(),
            Notice::UpdateFailed(_) => {
                "There was an issue updating your plan. Please contact support.".into()
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::UpdateFailed(_))
    }
}

/// Handler state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReturnState {
    Idle,
    OptimisticApplying(OptimisticUpdate),
    Settled,
}

/// Result of one step of the state machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub state: ReturnState,
    pub marker: ProcessedPaymentMarker,
    /// Remove the status parameters from the visible location
    pub strip_params: bool,
    pub notice: Option<Notice>,
}

impl Transition {
    fn idle(marker: ProcessedPaymentMarker) -> Self {
        Self {
            state: ReturnState::Idle,
            marker,
            strip_params: false,
            notice: None,
        }
    }

    fn settled(marker: ProcessedPaymentMarker, strip_params: bool, notice: Notice) -> Self {
        Self {
            state: ReturnState::Settled,
            marker,
            strip_params,
            notice: Some(notice),
        }
    }

    /// The optimistic write to perform, if any
    pub fn pending_update(&self) -> Option<&OptimisticUpdate> {
        match &self.state {
            ReturnState::OptimisticApplying(update) => Some(update),
            _ => None,
        }
    }
}

/// First step: decide what the landing should do
pub fn decide(params: &ReturnParams, marker: ProcessedPaymentMarker, auth: &AuthState) -> Transition {
    match params.outcome {
        Some(PaymentOutcome::Success) => {
            let (Some(session_id), AuthState::SignedIn(user_id)) = (&params.session_id, auth) else {
                return Transition::idle(marker);
            };
            if marker.is_set() {
                return Transition::idle(marker);
            }
            match params.plan {
                Some(plan) => Transition {
                    state: ReturnState::OptimisticApplying(OptimisticUpdate {
                        user_id: user_id.clone(),
                        session_id: session_id.clone(),
                        plan,
                    }),
                    marker,
                    strip_params: false,
                    notice: None,
                },
                None => Transition::settled(
                    ProcessedPaymentMarker::Processed,
                    true,
                    Notice::PaymentPending,
                ),
            }
        }
        Some(PaymentOutcome::Cancelled) => Transition::settled(
            ProcessedPaymentMarker::Unset,
            true,
            Notice::PaymentCancelled,
        ),
        None => Transition::idle(marker),
    }
}

/// Second step: record how the optimistic write went
pub fn settle<E: Display>(update: &OptimisticUpdate, result: Result<(), E>) -> Transition {
    match result {
        Ok(()) => Transition::settled(
            ProcessedPaymentMarker::Processed,
            true,
            Notice::PaymentSuccessful { plan: update.plan },
        ),
        // Marker stays unset and the URL stays put so a reload retries
        Err(err) => Transition::settled(
            ProcessedPaymentMarker::Unset,
            false,
            Notice::UpdateFailed(err.to_string()),
        ),
    }
}

/// Run both steps, performing the write through `apply`
pub async fn handle_return<F, Fut, E>(
    params: &ReturnParams,
    marker: ProcessedPaymentMarker,
    auth: &AuthState,
    apply: F,
) -> Transition
where
    F: FnOnce(OptimisticUpdate) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let transition = decide(params, marker, auth);
    let Some(update) = transition.pending_update().cloned() else {
        return transition;
    };

    tracing::info!(
        user_id = %update.user_id,
        session_id = %update.session_id,
        plan = %update.plan,
        "Applying optimistic plan update after checkout return"
    );
    let result = apply(update.clone()).await;
    if let Err(ref err) = result {
        tracing::warn!(error = %err, "Optimistic plan update failed");
    }
    settle(&update, result)
}
