//! Reconciliation Sweep
//!
//! Periodically compares stored subscription state with the processor and
//! repairs drift left behind by a lost webhook or a failed write. Pending
//! checkout sessions are settled from the processor's view of the session,
//! or dropped (restoring the confirmed plan) when the processor cannot vouch
//! for them. Stored subscriptions are then checked against their live status.
//!
//! Every write goes through the same guarded update as the webhook, so a
//! sweep racing a webhook delivery cannot undo it.

use std::sync::Arc;
use tokio::sync::Mutex;

use market_core::{PatchGuard, Plan, SubscriptionStatus, UpdateOutcome, User, UserPatch, UserStore};

use crate::checkout::{
    METADATA_PLAN_NAME, METADATA_USER_ID, PaymentProcessor, ProcessorSubscriptionState, SessionState,
};
use crate::error::{PaymentError, Result};

/// Counters from one sweep
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub repaired: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Repair {
    Patched,
    Unchanged,
}

/// What happened to a pending browser hint
enum Pending {
    /// Completion applied from the processor's record
    Settled,
    /// Hint dropped, confirmed plan restored
    Dropped,
    Untouched,
}

/// Sweep over users with a pending session or a stored subscription
pub struct ReconciliationSweep {
    store: Arc<dyn UserStore>,
    processor: Arc<dyn PaymentProcessor>,
    running: Mutex<()>,
}

impl ReconciliationSweep {
    pub fn new(store: Arc<dyn UserStore>, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self {
            store,
            processor,
            running: Mutex::new(()),
        }
    }

    /// Run one sweep. Returns `None` when a sweep is already in progress.
    pub async fn run(&self) -> Option<SweepReport> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::debug!("Reconciliation sweep already running");
            return None;
        };

        let users = match self.store.list_reconcilable().await {
            Ok(users) => users,
            Err(err) => {
                tracing::error!(error = %err, "Could not list users for reconciliation");
                return Some(SweepReport {
                    failed: 1,
                    ..SweepReport::default()
                });
            }
        };

        let mut report = SweepReport::default();
        for user in users {
            report.examined += 1;
            match self.reconcile_user(&user).await {
                Ok(Repair::Patched) => report.repaired += 1,
                Ok(Repair::Unchanged) => report.unchanged += 1,
                Err(err) => {
                    tracing::warn!(user_id = %user.id, error = %err, "Reconciliation failed for user");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            processor = %self.processor.name(),
            examined = report.examined,
            repaired = report.repaired,
            failed = report.failed,
            "Reconciliation sweep finished"
        );
        Some(report)
    }

    async fn reconcile_user(&self, user: &User) -> Result<Repair> {
        let mut repair = Repair::Unchanged;

        if let Some(session_id) = &user.pending_checkout_session_id {
            match self.settle_pending(user, session_id).await? {
                // The session just supplied the subscription; the next sweep checks it
                Pending::Settled => return Ok(Repair::Patched),
                Pending::Dropped => repair = Repair::Patched,
                Pending::Untouched => {}
            }
        }

        if let Some(subscription_id) = &user.stripe_subscription_id {
            let live = match self.processor.subscription_state(subscription_id).await {
                Ok(live) => live,
                Err(PaymentError::NotFound(_)) => {
                    tracing::warn!(user_id = %user.id, subscription_id = %subscription_id, "Subscription unknown to processor");
                    return Ok(repair);
                }
                Err(err) => return Err(err),
            };
            if self.align_subscription(user, subscription_id, live).await? == Repair::Patched {
                repair = Repair::Patched;
            }
        }

        Ok(repair)
    }

    async fn settle_pending(&self, user: &User, session_id: &str) -> Result<Pending> {
        let session = match self.processor.retrieve_checkout_session(session_id).await {
            Ok(session) => session,
            Err(PaymentError::NotFound(_)) => {
                tracing::info!(user_id = %user.id, session_id, "Pending session unknown to processor");
                return self.drop_hint(user, session_id).await;
            }
            Err(err) => return Err(err),
        };

        let owned = session.metadata.get(METADATA_USER_ID).map(String::as_str) == Some(user.id.as_str());
        let plan = session
            .metadata
            .get(METADATA_PLAN_NAME)
            .and_then(|p| Plan::parse_paid(p));

        match (session.state, session.paid, owned, plan) {
            (SessionState::Open, ..) => Ok(Pending::Untouched),
            (SessionState::Complete, true, true, Some(plan)) => {
                tracing::info!(user_id = %user.id, session_id, plan = %plan, "Settling missed checkout completion");
                let patch = UserPatch::checkout_completed(
                    session.id.clone(),
                    session.created,
                    plan,
                    session.customer_id.clone(),
                    session.subscription_id.clone(),
                );
                match self.store.update(&user.id, patch).await? {
                    UpdateOutcome::Applied => Ok(Pending::Settled),
                    UpdateOutcome::Skipped(reason) => {
                        // A newer completion already won; the hint is stale
                        tracing::debug!(user_id = %user.id, ?reason, "Missed completion skipped");
                        self.drop_hint(user, session_id).await
                    }
                }
            }
            _ => self.drop_hint(user, session_id).await,
        }
    }

    async fn drop_hint(&self, user: &User, session_id: &str) -> Result<Pending> {
        tracing::info!(user_id = %user.id, session_id, "Dropping unconfirmed plan hint");
        match self.apply(user, UserPatch::drop_plan_hint(session_id)).await? {
            Repair::Patched => Ok(Pending::Dropped),
            Repair::Unchanged => Ok(Pending::Untouched),
        }
    }

    async fn align_subscription(
        &self,
        user: &User,
        subscription_id: &str,
        live: ProcessorSubscriptionState,
    ) -> Result<Repair> {
        let now = chrono::Utc::now().timestamp();
        let patch = match (live, user.subscription_status) {
            (ProcessorSubscriptionState::Active, SubscriptionStatus::Inactive) => UserPatch {
                subscription_status: Some(SubscriptionStatus::Active),
                guard: PatchGuard::SubscriptionEvent {
                    subscription_id: subscription_id.to_string(),
                    event_created: now,
                },
                ..Default::default()
            },
            (ProcessorSubscriptionState::Inactive(status), SubscriptionStatus::Active) => {
                tracing::info!(user_id = %user.id, subscription_id, status = %status, "Subscription no longer active");
                UserPatch::subscription_ended(subscription_id, now)
            }
            _ => return Ok(Repair::Unchanged),
        };

        self.apply(user, patch).await
    }

    async fn apply(&self, user: &User, patch: UserPatch) -> Result<Repair> {
        match self.store.update(&user.id, patch).await? {
            UpdateOutcome::Applied => Ok(Repair::Patched),
            UpdateOutcome::Skipped(reason) => {
                tracing::debug!(user_id = %user.id, ?reason, "Reconciliation write skipped");
                Ok(Repair::Unchanged)
            }
        }
    }
}
