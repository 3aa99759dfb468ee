//! Mock Payment Processor
//!
//! For testing and local development. Records checkout requests and serves
//! canned sessions and subscriptions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::checkout::{
    CheckoutSessionParams, CreatedSession, PaymentProcessor, ProcessorSession,
    ProcessorSubscriptionState,
};
use crate::error::{PaymentError, Result};

/// In-memory processor double
#[derive(Default)]
pub struct MockProcessor {
    requests: Mutex<Vec<CheckoutSessionParams>>,
    sessions: Mutex<HashMap<String, ProcessorSession>>,
    subscriptions: Mutex<HashMap<String, ProcessorSubscriptionState>>,
    fail_next: Mutex<Option<String>>,
    attempts: AtomicU64,
    lookups: AtomicU64,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next processor call fail with this upstream message
    pub fn fail_next_with(&self, message: impl Into<String>) {
        if let Ok(mut fail) = self.fail_next.lock() {
            *fail = Some(message.into());
        }
    }

    /// Register a session the processor knows about
    pub fn insert_session(&self, session: ProcessorSession) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(session.id.clone(), session);
        }
    }

    /// Register a subscription state
    pub fn set_subscription_state(&self, subscription_id: impl Into<String>, state: ProcessorSubscriptionState) {
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.insert(subscription_id.into(), state);
        }
    }

    /// Checkout requests received so far
    pub fn created_requests(&self) -> Vec<CheckoutSessionParams> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of create calls, failed ones included
    pub fn create_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of retrieve calls (sessions and subscriptions)
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Result<()> {
        let mut fail = self
            .fail_next
            .lock()
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;
        match fail.take() {
            Some(message) => Err(PaymentError::Upstream(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_checkout_session(&self, params: CheckoutSessionParams) -> Result<CreatedSession> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.take_failure()?;

        self.requests
            .lock()
            .map_err(|e| PaymentError::Upstream(e.to_string()))?
            .push(params);

        let id = format!("cs_test_{n:04}");
        Ok(CreatedSession {
            url: Some(format!("https://checkout.stripe.test/pay/{id}")),
            id,
        })
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<ProcessorSession> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;

        self.sessions
            .lock()
            .map_err(|e| PaymentError::Upstream(e.to_string()))?
            .get(session_id)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(format!("checkout session {session_id}")))
    }

    async fn subscription_state(&self, subscription_id: &str) -> Result<ProcessorSubscriptionState> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;

        self.subscriptions
            .lock()
            .map_err(|e| PaymentError::Upstream(e.to_string()))?
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(format!("subscription {subscription_id}")))
    }

    fn name(&self) -> &str {
        "MockProcessor"
    }
}
