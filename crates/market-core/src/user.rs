//! User Accounts
//!
//! The provider profile and the subscription fields that checkout completion
//! mutates. Field names are serialized in camelCase (`planName`,
//! `subscriptionStatus`, `stripeCustomerId`, `stripeSubscriptionId`); both the
//! webhook path and the browser path depend on that layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Opaque user identifier (primary key)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription plan tiers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plan {
    #[default]
    #[serde(rename = "none")]
    None,
    Basic,
    Premium,
    Enterprise,
}

impl Plan {
    /// Plans that can be purchased
    pub const PAID: [Plan; 3] = [Plan::Basic, Plan::Premium, Plan::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::None => "none",
            Plan::Basic => "Basic",
            Plan::Premium => "Premium",
            Plan::Enterprise => "Enterprise",
        }
    }

    /// Parse a paid plan name. `none` and unknown names yield `None`.
    pub fn parse_paid(s: &str) -> Option<Plan> {
        match s.trim() {
            "Basic" | "basic" => Some(Plan::Basic),
            "Premium" | "premium" => Some(Plan::Premium),
            "Enterprise" | "enterprise" => Some(Plan::Enterprise),
            _ => None,
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::None)
    }

    /// Maximum number of service listings, `None` = unlimited
    pub fn listing_limit(&self) -> Option<usize> {
        match self {
            Plan::None => Some(0),
            Plan::Basic => Some(3),
            Plan::Premium | Plan::Enterprise => None,
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Plan {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "none" {
            return Ok(Plan::None);
        }
        Plan::parse_paid(s).ok_or_else(|| CoreError::InvalidArgument(format!("unknown plan '{s}'")))
    }
}

/// Subscription status as stored on the user
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Inactive,
    Active,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Active => "active",
        }
    }
}

/// A user record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,

    pub name: Option<String>,

    pub email: Option<String>,

    pub phone: Option<String>,

    pub bio: Option<String>,

    /// Current plan, possibly an unconfirmed browser hint
    pub plan_name: Plan,

    /// Plan granted by the last authenticated update (webhook or sweep).
    /// Listing limits read this, never `plan_name`.
    #[serde(default)]
    pub confirmed_plan: Plan,

    pub stripe_customer_id: Option<String>,

    pub stripe_subscription_id: Option<String>,

    pub subscription_status: SubscriptionStatus,

    /// Checkout session last applied by the authenticated path
    #[serde(default)]
    pub last_checkout_session_id: Option<String>,

    /// `created` timestamp (unix seconds) of the newest processor event applied
    #[serde(default)]
    pub last_event_created: Option<i64>,

    /// Checkout session the browser reported but the webhook has not settled yet
    #[serde(default)]
    pub pending_checkout_session_id: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a user at signup: no plan, inactive
    pub fn new(id: UserId, name: Option<String>, email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            email,
            phone: None,
            bio: None,
            plan_name: Plan::None,
            confirmed_plan: Plan::None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            subscription_status: SubscriptionStatus::Inactive,
            last_checkout_session_id: None,
            last_event_created: None,
            pending_checkout_session_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription_status == SubscriptionStatus::Active
    }

    /// Needs a look from the reconciliation sweep
    pub fn is_reconcilable(&self) -> bool {
        self.stripe_subscription_id.is_some() || self.pending_checkout_session_id.is_some()
    }

    /// Evaluate a guard against the current record. `None` means apply.
    pub fn check_guard(&self, guard: &PatchGuard) -> Option<SkipReason> {
        match guard {
            PatchGuard::Unconditional => None,
            PatchGuard::CheckoutCompleted { session_id, event_created } => {
                if self.last_checkout_session_id.as_deref() == Some(session_id.as_str()) {
                    Some(SkipReason::Duplicate)
                } else if self.last_event_created.is_some_and(|last| last > *event_created) {
                    Some(SkipReason::Stale)
                } else {
                    None
                }
            }
            PatchGuard::SubscriptionEvent { subscription_id, event_created } => {
                if self.stripe_subscription_id.as_deref() != Some(subscription_id.as_str()) {
                    Some(SkipReason::Superseded)
                } else if self.last_event_created.is_some_and(|last| last > *event_created) {
                    Some(SkipReason::Stale)
                } else {
                    None
                }
            }
            PatchGuard::Optimistic { session_id } => {
                if self.last_checkout_session_id.as_deref() == Some(session_id.as_str()) {
                    Some(SkipReason::AlreadySettled)
                } else if self.is_subscribed() {
                    Some(SkipReason::Subscribed)
                } else {
                    None
                }
            }
            PatchGuard::PendingSession { session_id } => {
                if self.pending_checkout_session_id.as_deref() == Some(session_id.as_str()) {
                    None
                } else {
                    Some(SkipReason::Superseded)
                }
            }
        }
    }

    /// Apply a patch in place. Guards are checked by the store, not here.
    pub fn apply(&mut self, patch: &UserPatch) {
        if let Some(name) = &patch.name {
            self.name = Some(name.clone());
        }
        if let Some(email) = &patch.email {
            self.email = Some(email.clone());
        }
        if let Some(phone) = &patch.phone {
            self.phone = Some(phone.clone());
        }
        if let Some(bio) = &patch.bio {
            self.bio = Some(bio.clone());
        }
        if let Some(plan) = patch.plan_name {
            self.plan_name = plan;
        }
        if let Some(plan) = patch.confirmed_plan {
            self.confirmed_plan = plan;
        }
        if patch.restore_confirmed_plan {
            self.plan_name = self.confirmed_plan;
        }
        if let Some(customer) = &patch.stripe_customer_id {
            self.stripe_customer_id = Some(customer.clone());
        }
        if let Some(subscription) = &patch.stripe_subscription_id {
            self.stripe_subscription_id = Some(subscription.clone());
        }
        if let Some(status) = patch.subscription_status {
            self.subscription_status = status;
        }
        if let Some(session) = &patch.last_checkout_session_id {
            self.last_checkout_session_id = Some(session.clone());
        }
        if let Some(created) = patch.last_event_created {
            self.last_event_created = Some(self.last_event_created.map_or(created, |c| c.max(created)));
        }
        if let Some(pending) = &patch.pending_checkout_session_id {
            self.pending_checkout_session_id.clone_from(pending);
        }
        self.updated_at = Utc::now();
    }
}

/// Precondition evaluated atomically with the update
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchGuard {
    /// Always apply
    Unconditional,

    /// Authenticated checkout completion: skip a replay of the same session or
    /// an event older than one already applied
    CheckoutCompleted { session_id: String, event_created: i64 },

    /// Subscription lifecycle event: skip if the user has moved to another
    /// subscription or a newer event was applied
    SubscriptionEvent { subscription_id: String, event_created: i64 },

    /// Browser-reported success: skip once the webhook has settled this
    /// session, or while a confirmed subscription is active
    Optimistic { session_id: String },

    /// Apply only while this session is still the pending one
    PendingSession { session_id: String },
}

/// Why a guarded update was skipped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Duplicate,
    Stale,
    Superseded,
    AlreadySettled,
    Subscribed,
}

/// Result of a successful `update`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    Skipped(SkipReason),
}

/// Partial field update for a user record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub plan_name: Option<Plan>,
    pub confirmed_plan: Option<Plan>,
    /// Reset `plan_name` to the confirmed plan
    pub restore_confirmed_plan: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub last_checkout_session_id: Option<String>,
    pub last_event_created: Option<i64>,
    /// `Some(None)` clears the pending session
    pub pending_checkout_session_id: Option<Option<String>>,
    pub guard: PatchGuard,
}

impl Default for UserPatch {
    fn default() -> Self {
        Self {
            name: None,
            email: None,
            phone: None,
            bio: None,
            plan_name: None,
            confirmed_plan: None,
            restore_confirmed_plan: false,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            subscription_status: None,
            last_checkout_session_id: None,
            last_event_created: None,
            pending_checkout_session_id: None,
            guard: PatchGuard::Unconditional,
        }
    }
}

impl UserPatch {
    /// Authoritative plan change from a completed checkout session
    pub fn checkout_completed(
        session_id: impl Into<String>,
        event_created: i64,
        plan: Plan,
        customer_id: Option<String>,
        subscription_id: Option<String>,
    ) -> Self {
        let session_id = session_id.into();
        Self {
            plan_name: Some(plan),
            confirmed_plan: Some(plan),
            stripe_customer_id: customer_id,
            stripe_subscription_id: subscription_id,
            subscription_status: Some(SubscriptionStatus::Active),
            last_checkout_session_id: Some(session_id.clone()),
            last_event_created: Some(event_created),
            pending_checkout_session_id: Some(None),
            guard: PatchGuard::CheckoutCompleted { session_id, event_created },
            ..Default::default()
        }
    }

    /// Subscription ended at the processor
    pub fn subscription_ended(subscription_id: impl Into<String>, event_created: i64) -> Self {
        Self {
            plan_name: Some(Plan::None),
            confirmed_plan: Some(Plan::None),
            subscription_status: Some(SubscriptionStatus::Inactive),
            last_event_created: Some(event_created),
            guard: PatchGuard::SubscriptionEvent {
                subscription_id: subscription_id.into(),
                event_created,
            },
            ..Default::default()
        }
    }

    /// Unauthenticated plan hint from the browser return trip.
    /// Status is left alone; only the webhook activates a subscription.
    pub fn optimistic_plan(session_id: impl Into<String>, plan: Plan) -> Self {
        let session_id = session_id.into();
        Self {
            plan_name: Some(plan),
            pending_checkout_session_id: Some(Some(session_id.clone())),
            guard: PatchGuard::Optimistic { session_id },
            ..Default::default()
        }
    }

    /// Forget a browser hint the processor never confirmed
    pub fn drop_plan_hint(session_id: impl Into<String>) -> Self {
        Self {
            restore_confirmed_plan: true,
            pending_checkout_session_id: Some(None),
            guard: PatchGuard::PendingSession {
                session_id: session_id.into(),
            },
            ..Default::default()
        }
    }

    /// Fields that are copied onto the provider's listings
    pub fn touches_listing_fields(&self) -> bool {
        self.name.is_some() || self.email.is_some() || self.phone.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new(UserId::from_string("u1"), Some("Ada".into()), Some("ada@example.com".into()))
    }

    #[test]
    fn test_new_user_has_no_plan() {
        let user = user();
        assert_eq!(user.plan_name, Plan::None);
        assert_eq!(user.subscription_status, SubscriptionStatus::Inactive);
        assert!(!user.is_reconcilable());
    }

    #[test]
    fn test_persisted_field_names() {
        let json = serde_json::to_value(user()).unwrap();
        assert_eq!(json["planName"], "none");
        assert_eq!(json["subscriptionStatus"], "inactive");
        assert!(json.get("stripeCustomerId").is_some());
        assert!(json.get("stripeSubscriptionId").is_some());
    }

    #[test]
    fn test_plan_parsing() {
        assert_eq!(Plan::parse_paid("Premium"), Some(Plan::Premium));
        assert_eq!(Plan::parse_paid("enterprise"), Some(Plan::Enterprise));
        assert_eq!(Plan::parse_paid("none"), None);
        assert_eq!(Plan::parse_paid("Gold"), None);
        assert_eq!("none".parse::<Plan>().unwrap(), Plan::None);
        assert!("Gold".parse::<Plan>().is_err());
    }

    #[test]
    fn test_listing_limits() {
        assert_eq!(Plan::None.listing_limit(), Some(0));
        assert_eq!(Plan::Basic.listing_limit(), Some(3));
        assert_eq!(Plan::Premium.listing_limit(), None);
    }

    #[test]
    fn test_checkout_guard_detects_replay_and_stale() {
        let mut user = user();
        let patch = UserPatch::checkout_completed("s2", 200, Plan::Premium, None, None);
        assert_eq!(user.check_guard(&patch.guard), None);
        user.apply(&patch);

        assert_eq!(user.check_guard(&patch.guard), Some(SkipReason::Duplicate));

        let older = UserPatch::checkout_completed("s1", 100, Plan::Basic, None, None);
        assert_eq!(user.check_guard(&older.guard), Some(SkipReason::Stale));
    }

    #[test]
    fn test_optimistic_guard_yields_to_settled_session() {
        let mut user = user();
        user.apply(&UserPatch::checkout_completed("s1", 100, Plan::Premium, None, None));

        let optimistic = UserPatch::optimistic_plan("s1", Plan::Basic);
        assert_eq!(user.check_guard(&optimistic.guard), Some(SkipReason::AlreadySettled));

        let other = UserPatch::optimistic_plan("s2", Plan::Basic);
        assert_eq!(user.check_guard(&other.guard), Some(SkipReason::Subscribed));
    }

    #[test]
    fn test_older_hint_cannot_replace_newer_settled_plan() {
        let mut user = user();
        user.apply(&UserPatch::optimistic_plan("s1", Plan::Basic));
        user.apply(&UserPatch::checkout_completed("s2", 200, Plan::Enterprise, None, Some("sub_2".into())));

        let late = UserPatch::optimistic_plan("s1", Plan::Basic);
        assert_eq!(user.check_guard(&late.guard), Some(SkipReason::Subscribed));
        assert_eq!(user.plan_name, Plan::Enterprise);
        assert_eq!(user.confirmed_plan, Plan::Enterprise);
    }

    #[test]
    fn test_dropping_hint_restores_confirmed_plan() {
        let mut user = user();
        user.apply(&UserPatch::checkout_completed("s1", 100, Plan::Basic, None, None));
        // hint left on an active record by an older build
        user.apply(&UserPatch {
            plan_name: Some(Plan::Enterprise),
            pending_checkout_session_id: Some(Some("cs_x".into())),
            ..Default::default()
        });

        let stale = UserPatch::drop_plan_hint("cs_other");
        assert_eq!(user.check_guard(&stale.guard), Some(SkipReason::Superseded));

        let drop = UserPatch::drop_plan_hint("cs_x");
        assert_eq!(user.check_guard(&drop.guard), None);
        user.apply(&drop);
        assert_eq!(user.plan_name, Plan::Basic);
        assert_eq!(user.pending_checkout_session_id, None);
        assert!(user.is_subscribed());
    }

    #[test]
    fn test_subscription_guard_requires_matching_reference() {
        let mut user = user();
        user.apply(&UserPatch::checkout_completed(
            "s1",
            100,
            Plan::Premium,
            Some("cus_1".into()),
            Some("sub_1".into()),
        ));

        let foreign = UserPatch::subscription_ended("sub_old", 150);
        assert_eq!(user.check_guard(&foreign.guard), Some(SkipReason::Superseded));

        let ended = UserPatch::subscription_ended("sub_1", 150);
        assert_eq!(user.check_guard(&ended.guard), None);
        user.apply(&ended);
        assert_eq!(user.plan_name, Plan::None);
        assert_eq!(user.confirmed_plan, Plan::None);
        assert_eq!(user.subscription_status, SubscriptionStatus::Inactive);
        assert_eq!(user.last_event_created, Some(150));
    }

    #[test]
    fn test_completion_clears_pending_session() {
        let mut user = user();
        user.apply(&UserPatch::optimistic_plan("s1", Plan::Premium));
        assert_eq!(user.pending_checkout_session_id.as_deref(), Some("s1"));
        assert_eq!(user.subscription_status, SubscriptionStatus::Inactive);

        user.apply(&UserPatch::checkout_completed("s1", 100, Plan::Premium, None, None));
        assert_eq!(user.pending_checkout_session_id, None);
        assert!(user.is_subscribed());
    }
}
