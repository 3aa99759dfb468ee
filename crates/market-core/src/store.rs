//! Subscription State Store
//!
//! Durable record of each user's plan, keyed by user ID. The two checkout
//! paths (webhook and browser return) only ever write through `update`, which
//! evaluates the patch guard and applies the fields as one atomic step.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{CoreError, Result};
use crate::user::{UpdateOutcome, User, UserId, UserPatch};

/// User storage trait
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user
    async fn create(&self, user: User) -> Result<User>;

    /// Get a user by ID
    async fn get(&self, id: &UserId) -> Result<User>;

    /// Guarded partial update (single-document atomic)
    async fn update(&self, id: &UserId, patch: UserPatch) -> Result<UpdateOutcome>;

    /// Find the user holding a processor subscription reference
    async fn find_by_subscription(&self, subscription_id: &str) -> Result<Option<User>>;

    /// Users with processor state worth comparing against
    async fn list_reconcilable(&self) -> Result<Vec<User>>;
}

/// In-memory user store (for development)
pub struct MemoryUserStore {
    users: RwLock<HashMap<UserId, User>>,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.users.read().map(|users| users.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: User) -> Result<User> {
        let mut users = self.users.write()?;
        if users.contains_key(&user.id) {
            return Err(CoreError::AlreadyExists(format!("user {}", user.id)));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get(&self, id: &UserId) -> Result<User> {
        let users = self.users.read()?;
        users
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("user {id}")))
    }

    async fn update(&self, id: &UserId, patch: UserPatch) -> Result<UpdateOutcome> {
        let mut users = self.users.write()?;
        let user = users
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("user {id}")))?;

        if let Some(reason) = user.check_guard(&patch.guard) {
            tracing::debug!(user_id = %id, ?reason, "Skipped guarded update");
            return Ok(UpdateOutcome::Skipped(reason));
        }

        user.apply(&patch);
        Ok(UpdateOutcome::Applied)
    }

    async fn find_by_subscription(&self, subscription_id: &str) -> Result<Option<User>> {
        let users = self.users.read()?;
        Ok(users
            .values()
            .find(|u| u.stripe_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn list_reconcilable(&self) -> Result<Vec<User>> {
        let users = self.users.read()?;
        let mut result: Vec<_> = users.values().filter(|u| u.is_reconcilable()).cloned().collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::{Plan, SkipReason, SubscriptionStatus};

    async fn store_with(id: &str) -> MemoryUserStore {
        let store = MemoryUserStore::new();
        store
            .create(User::new(UserId::from_string(id), Some("Sam".into()), None))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = store_with("u1").await;
        let user = store.get(&UserId::from_string("u1")).await.unwrap();
        assert_eq!(user.name.as_deref(), Some("Sam"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = store_with("u1").await;
        let result = store.create(User::new(UserId::from_string("u1"), None, None)).await;
        assert!(matches!(result, Err(CoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let store = MemoryUserStore::new();
        let id = UserId::from_string("ghost");
        assert!(matches!(store.get(&id).await, Err(CoreError::NotFound(_))));
        let result = store.update(&id, UserPatch::optimistic_plan("s1", Plan::Basic)).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_guarded_update_is_idempotent() {
        let store = store_with("u1").await;
        let id = UserId::from_string("u1");
        let patch = UserPatch::checkout_completed(
            "s1",
            100,
            Plan::Premium,
            Some("cus_1".into()),
            Some("sub_1".into()),
        );

        assert_eq!(store.update(&id, patch.clone()).await.unwrap(), UpdateOutcome::Applied);
        let once = store.get(&id).await.unwrap();

        assert_eq!(
            store.update(&id, patch).await.unwrap(),
            UpdateOutcome::Skipped(SkipReason::Duplicate)
        );
        let twice = store.get(&id).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.subscription_status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_plan_hint_cannot_lift_listing_limit() {
        let store = store_with("u1").await;
        let id = UserId::from_string("u1");
        store
            .update(
                &id,
                UserPatch::checkout_completed("s1", 100, Plan::Basic, None, Some("sub_1".into())),
            )
            .await
            .unwrap();
        let before = store.get(&id).await.unwrap();
        assert!(crate::listing::ensure_can_list(&before, 3).is_err());

        let outcome = store
            .update(&id, UserPatch::optimistic_plan("cs_forged", Plan::Enterprise))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Skipped(SkipReason::Subscribed));

        let after = store.get(&id).await.unwrap();
        assert_eq!(after.plan_name, Plan::Basic);
        assert_eq!(after.pending_checkout_session_id, None);
        assert!(matches!(
            crate::listing::ensure_can_list(&after, 3),
            Err(CoreError::ListingLimitReached { limit: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_find_by_subscription_and_reconcilable() {
        let store = store_with("u1").await;
        store
            .create(User::new(UserId::from_string("u2"), None, None))
            .await
            .unwrap();
        let id = UserId::from_string("u1");
        store
            .update(
                &id,
                UserPatch::checkout_completed("s1", 100, Plan::Basic, None, Some("sub_9".into())),
            )
            .await
            .unwrap();

        let found = store.find_by_subscription("sub_9").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(id.clone()));
        assert!(store.find_by_subscription("sub_x").await.unwrap().is_none());

        let reconcilable = store.list_reconcilable().await.unwrap();
        assert_eq!(reconcilable.len(), 1);
        assert_eq!(reconcilable[0].id, id);
    }
}
