//! Service Listings
//!
//! Providers with an active subscription list services; listings carry a copy
//! of the provider's contact details, kept in sync by a batch update whenever
//! the profile changes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::user::{User, UserId};

/// A listed service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceListing {
    pub id: String,
    pub provider_id: UserId,
    pub title: String,
    pub category: String,
    pub description: String,
    /// Price in cents
    pub price_cents: i64,
    pub provider_name: Option<String>,
    pub provider_email: Option<String>,
    pub provider_phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for a new listing
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListing {
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
}

/// Contact fields copied from the provider profile
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<&User> for ProviderProfile {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
        }
    }
}

impl ServiceListing {
    /// Build a listing for a provider, validating input
    pub fn new(provider: &User, input: NewListing) -> Result<Self> {
        if input.title.trim().is_empty() {
            return Err(CoreError::InvalidArgument("title is required".into()));
        }
        if input.category.trim().is_empty() {
            return Err(CoreError::InvalidArgument("category is required".into()));
        }
        if input.price_cents < 0 {
            return Err(CoreError::InvalidArgument("price must not be negative".into()));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            provider_id: provider.id.clone(),
            title: input.title.trim().to_string(),
            category: input.category.trim().to_string(),
            description: input.description,
            price_cents: input.price_cents,
            provider_name: provider.name.clone(),
            provider_email: provider.email.clone(),
            provider_phone: provider.phone.clone(),
            created_at: Utc::now(),
        })
    }
}

/// Check that a provider may add another listing
pub fn ensure_can_list(provider: &User, existing: usize) -> Result<()> {
    if !provider.is_subscribed() {
        return Err(CoreError::SubscriptionRequired(format!(
            "user {} has no active subscription",
            provider.id
        )));
    }
    match provider.confirmed_plan.listing_limit() {
        Some(limit) if existing >= limit => Err(CoreError::ListingLimitReached {
            plan: provider.confirmed_plan.to_string(),
            limit,
        }),
        _ => Ok(()),
    }
}

/// Listing storage trait
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn insert(&self, listing: ServiceListing) -> Result<ServiceListing>;

    async fn list_all(&self) -> Result<Vec<ServiceListing>>;

    async fn list_by_provider(&self, provider_id: &UserId) -> Result<Vec<ServiceListing>>;

    /// Copy contact fields onto every listing of a provider as one batch.
    /// Returns the number of listings touched.
    async fn propagate_profile(&self, provider_id: &UserId, profile: &ProviderProfile) -> Result<usize>;
}

/// In-memory listing store (for development)
pub struct MemoryListingStore {
    listings: RwLock<HashMap<String, ServiceListing>>,
}

impl Default for MemoryListingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self {
            listings: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn insert(&self, listing: ServiceListing) -> Result<ServiceListing> {
        let mut listings = self.listings.write()?;
        listings.insert(listing.id.clone(), listing.clone());
        Ok(listing)
    }

    async fn list_all(&self) -> Result<Vec<ServiceListing>> {
        let listings = self.listings.read()?;
        let mut result: Vec<_> = listings.values().cloned().collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn list_by_provider(&self, provider_id: &UserId) -> Result<Vec<ServiceListing>> {
        let listings = self.listings.read()?;
        let mut result: Vec<_> = listings
            .values()
            .filter(|l| &l.provider_id == provider_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn propagate_profile(&self, provider_id: &UserId, profile: &ProviderProfile) -> Result<usize> {
        let mut listings = self.listings.write()?;
        let mut touched = 0;
        for listing in listings.values_mut().filter(|l| &l.provider_id == provider_id) {
            listing.provider_name.clone_from(&profile.name);
            listing.provider_email.clone_from(&profile.email);
            listing.provider_phone.clone_from(&profile.phone);
            touched += 1;
        }
        Ok(touched)
    }
}
