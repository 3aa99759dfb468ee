//! Plan Catalog
//!
//! Pricing for each paid plan and the mapping between plans and the
//! processor's price identifiers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use market_core::Plan;

/// Environment keys holding the processor price ID per plan
pub const PRICE_ENV_KEYS: [(Plan, &str); 3] = [
    (Plan::Basic, "STRIPE_PRICE_BASIC"),
    (Plan::Premium, "STRIPE_PRICE_PREMIUM"),
    (Plan::Enterprise, "STRIPE_PRICE_ENTERPRISE"),
];

/// Billing interval
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Monthly,
    Yearly,
}

/// Pricing information
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPricing {
    pub plan: Plan,
    pub name: String,
    pub description: String,
    pub cents: i64,
    pub interval: BillingInterval,
    pub features: Vec<String>,
    pub popular: bool,
    /// Processor price ID, if configured
    pub price_id: Option<String>,
}

/// Static pricing for a plan
pub fn pricing(plan: Plan) -> PlanPricing {
    let (description, cents, features, popular): (&str, i64, Vec<&str>, bool) = match plan {
        Plan::None => ("No active subscription", 0, Vec::new(), false),
        Plan::Basic => (
            "Perfect for getting started",
            1900, // $19/month
            vec!["List up to 3 services", "Basic messaging", "Standard support", "Basic analytics"],
            false,
        ),
        Plan::Premium => (
            "Most popular for growing businesses",
            3900, // $39/month
            vec![
                "Unlimited services",
                "Priority messaging",
                "Advanced analytics",
                "Premium support",
                "Featured listings",
            ],
            true,
        ),
        Plan::Enterprise => (
            "For established providers",
            7900, // $79/month
            vec![
                "Everything in Premium",
                "Multi-location support",
                "API access",
                "Dedicated account manager",
            ],
            false,
        ),
    };

    PlanPricing {
        plan,
        name: plan.as_str().to_string(),
        description: description.into(),
        cents,
        interval: BillingInterval::Monthly,
        features: features.into_iter().map(str::to_string).collect(),
        popular,
        price_id: None,
    }
}

/// Plan ↔ processor price mapping
#[derive(Clone, Debug, Default)]
pub struct PlanCatalog {
    prices: HashMap<Plan, String>,
}

impl PlanCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the price ID for a plan
    pub fn with_price(mut self, plan: Plan, price_id: impl Into<String>) -> Self {
        self.prices.insert(plan, price_id.into());
        self
    }

    /// Build from a key lookup (normally the process environment)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        PRICE_ENV_KEYS
            .iter()
            .fold(Self::new(), |catalog, (plan, key)| match lookup(key) {
                Some(price) if !price.trim().is_empty() => catalog.with_price(*plan, price.trim()),
                _ => catalog,
            })
    }

    pub fn price_id(&self, plan: Plan) -> Option<&str> {
        self.prices.get(&plan).map(String::as_str)
    }

    /// Reverse lookup from a processor price ID
    pub fn plan_for_price(&self, price_id: &str) -> Option<Plan> {
        self.prices
            .iter()
            .find(|(_, id)| id.as_str() == price_id)
            .map(|(plan, _)| *plan)
    }

    /// All paid plans with their configured price IDs
    pub fn list(&self) -> Vec<PlanPricing> {
        Plan::PAID
            .iter()
            .map(|plan| {
                let mut p = pricing(*plan);
                p.price_id = self.price_id(*plan).map(str::to_string);
                p
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
