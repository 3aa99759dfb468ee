//! API Client

use serde::{Deserialize, Serialize};

use market_core::{OptimisticUpdate, User};

/// Plan as served by `/api/plans`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInfo {
    pub name: String,
    pub description: String,
    pub cents: i64,
    pub features: Vec<String>,
    pub popular: bool,
    pub price_id: Option<String>,
}

impl PlanInfo {
    pub fn price_label(&self) -> String {
        format!("${}", self.cents / 100)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Signup {
    pub user: User,
    pub token: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutStarted {
    checkout_url: Option<String>,
}

fn url(path: &str) -> String {
    let origin = web_sys::window()
        .and_then(|w| w.location().origin().ok())
        .unwrap_or_else(|| "http://localhost:3000".into());
    format!("{origin}{path}")
}

async fn error_message(response: reqwest::Response, fallback: &str) -> String {
    let data: serde_json::Value = response.json().await.unwrap_or_default();
    data["error"].as_str().unwrap_or(fallback).to_string()
}

/// Create an account and get a bearer token
pub async fn signup(name: &str, email: &str) -> Result<Signup, String> {
    let response = reqwest::Client::new()
        .post(url("/api/users"))
        .json(&serde_json::json!({ "name": name, "email": email }))
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if response.status().is_success() {
        response.json().await.map_err(|e| e.to_string())
    } else {
        Err(error_message(response, "Sign up failed").await)
    }
}

/// Current user
pub async fn fetch_me(token: &str) -> Result<User, String> {
    let response = reqwest::Client::new()
        .get(url("/api/users/me"))
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if response.status().is_success() {
        response.json().await.map_err(|e| e.to_string())
    } else {
        Err(error_message(response, "Not signed in").await)
    }
}

pub async fn fetch_plans() -> Result<Vec<PlanInfo>, String> {
    let response = reqwest::Client::new()
        .get(url("/api/plans"))
        .send()
        .await
        .map_err(|e| e.to_string())?;

    response.json().await.map_err(|e| e.to_string())
}

/// Create a Stripe checkout session and return the hosted page URL
pub async fn create_checkout_session(token: &str, plan: &PlanInfo) -> Result<String, String> {
    let price_id = plan
        .price_id
        .as_deref()
        .ok_or_else(|| format!("{} is not available yet", plan.name))?;

    let response = reqwest::Client::new()
        .post(url("/api/checkout/session"))
        .bearer_auth(token)
        .json(&serde_json::json!({
            "priceId": price_id,
            "planName": plan.name,
        }))
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if response.status().is_success() {
        let started: CheckoutStarted = response.json().await.map_err(|e| e.to_string())?;
        started
            .checkout_url
            .ok_or_else(|| "Checkout session has no URL".to_string())
    } else {
        Err(error_message(response, "Failed to create checkout").await)
    }
}

/// Advisory plan write after the checkout return
pub async fn apply_optimistic_plan(token: &str, update: &OptimisticUpdate) -> Result<(), String> {
    let response = reqwest::Client::new()
        .post(url("/api/users/me/plan"))
        .bearer_auth(token)
        .json(&serde_json::json!({
            "sessionId": update.session_id,
            "plan": update.plan.as_str(),
        }))
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(error_message(response, "Plan update failed").await)
    }
}

pub async fn logout(token: &str) -> Result<(), String> {
    reqwest::Client::new()
        .post(url("/api/logout"))
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}
