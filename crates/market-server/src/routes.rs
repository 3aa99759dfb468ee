//! Router

use axum::{
    Router,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::handlers::{
    create_checkout, create_checkout_session, create_service, health_check, list_plans,
    list_services, logout, me, optimistic_plan, signup, stripe_webhook, update_profile,
};
use crate::state::AppState;

/// Endpoints, as printed at startup
pub const ENDPOINTS: [(&str, &str, &str); 11] = [
    ("GET ", "/health", "Health check"),
    ("POST", "/api/users", "Sign up"),
    ("GET ", "/api/users/me", "Current user"),
    ("PUT ", "/api/users/me/profile", "Update profile"),
    ("POST", "/api/users/me/plan", "Optimistic plan update"),
    ("POST", "/api/logout", "Sign out"),
    ("GET ", "/api/plans", "Plan catalog"),
    ("POST", "/api/checkout", "Checkout (correlated)"),
    ("POST", "/api/checkout/session", "Checkout (authenticated)"),
    ("POST", "/webhook/stripe", "Stripe webhook"),
    ("*   ", "/api/services", "List / create services"),
];

pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))

        // Accounts
        .route("/api/users", post(signup))
        .route("/api/users/me", get(me))
        .route("/api/users/me/profile", put(update_profile))
        .route("/api/users/me/plan", post(optimistic_plan))
        .route("/api/logout", post(logout))

        // Payments
        .route("/api/plans", get(list_plans))
        .route("/api/checkout", post(create_checkout))
        .route("/api/checkout/session", post(create_checkout_session))
        .route("/webhook/stripe", post(stripe_webhook))

        // Marketplace
        .route("/api/services", get(list_services).post(create_service))

        // Static files (WASM frontend)
        .fallback_service(ServeDir::new("static"))

        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    use market_core::{Plan, UserId};
    use market_payments::{PlanCatalog, mock::MockProcessor, sign_payload};

    const SECRET: &str = "whsec_test_secret";

    fn catalog() -> PlanCatalog {
        PlanCatalog::new()
            .with_price(Plan::Basic, "price_basic")
            .with_price(Plan::Premium, "price_premium")
            .with_price(Plan::Enterprise, "price_enterprise")
    }

    fn app() -> (Router, Arc<MockProcessor>) {
        let processor = Arc::new(MockProcessor::new());
        let state = AppState::new(catalog()).with_payments(
            processor.clone(),
            SECRET,
            "http://localhost:3000",
            0,
        );
        (router(state), processor)
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn sign_up(app: &Router, name: &str) -> (String, String) {
        let (status, body) = send(
            app,
            request("POST", "/api/users", None, Some(json!({ "name": name, "email": "p@example.com" }))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    fn completed_webhook(user_id: &str, session_id: &str, plan: &str) -> Request<Body> {
        let payload = json!({
            "id": format!("evt_{session_id}"),
            "type": "checkout.session.completed",
            "created": 1_700_000_000,
            "data": { "object": {
                "id": session_id,
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": { "userId": user_id, "planName": plan }
            }}
        })
        .to_string();
        let signature = sign_payload(payload.as_bytes(), SECRET, 1_700_000_000).unwrap();
        Request::builder()
            .method("POST")
            .uri("/webhook/stripe")
            .header("stripe-signature", signature)
            .body(Body::from(payload))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = send(&app, request("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payments_configured"], true);
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let (app, processor) = app();
        let (token, user_id) = sign_up(&app, "Ada").await;

        // No subscription yet
        let listing = json!({ "title": "Plumbing", "category": "home", "priceCents": 5000 });
        let (status, body) = send(&app, request("POST", "/api/services", Some(&token), Some(listing.clone()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "SUBSCRIPTION_REQUIRED");

        // Start checkout
        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/checkout/session",
                Some(&token),
                Some(json!({ "priceId": "price_basic", "planName": "Basic" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let session_id = body["sessionId"].as_str().unwrap().to_string();
        let sent = processor.created_requests();
        assert_eq!(sent[0].metadata.get("userId"), Some(&user_id));
        assert_eq!(sent[0].metadata.get("planName").map(String::as_str), Some("Basic"));

        // Browser comes back before the webhook
        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/users/me/plan",
                Some(&token),
                Some(json!({ "sessionId": session_id, "plan": "Basic" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied"], true);

        let (_, me) = send(&app, request("GET", "/api/users/me", Some(&token), None)).await;
        assert_eq!(me["planName"], "Basic");
        assert_eq!(me["subscriptionStatus"], "inactive");

        // Webhook settles it
        let (status, body) = send(&app, completed_webhook(&user_id, &session_id, "Basic")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "received": true }));

        let (_, me) = send(&app, request("GET", "/api/users/me", Some(&token), None)).await;
        assert_eq!(me["planName"], "Basic");
        assert_eq!(me["subscriptionStatus"], "active");
        assert_eq!(me["pendingCheckoutSessionId"], Value::Null);

        // Basic allows three listings
        for _ in 0..3 {
            let (status, _) = send(&app, request("POST", "/api/services", Some(&token), Some(listing.clone()))).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, body) = send(&app, request("POST", "/api/services", Some(&token), Some(listing))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "LISTING_LIMIT_REACHED");

        // Profile changes reach every listing
        let (status, body) = send(
            &app,
            request("PUT", "/api/users/me/profile", Some(&token), Some(json!({ "name": "Ada L." }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["listingsUpdated"], 3);

        let (_, services) = send(&app, request("GET", "/api/services", None, None)).await;
        let services = services.as_array().unwrap();
        assert_eq!(services.len(), 3);
        assert!(services.iter().all(|s| s["providerName"] == "Ada L."));
    }

    #[tokio::test]
    async fn test_late_optimistic_update_is_skipped() {
        let (app, _) = app();
        let (token, user_id) = sign_up(&app, "Grace").await;

        send(&app, completed_webhook(&user_id, "cs_live_1", "Premium")).await;
        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/users/me/plan",
                Some(&token),
                Some(json!({ "sessionId": "cs_live_1", "plan": "Basic" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied"], false);
        assert_eq!(body["skipped"], "already_settled");

        let (_, me) = send(&app, request("GET", "/api/users/me", Some(&token), None)).await;
        assert_eq!(me["planName"], "Premium");
    }

    #[tokio::test]
    async fn test_plan_hint_cannot_raise_listing_limit() {
        let (app, _) = app();
        let (token, user_id) = sign_up(&app, "Linus").await;
        send(&app, completed_webhook(&user_id, "cs_live_1", "Basic")).await;

        let listing = json!({ "title": "Tiling", "category": "home", "priceCents": 9000 });
        for _ in 0..3 {
            let (status, _) = send(&app, request("POST", "/api/services", Some(&token), Some(listing.clone()))).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/users/me/plan",
                Some(&token),
                Some(json!({ "sessionId": "cs_forged", "plan": "Enterprise" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied"], false);
        assert_eq!(body["skipped"], "subscribed");

        let (status, body) = send(&app, request("POST", "/api/services", Some(&token), Some(listing))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "LISTING_LIMIT_REACHED");

        let (_, me) = send(&app, request("GET", "/api/users/me", Some(&token), None)).await;
        assert_eq!(me["planName"], "Basic");
        assert_eq!(me["confirmedPlan"], "Basic");
    }

    #[tokio::test]
    async fn test_authenticated_checkout_requires_token() {
        let (app, processor) = app();
        let body = json!({ "priceId": "price_basic", "planName": "Basic" });

        let (status, err) = send(&app, request("POST", "/api/checkout/session", None, Some(body.clone()))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(err["code"], "UNAUTHENTICATED");

        let (status, _) = send(&app, request("POST", "/api/checkout/session", Some("bogus"), Some(body))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(processor.create_attempts(), 0);
    }

    #[tokio::test]
    async fn test_checkout_upstream_failure() {
        let (app, processor) = app();
        let (token, _) = sign_up(&app, "Ada").await;
        processor.fail_next_with("card_declined");

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/checkout/session",
                Some(&token),
                Some(json!({ "priceId": "price_premium", "planName": "Premium" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "UPSTREAM_ERROR");
        assert_eq!(processor.create_attempts(), 1);
    }

    #[tokio::test]
    async fn test_correlated_checkout() {
        let (app, processor) = app();
        let (status, body) = send(
            &app,
            request("POST", "/api/checkout", None, Some(json!({ "planId": "price_enterprise", "userId": "u1" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["sessionId"].as_str().unwrap().starts_with("cs_test_"));

        let sent = processor.created_requests();
        assert_eq!(sent[0].client_reference_id.as_deref(), Some("u1"));
        assert!(sent[0].metadata.is_empty());

        let (status, _) = send(&app, request("POST", "/api/checkout", None, Some(json!({ "planId": "price_basic" })))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_signature_failures() {
        let (app, _) = app();
        let (token, user_id) = sign_up(&app, "Ada").await;

        let missing = Request::builder()
            .method("POST")
            .uri("/webhook/stripe")
            .body(Body::from("{}"))
            .unwrap();
        let (status, body) = send(&app, missing).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_SIGNATURE");

        let mut forged = completed_webhook(&user_id, "cs_1", "Enterprise");
        forged
            .headers_mut()
            .insert("stripe-signature", "t=1700000000,v1=00ff".parse().unwrap());
        let (status, body) = send(&app, forged).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_SIGNATURE");

        let (_, me) = send(&app, request("GET", "/api/users/me", Some(&token), None)).await;
        assert_eq!(me["planName"], "none");
        assert_eq!(me["subscriptionStatus"], "inactive");
    }

    #[tokio::test]
    async fn test_webhook_for_unknown_user_is_acknowledged() {
        let (app, _) = app();
        let ghost = UserId::new();
        let (status, body) = send(&app, completed_webhook(ghost.as_str(), "cs_9", "Basic")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"], true);
    }

    #[tokio::test]
    async fn test_payments_disabled() {
        let app = router(AppState::new(PlanCatalog::new()));

        let (_, health) = send(&app, request("GET", "/health", None, None)).await;
        assert_eq!(health["payments_configured"], false);

        let (status, body) = send(
            &app,
            request("POST", "/api/checkout", None, Some(json!({ "planId": "price_basic", "userId": "u1" }))),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "PAYMENTS_DISABLED");

        let (status, _) = send(&app, completed_webhook("u1", "cs_1", "Basic")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let (app, _) = app();
        let (token, _) = sign_up(&app, "Ada").await;

        let (status, _) = send(&app, request("POST", "/api/logout", Some(&token), None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, request("GET", "/api/users/me", Some(&token), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_plans() {
        let (app, _) = app();
        let (status, body) = send(&app, request("GET", "/api/plans", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        let plans = body.as_array().unwrap();
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[1]["name"], "Premium");
        assert_eq!(plans[1]["priceId"], "price_premium");
        assert_eq!(plans[1]["cents"], 3900);
    }

    #[tokio::test]
    async fn test_optimistic_plan_rejects_unknown_plan() {
        let (app, _) = app();
        let (token, _) = sign_up(&app, "Ada").await;
        let (status, _) = send(
            &app,
            request("POST", "/api/users/me/plan", Some(&token), Some(json!({ "sessionId": "cs_1", "plan": "Gold" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
