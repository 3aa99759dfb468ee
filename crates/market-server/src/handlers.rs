//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use market_core::{
    CoreError, ListingStore, NewListing, Plan, ProviderProfile, ServiceListing, SessionStore,
    SessionToken, SkipReason, UpdateOutcome, User, UserId, UserPatch, UserStore,
    listing::ensure_can_list,
};
use market_payments::{
    AuthenticatedCheckout, CheckoutStarted, CorrelatedCheckout, PaymentError, PlanPricing,
    SIGNATURE_HEADER,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub payments_configured: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Default, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user: User,
    pub listings_updated: usize,
}

/// Browser-reported plan after a successful checkout return
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticPlanRequest {
    pub session_id: String,
    pub plan: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticPlanResponse {
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
}

// ============================================================================
// Helpers
// ============================================================================

fn error_response(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn core_error(err: &CoreError) -> ApiError {
    let (status, code) = match err {
        CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        CoreError::AlreadyExists(_) => (StatusCode::CONFLICT, "ALREADY_EXISTS"),
        CoreError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
        CoreError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
        CoreError::SubscriptionRequired(_) => (StatusCode::FORBIDDEN, "SUBSCRIPTION_REQUIRED"),
        CoreError::ListingLimitReached { .. } => (StatusCode::FORBIDDEN, "LISTING_LIMIT_REACHED"),
        CoreError::Store(_) => {
            tracing::error!(error = %err, "Store error");
            (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR")
        }
    };
    error_response(status, err.user_message(), code)
}

fn payment_error(err: &PaymentError) -> ApiError {
    error_response(err.status_code(), err.user_message(), err.code())
}

fn payments_disabled() -> ApiError {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "Payments not configured",
        "PAYMENTS_DISABLED",
    )
}

fn bearer_token(headers: &HeaderMap) -> Option<SessionToken> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(SessionToken::from_string)
}

/// Resolve the bearer token to a user ID
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| core_error(&CoreError::Unauthenticated("missing bearer token".into())))?;
    state.sessions.resolve(&token).map_err(|e| core_error(&e))
}

async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let user_id = authenticate(state, headers)?;
    state.users.get(&user_id).await.map_err(|e| core_error(&e))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        payments_configured: state.payments_configured(),
    })
}

/// Create an account (plan none, inactive) and sign it in
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let user = User::new(
        UserId::new(),
        payload.name.filter(|n| !n.trim().is_empty()),
        payload.email.filter(|e| !e.trim().is_empty()),
    );
    let user = state.users.create(user).await.map_err(|e| core_error(&e))?;
    let session = state.sessions.issue(user.id.clone()).map_err(|e| core_error(&e))?;

    tracing::info!(user_id = %user.id, "User signed up");

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            user,
            token: session.token.as_str().to_string(),
        }),
    ))
}

/// Current user
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<User>, ApiError> {
    current_user(&state, &headers).await.map(Json)
}

/// Update profile fields and copy contact details onto the user's listings
pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ProfileUpdate>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user_id = authenticate(&state, &headers)?;

    let patch = UserPatch {
        name: payload.name,
        email: payload.email,
        phone: payload.phone,
        bio: payload.bio,
        ..Default::default()
    };
    let propagate = patch.touches_listing_fields();

    state.users.update(&user_id, patch).await.map_err(|e| core_error(&e))?;
    let user = state.users.get(&user_id).await.map_err(|e| core_error(&e))?;

    let listings_updated = if propagate {
        state
            .listings
            .propagate_profile(&user_id, &ProviderProfile::from(&user))
            .await
            .map_err(|e| core_error(&e))?
    } else {
        0
    };

    tracing::info!(user_id = %user_id, listings_updated, "Profile updated");

    Ok(Json(ProfileResponse { user, listings_updated }))
}

/// Advisory plan write from the checkout return page.
///
/// Never activates the subscription or changes the confirmed plan; the
/// webhook does that. Refused while a confirmed subscription is active.
pub async fn optimistic_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OptimisticPlanRequest>,
) -> Result<Json<OptimisticPlanResponse>, ApiError> {
    let user_id = authenticate(&state, &headers)?;

    let session_id = payload.session_id.trim();
    if session_id.is_empty() {
        return Err(core_error(&CoreError::InvalidArgument("sessionId is required".into())));
    }
    let plan = Plan::parse_paid(&payload.plan).ok_or_else(|| {
        core_error(&CoreError::InvalidArgument(format!("unknown plan '{}'", payload.plan)))
    })?;

    let outcome = state
        .users
        .update(&user_id, UserPatch::optimistic_plan(session_id, plan))
        .await
        .map_err(|e| core_error(&e))?;

    tracing::info!(user_id = %user_id, session_id = %session_id, plan = %plan, ?outcome, "Optimistic plan update");

    Ok(Json(match outcome {
        UpdateOutcome::Applied => OptimisticPlanResponse {
            applied: true,
            skipped: None,
        },
        UpdateOutcome::Skipped(reason) => OptimisticPlanResponse {
            applied: false,
            skipped: Some(reason),
        },
    }))
}

/// Revoke the bearer token
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.revoke(&token).map_err(|e| core_error(&e))?;
        tracing::debug!(token = %token, "Session revoked");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Plan catalog
pub async fn list_plans(State(state): State<AppState>) -> Json<Vec<PlanPricing>> {
    Json(state.catalog.list())
}

/// Checkout correlated by `client_reference_id` only
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CorrelatedCheckout>,
) -> Result<Json<CheckoutStarted>, ApiError> {
    let checkout = state.checkout.as_ref().ok_or_else(payments_disabled)?;

    checkout
        .start_correlated(payload)
        .await
        .map(Json)
        .map_err(|e| payment_error(&e))
}

/// Checkout for the signed-in user, with trusted metadata
pub async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AuthenticatedCheckout>,
) -> Result<Json<CheckoutStarted>, ApiError> {
    let checkout = state.checkout.as_ref().ok_or_else(payments_disabled)?;

    // An unknown or expired token is the same as no token here
    let principal = bearer_token(&headers).and_then(|t| state.sessions.resolve(&t).ok());

    checkout
        .start_authenticated(principal.as_ref(), payload)
        .await
        .map(Json)
        .map_err(|e| payment_error(&e))
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let receiver = state.webhook.as_ref().ok_or_else(payments_disabled)?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                "Missing Stripe signature",
                "MISSING_SIGNATURE",
            )
        })?;

    match receiver.receive(&body, signature).await {
        Ok(outcome) => {
            tracing::debug!(?outcome, "Webhook handled");
            Ok(Json(serde_json::json!({ "received": true })).into_response())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Webhook rejected");
            Ok(e.into_response())
        }
    }
}

/// All service listings
pub async fn list_services(State(state): State<AppState>) -> Result<Json<Vec<ServiceListing>>, ApiError> {
    state.listings.list_all().await.map(Json).map_err(|e| core_error(&e))
}

/// Create a listing; requires an active subscription within the plan's limit
pub async fn create_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewListing>,
) -> Result<(StatusCode, Json<ServiceListing>), ApiError> {
    let user = current_user(&state, &headers).await?;

    let existing = state
        .listings
        .list_by_provider(&user.id)
        .await
        .map_err(|e| core_error(&e))?;
    ensure_can_list(&user, existing.len()).map_err(|e| core_error(&e))?;

    let listing = ServiceListing::new(&user, payload).map_err(|e| core_error(&e))?;
    let listing = state.listings.insert(listing).await.map_err(|e| core_error(&e))?;

    tracing::info!(user_id = %user.id, listing_id = %listing.id, "Service listed");

    Ok((StatusCode::CREATED, Json(listing)))
}
