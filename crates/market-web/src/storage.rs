//! Browser Storage
//!
//! The processed-payment marker lives in `sessionStorage` so it is scoped to
//! the tab session; the bearer token lives in `localStorage`.

use market_core::ProcessedPaymentMarker;
use web_sys::Storage;

/// Marker key checked by the dashboard before applying a checkout return
pub const PROCESSED_PAYMENT_KEY: &str = "hasProcessedPayment";

pub const AUTH_TOKEN_KEY: &str = "authToken";

fn session_storage() -> Option<Storage> {
    web_sys::window()?.session_storage().ok()?
}

fn local_storage() -> Option<Storage> {
    web_sys::window()?.local_storage().ok()?
}

pub fn processed_marker() -> ProcessedPaymentMarker {
    match session_storage().and_then(|s| s.get_item(PROCESSED_PAYMENT_KEY).ok().flatten()) {
        Some(value) if value == "true" => ProcessedPaymentMarker::Processed,
        _ => ProcessedPaymentMarker::Unset,
    }
}

pub fn set_processed_marker(marker: ProcessedPaymentMarker) {
    let Some(storage) = session_storage() else {
        return;
    };
    let result = match marker {
        ProcessedPaymentMarker::Processed => storage.set_item(PROCESSED_PAYMENT_KEY, "true"),
        ProcessedPaymentMarker::Unset => storage.remove_item(PROCESSED_PAYMENT_KEY),
    };
    if let Err(e) = result {
        tracing::warn!(error = ?e, ?marker, "Could not write processed-payment marker");
    }
}

pub fn auth_token() -> Option<String> {
    local_storage()?
        .get_item(AUTH_TOKEN_KEY)
        .ok()
        .flatten()
        .filter(|t| !t.is_empty())
}

pub fn set_auth_token(token: &str) {
    if let Some(storage) = local_storage() {
        if let Err(e) = storage.set_item(AUTH_TOKEN_KEY, token) {
            tracing::warn!(error = ?e, "Could not store auth token");
        }
    }
}

/// Forget the token and the marker
pub fn clear_session() {
    if let Some(storage) = local_storage() {
        if let Err(e) = storage.remove_item(AUTH_TOKEN_KEY) {
            tracing::warn!(error = ?e, "Could not remove auth token");
        }
    }
    set_processed_marker(ProcessedPaymentMarker::Unset);
}
