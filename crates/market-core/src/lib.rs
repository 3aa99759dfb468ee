//! # market-core
//!
//! Domain model and subscription state for the service marketplace.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐        ┌────────────────────┐
//! │ Webhook Receiver │        │   Client Return    │
//! │ (authoritative)  │        │ Handler (advisory) │
//! └────────┬─────────┘        └─────────┬──────────┘
//!          │ guarded UserPatch         │ guarded UserPatch
//!          ▼                           ▼
//! ┌─────────────────────────────────────────────────┐
//! │            Subscription State Store             │
//! │        (UserStore: atomic single-record)        │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! Every write carries a `PatchGuard` evaluated atomically with the update,
//! which is what makes webhook redelivery a no-op and lets the signed webhook
//! win over the browser regardless of arrival order.

pub mod checkout_return;
pub mod error;
pub mod listing;
pub mod session;
pub mod store;
pub mod user;

pub use checkout_return::{
    AuthState, Notice, OptimisticUpdate, ProcessedPaymentMarker, ReturnParams, ReturnState,
    Transition,
};
pub use error::{CoreError, Result};
pub use listing::{ListingStore, MemoryListingStore, NewListing, ProviderProfile, ServiceListing};
pub use session::{AuthSession, MemorySessionStore, SessionStore, SessionToken};
pub use store::{MemoryUserStore, UserStore};
pub use user::{
    PatchGuard, Plan, SkipReason, SubscriptionStatus, UpdateOutcome, User, UserId, UserPatch,
};
