//! Error Types

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core domain errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Unknown user, listing or session
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record with this identity already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Required input missing or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller identity missing or not recognized
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Operation requires an active subscription
    #[error("Subscription required: {0}")]
    SubscriptionRequired(String),

    /// Plan does not allow more listings
    #[error("Listing limit reached: {plan} allows {limit}")]
    ListingLimitReached { plan: String, limit: usize },

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(String),
}

impl CoreError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Store(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            CoreError::NotFound(what) => format!("{what} was not found."),
            CoreError::AlreadyExists(_) => "That account already exists.".into(),
            CoreError::InvalidArgument(msg) => format!("Invalid request: {msg}"),
            CoreError::Unauthenticated(_) => "Please sign in to continue.".into(),
            CoreError::SubscriptionRequired(_) => {
                "You need an active subscription to list your services.".into()
            }
            CoreError::ListingLimitReached { plan, limit } => {
                format!("The {plan} plan allows up to {limit} services. Upgrade to list more.")
            }
            CoreError::Store(_) => "Something went wrong saving your data. Please try again.".into(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for CoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        CoreError::Store(format!("lock poisoned: {err}"))
    }
}
