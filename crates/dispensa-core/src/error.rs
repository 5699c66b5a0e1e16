//! # Error Types
//!
//! Domain-specific error types for dispensa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  dispensa-core errors (this file)                                       │
//! │  ├── CoreError        - Business rule violations                        │
//! │  ├── PromoRejection   - Why a promo code was refused                    │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  dispensa-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  dispensa-engine errors                                                 │
//! │  └── EngineError      - What callers see (Validation/NotFound/...)      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError ← DbError              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Messages carry the context a caller needs to act: product, states,
//! amounts.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::money::Money;
use crate::types::OrderStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or domain logic failures.
/// The engine surfaces all of them as validation failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Not enough stock to satisfy a request.
    ///
    /// ## When This Occurs
    /// - Ordering more than `Product.stock_quantity`
    /// - The product's batches sum to less than the request (FEFO plan)
    ///
    /// ## User Workflow
    /// ```text
    /// Order line (qty: 7)
    ///      │
    ///      ▼
    /// Check stock: available=5
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Paracetamol 500mg", available: 5, requested: 7 }
    /// ```
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// Status change not present in the transition table.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Order has no line items.
    #[error("Order must contain at least one item")]
    EmptyOrder,

    /// Order has too many line items.
    #[error("Order cannot have more than {max} items")]
    TooManyItems { max: usize },

    /// Customer balance does not cover a redemption.
    #[error("Insufficient points: balance {available}, requested {requested}")]
    InsufficientPoints { available: i64, requested: i64 },

    /// Promo code refused.
    #[error(transparent)]
    Promo(#[from] PromoRejection),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Promo Rejection
// =============================================================================

/// Why a promo code cannot be applied. Variants follow the evaluation order;
/// the first failing check wins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromoRejection {
    #[error("Invalid promo code: {code}")]
    UnknownCode { code: String },

    #[error("Promo code is not active")]
    Inactive,

    #[error("Promo code is not valid until {starts_at}")]
    NotYetValid { starts_at: DateTime<Utc> },

    #[error("Promo code expired at {ended_at}")]
    Expired { ended_at: DateTime<Utc> },

    #[error("Promo code has reached its maximum uses")]
    MaxUsesReached,

    #[error("Promo code is for first orders only; sign in to use it")]
    RequiresIdentifiedUser,

    #[error("Promo code is for first orders only")]
    NotFirstOrder,

    #[error("Order subtotal must be at least {minimum} to use this promo code")]
    BelowMinimum { minimum: Money },

    #[error("Promo code does not apply to this order")]
    DoesNotApply,
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid currency code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Time window whose end does not come after its start.
    #[error("{field} must be after {after}")]
    NotAfter { field: String, after: String },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub fn must_be_positive(field: &str) -> Self {
        ValidationError::MustBePositive {
            field: field.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
