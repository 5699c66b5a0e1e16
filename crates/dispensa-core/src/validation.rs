//! # Validation Module
//!
//! Input validation for everything the engine accepts from callers.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request handler (out of this workspace)                       │
//! │  └── Deserialization, authentication                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  ├── Field rules (positive quantities, 3-letter currency, ...)          │
//! │  └── Definition rules (promo windows, loyalty rates)                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── NOT NULL / CHECK constraints                                       │
//! │  ├── UNIQUE (pharmacy_id, code), (pharmacy_id, phone)                   │
//! │  └── Foreign key constraints                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use dispensa_core::validation::{validate_quantity, validate_phone};
//!
//! validate_quantity(5, 999).unwrap();
//! assert_eq!(validate_phone(" 9800000001 ").unwrap(), "9800000001");
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::types::DiscountType;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Returns the trimmed value, or `None` when blank. Blank optional codes are
/// treated exactly like absent ones.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required free-text field and returns it trimmed.
pub fn validate_required(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value.to_string())
}

/// Validates a customer phone number and returns it trimmed.
///
/// ## Rules
/// - Must not be empty (customers are keyed by phone)
/// - Digits, spaces, `+`, `-` and parentheses only
/// - At most 20 characters
pub fn validate_phone(phone: &str) -> ValidationResult<String> {
    let phone = validate_required("phone", phone, 20)?;

    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must contain only digits, spaces, '+', '-' and parentheses".to_string(),
        });
    }

    Ok(phone)
}

/// Validates a 3-letter currency code and returns it upper-cased.
///
/// ## Example
/// ```rust
/// use dispensa_core::validation::validate_currency;
///
/// assert_eq!(validate_currency("npr").unwrap(), "NPR");
/// assert!(validate_currency("RUPEES").is_err());
/// ```
pub fn validate_currency(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: "must be a 3-letter code".to_string(),
        });
    }

    Ok(code.to_ascii_uppercase())
}

/// Validates a promo code string and returns its stored (normalised) form.
pub fn validate_promo_code(code: &str) -> ValidationResult<String> {
    let code = validate_required("code", code, 50)?;

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(code.to_uppercase())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an order-line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed `max`
pub fn validate_quantity(qty: i64, max: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::must_be_positive("quantity"));
    }

    if qty > max {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max,
        });
    }

    Ok(())
}

/// Validates a price or amount in minor units. Zero is allowed.
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a percentage in basis points (0% to 100%).
pub fn validate_percentage_bps(field: &str, bps: i64) -> ValidationResult<()> {
    if !(0..=10_000).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

/// Validates that a rate used as a divisor or multiplier is strictly positive.
pub fn validate_rate(field: &str, value: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::must_be_positive(field));
    }

    Ok(())
}

// =============================================================================
// Definition Validators
// =============================================================================

/// Validates the value side of a promo definition.
///
/// ## Rules
/// - `discount_value > 0`
/// - percent values are basis points and may not exceed 100%
/// - `valid_until > valid_from`
pub fn validate_promo_terms(
    discount_type: DiscountType,
    discount_value: i64,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
) -> ValidationResult<()> {
    if discount_value <= 0 {
        return Err(ValidationError::must_be_positive("discount_value"));
    }

    if discount_type == DiscountType::Percent {
        validate_percentage_bps("discount_value", discount_value)?;
    }

    if valid_until <= valid_from {
        return Err(ValidationError::NotAfter {
            field: "valid_until".to_string(),
            after: "valid_from".to_string(),
        });
    }

    Ok(())
}

/// Validates a customer loyalty rate set.
///
/// All rates must be positive; `max_redeem_per_order` may be 0 (uncapped).
pub fn validate_referral_rates(
    points_per_currency_unit: i64,
    currency_unit_for_points_cents: i64,
    referral_reward_points: i64,
    redemption_rate_points: i64,
    redemption_rate_currency_cents: i64,
    max_redeem_per_order: i64,
) -> ValidationResult<()> {
    validate_rate("points_per_currency_unit", points_per_currency_unit)?;
    validate_rate("currency_unit_for_points", currency_unit_for_points_cents)?;
    validate_rate("referral_reward_points", referral_reward_points)?;
    validate_rate("redemption_rate_points", redemption_rate_points)?;
    validate_rate("redemption_rate_currency", redemption_rate_currency_cents)?;

    if max_redeem_per_order < 0 {
        return Err(ValidationError::OutOfRange {
            field: "max_redeem_per_order".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
