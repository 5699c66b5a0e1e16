//! # Loyalty Points Math
//!
//! Earn and redeem arithmetic for customer and staff points, plus referral
//! code formatting. Randomness and persistence live in the engine.
//!
//! ## Redemption
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  balance 150, rate 100 pts → 10.00, requested 120, subtotal 500.00      │
//! │                                                                         │
//! │  1. clamp:    min(120, balance 150, cap)          = 120 pts             │
//! │  2. units:    floor(120 / 100)                    = 1                   │
//! │  3. discount: 1 × 10.00                           = 10.00               │
//! │  4. fit:      discount ≤ subtotal? yes                                  │
//! │  5. points:   1 × 100                             = 100 pts redeemed    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Points actually consumed are always a whole multiple of the rate, so the
//! ledger and the discount agree.

use crate::money::Money;
use crate::types::{ReferralPointsConfig, StaffPointsConfig};

// =============================================================================
// Referral Codes
// =============================================================================

/// 32 symbols, no 0/O/1/I.
pub const REFERRAL_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a generated referral code.
pub const REFERRAL_CODE_LENGTH: usize = 8;

/// Builds a referral code from alphabet indices (taken modulo 32).
///
/// The engine feeds this from a random source; tests feed it fixed indices.
pub fn referral_code_from_indices<I>(indices: I) -> String
where
    I: IntoIterator<Item = usize>,
{
    indices
        .into_iter()
        .take(REFERRAL_CODE_LENGTH)
        .map(|i| REFERRAL_CODE_ALPHABET[i % REFERRAL_CODE_ALPHABET.len()] as char)
        .collect()
}

/// Normalises user input to the stored code form.
pub fn normalize_referral_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Whether `code` could have been produced by the generator.
pub fn is_well_formed_referral_code(code: &str) -> bool {
    code.len() == REFERRAL_CODE_LENGTH && code.bytes().all(|b| REFERRAL_CODE_ALPHABET.contains(&b))
}

// =============================================================================
// Earning
// =============================================================================

/// `floor(total / unit) × points_per_unit`; 0 when any input is non-positive.
pub fn earned_points(total: Money, unit: Money, points_per_unit: i64) -> i64 {
    if points_per_unit <= 0 {
        return 0;
    }
    total.whole_units_of(unit) * points_per_unit
}

impl ReferralPointsConfig {
    /// Purchase points a completed order of `total` earns the customer.
    pub fn purchase_points(&self, total: Money) -> i64 {
        earned_points(total, self.currency_unit_for_points(), self.points_per_currency_unit)
    }

    /// Computes how many points to redeem and the discount they buy.
    ///
    /// Never fails: absent or non-positive inputs produce [`RedeemQuote::none`].
    pub fn quote_redemption(&self, balance: i64, requested: i64, subtotal: Money) -> RedeemQuote {
        if requested <= 0 || balance <= 0 {
            return RedeemQuote::none();
        }
        if self.redemption_rate_points <= 0 || self.redemption_rate_currency_cents <= 0 {
            return RedeemQuote::none();
        }

        let cap = if self.max_redeem_per_order > 0 {
            balance.min(self.max_redeem_per_order)
        } else {
            balance
        };
        let points = requested.min(cap);

        let rate_currency = self.redemption_rate_currency();
        let mut units = points / self.redemption_rate_points;
        if rate_currency * units > subtotal {
            units = subtotal.whole_units_of(rate_currency);
        }

        if units <= 0 {
            return RedeemQuote::none();
        }

        RedeemQuote {
            points: units * self.redemption_rate_points,
            discount: rate_currency * units,
        }
    }
}

impl StaffPointsConfig {
    /// Points credited to the staff member who created a completed order.
    pub fn points_for(&self, total: Money) -> i64 {
        earned_points(total, self.currency_unit_for_points(), self.points_per_currency_unit)
    }
}

// =============================================================================
// Redemption Quote
// =============================================================================

/// Result of a redemption preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RedeemQuote {
    /// Points that will be debited.
    pub points: i64,
    /// Discount those points buy.
    pub discount: Money,
}

impl RedeemQuote {
    pub const fn none() -> Self {
        RedeemQuote {
            points: 0,
            discount: Money::zero(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points == 0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
