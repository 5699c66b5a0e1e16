//! # Promo Code Rules
//!
//! Side-effect-free eligibility checks and discount computation for
//! [`PromoCode`]. The engine looks the code up and counts prior orders; this
//! module only decides.
//!
//! ## Evaluation Order (first failure wins)
//! ```text
//! active? ──► now in [valid_from, valid_until]? ──► uses left? ──►
//!   first-order-only? (identified user, zero prior orders) ──►
//!   subtotal ≥ min_order_amount? ──► discount > 0? ──► OK(discount)
//! ```

use chrono::{DateTime, Utc};

use crate::error::PromoRejection;
use crate::money::Money;
use crate::types::{DiscountType, Percentage, PromoCode};

/// Normalises user input to the stored code form (trimmed, upper-cased).
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// What the caller knows about the ordering user when a code is first-order-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderHistory {
    /// No identified user.
    Anonymous,
    /// Identified user with this many prior orders at the pharmacy.
    PriorOrders(i64),
}

impl PromoCode {
    /// Raw discount for `subtotal`, before the "must be positive" check.
    ///
    /// - `Percent`: `subtotal × bps / 10000`, rounded half up
    /// - `Fixed`: `min(value, subtotal)`
    pub fn discount_for(&self, subtotal: Money) -> Money {
        match self.discount_type {
            DiscountType::Percent => subtotal.percentage(Percentage::from_stored(self.discount_value)),
            DiscountType::Fixed => Money::from_cents(self.discount_value).min(subtotal),
        }
    }

    /// Runs every eligibility check and returns the discount.
    ///
    /// `history` is only consulted for first-order-only codes.
    pub fn evaluate(
        &self,
        now: DateTime<Utc>,
        subtotal: Money,
        history: OrderHistory,
    ) -> Result<Money, PromoRejection> {
        if !self.is_active {
            return Err(PromoRejection::Inactive);
        }

        if now < self.valid_from {
            return Err(PromoRejection::NotYetValid {
                starts_at: self.valid_from,
            });
        }
        if now > self.valid_until {
            return Err(PromoRejection::Expired {
                ended_at: self.valid_until,
            });
        }

        if self.uses_exhausted() {
            return Err(PromoRejection::MaxUsesReached);
        }

        if self.first_order_only {
            match history {
                OrderHistory::Anonymous => return Err(PromoRejection::RequiresIdentifiedUser),
                OrderHistory::PriorOrders(n) if n > 0 => return Err(PromoRejection::NotFirstOrder),
                OrderHistory::PriorOrders(_) => {}
            }
        }

        if subtotal < self.min_order_amount() {
            return Err(PromoRejection::BelowMinimum {
                minimum: self.min_order_amount(),
            });
        }

        let discount = self.discount_for(subtotal);
        if !discount.is_positive() {
            return Err(PromoRejection::DoesNotApply);
        }

        Ok(discount)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn promo(discount_type: DiscountType, value: i64) -> PromoCode {
        let now = Utc::now();
        PromoCode {
            id: "promo-1".into(),
            pharmacy_id: "ph1".into(),
            code: "SAVE10".into(),
            description: None,
            discount_type,
            discount_value: value,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            max_uses: 0,
            used_count: 0,
            min_order_amount_cents: 0,
            first_order_only: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    const ANON: OrderHistory = OrderHistory::Anonymous;

    #[test]
    fn test_percent_and_fixed_discounts() {
        let subtotal = Money::from_cents(20_000);

        let pct = promo(DiscountType::Percent, 1000);
        assert_eq!(pct.evaluate(Utc::now(), subtotal, ANON).unwrap().cents(), 2_000);

        let fixed = promo(DiscountType::Fixed, 50_000);
        assert_eq!(fixed.evaluate(Utc::now(), subtotal, ANON).unwrap(), subtotal);
    }

    #[test]
    fn test_max_uses() {
        let mut code = promo(DiscountType::Fixed, 500);
        code.max_uses = 1;
        assert!(code.evaluate(Utc::now(), Money::from_cents(1_000), ANON).is_ok());

        code.used_count = 1;
        let err = code.evaluate(Utc::now(), Money::from_cents(1_000), ANON).unwrap_err();
        assert_eq!(err, PromoRejection::MaxUsesReached);
        assert!(err.to_string().contains("maximum uses"));
    }

    #[test]
    fn test_window_checks() {
        let code = promo(DiscountType::Fixed, 500);
        let subtotal = Money::from_cents(1_000);

        assert!(matches!(
            code.evaluate(code.valid_from - Duration::seconds(1), subtotal, ANON),
            Err(PromoRejection::NotYetValid { .. })
        ));
        assert!(matches!(
            code.evaluate(code.valid_until + Duration::seconds(1), subtotal, ANON),
            Err(PromoRejection::Expired { .. })
        ));
        assert!(code.evaluate(code.valid_until, subtotal, ANON).is_ok());
    }

    #[test]
    fn test_first_order_only() {
        let mut code = promo(DiscountType::Fixed, 500);
        code.first_order_only = true;
        let subtotal = Money::from_cents(1_000);
        let now = Utc::now();

        assert_eq!(
            code.evaluate(now, subtotal, ANON).unwrap_err(),
            PromoRejection::RequiresIdentifiedUser
        );
        assert_eq!(
            code.evaluate(now, subtotal, OrderHistory::PriorOrders(2)).unwrap_err(),
            PromoRejection::NotFirstOrder
        );
        assert!(code.evaluate(now, subtotal, OrderHistory::PriorOrders(0)).is_ok());
    }

    #[test]
    fn test_first_failing_check_wins() {
        let mut code = promo(DiscountType::Fixed, 500);
        code.is_active = false;
        code.max_uses = 1;
        code.used_count = 1;
        assert_eq!(
            code.evaluate(Utc::now(), Money::zero(), ANON).unwrap_err(),
            PromoRejection::Inactive
        );
    }

    #[test]
    fn test_minimum_and_zero_discount() {
        let mut code = promo(DiscountType::Fixed, 500);
        code.min_order_amount_cents = 5_000;
        assert!(matches!(
            code.evaluate(Utc::now(), Money::from_cents(4_999), ANON),
            Err(PromoRejection::BelowMinimum { .. })
        ));

        let tiny = promo(DiscountType::Percent, 1);
        assert_eq!(
            tiny.evaluate(Utc::now(), Money::from_cents(10), ANON).unwrap_err(),
            PromoRejection::DoesNotApply
        );
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  save10 "), "SAVE10");
    }
}
