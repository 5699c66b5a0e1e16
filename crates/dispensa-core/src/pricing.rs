//! # Order Pricing
//!
//! Composes line totals and the three discount sources into final order
//! amounts.
//!
//! ```text
//! subtotal = Σ unit_price × quantity
//! discount = min(subtotal, membership + (promo | manual) + points)
//! total    = max(0, subtotal − discount)
//! tax      = 0
//! ```

use crate::money::Money;
use crate::types::Membership;

/// Discount contributions gathered by the order pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscountParts {
    pub membership: Money,
    /// Promo discount, or the manual amount when no promo code was given.
    pub promo_or_manual: Money,
    pub points: Money,
}

impl DiscountParts {
    /// Sum of the parts, unclamped.
    pub fn gross(&self) -> Money {
        self.membership + self.promo_or_manual + self.points
    }
}

/// Final amounts stored on the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

/// Line total for one order item.
#[inline]
pub fn line_total(unit_price: Money, quantity: i64) -> Money {
    unit_price.multiply_quantity(quantity)
}

/// Membership discount: `subtotal × pct` for an active tier with pct > 0.
pub fn membership_discount(subtotal: Money, membership: Option<&Membership>) -> Money {
    match membership {
        Some(tier) if tier.is_active && !tier.discount_percent().is_zero() => {
            subtotal.percentage(tier.discount_percent())
        }
        _ => Money::zero(),
    }
}

/// Clamps the combined discount into `[0, subtotal]` and derives the total.
pub fn price_order(subtotal: Money, parts: DiscountParts) -> PriceBreakdown {
    let discount = parts.gross().min(subtotal).non_negative();
    let total = (subtotal - discount).non_negative();

    PriceBreakdown {
        subtotal,
        discount,
        tax: Money::zero(),
        total,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
