//! # Money
//!
//! Integer minor-unit amounts for prices, discounts and totals.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  A points-discount of "floor(points / 100) × 10.00" computed in floats  │
//! │  drifts by a paisa here and there, and the customer ledger no longer    │
//! │  reconciles with the order totals.                                      │
//! │                                                                         │
//! │  NPR 10.00 is stored as 1000, so every discount is an integer.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The currency code travels beside the amount (`Order::currency`), never
//! inside it: there is no conversion logic anywhere in the engine.
//!
//! ## Usage
//! ```rust
//! use dispensa_core::money::Money;
//!
//! let price = Money::from_cents(1099); // 10.99
//! let line_total = price.multiply_quantity(3);
//! assert_eq!(line_total.cents(), 3297);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::Percentage;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (paisa for NPR).
///
/// Signed: a discount can exceed the subtotal until it is clamped.
///
/// ## Where Money is Used
/// ```text
/// Product.price_cents ──► OrderItem.unit_price ──► OrderItem.line_total
///                                                        │
///                                                        ▼
///                     subtotal ──► − discount ──► total (floored at 0)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// A value in minor units: `from_cents(1099)` is 10.99.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns the percentage share of this amount, rounded half up.
    ///
    /// ## Implementation
    /// Integer math on basis points: `(amount * bps + 5000) / 10000`.
    ///
    /// ## Example
    /// ```rust
    /// use dispensa_core::money::Money;
    /// use dispensa_core::types::Percentage;
    ///
    /// let subtotal = Money::from_cents(1000);
    /// // 8.25% of 10.00 = 0.825 → 0.83
    /// assert_eq!(subtotal.percentage(Percentage::from_bps(825)).cents(), 83);
    /// ```
    pub fn percentage(&self, pct: Percentage) -> Money {
        // i128 so that large subtotals cannot overflow
        let share = (self.0 as i128 * pct.bps() as i128 + 5000) / 10000;
        Money::from_cents(share as i64)
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use dispensa_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// How many whole `unit`s fit into this amount (floor division).
    ///
    /// Returns 0 for non-positive amounts or a non-positive unit, so the
    /// loyalty math never produces negative or undefined point counts.
    ///
    /// ## Example
    /// ```rust
    /// use dispensa_core::money::Money;
    ///
    /// let total = Money::from_cents(25_050);
    /// assert_eq!(total.whole_units_of(Money::from_cents(10_000)), 2);
    /// ```
    pub const fn whole_units_of(&self, unit: Money) -> i64 {
        if self.0 <= 0 || unit.0 <= 0 {
            return 0;
        }
        self.0 / unit.0
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }

    /// Returns the amount floored at zero.
    #[inline]
    pub fn non_negative(self) -> Money {
        Money(self.0.max(0))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain `major.minor` rendering; the currency code is carried separately.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
