//! # Domain Types
//!
//! Core domain types shared by the pricing, inventory and loyalty rules.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Order      │   │   PromoCode     │       │
//! │  │  stock_quantity │◄──│  OrderItem[]    │──►│  percent|fixed  │       │
//! │  │  InventoryBatch │   │  status (FSM)   │   │  used/max uses  │       │
//! │  └─────────────────┘   └────────┬────────┘   └─────────────────┘       │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Membership    │◄──│    Customer     │──►│PointsTransaction│       │
//! │  │  discount bps   │   │  referral code  │   │  signed ledger  │       │
//! │  └─────────────────┘   │  points balance │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entity is pharmacy-scoped through `pharmacy_id`. Identifiers are
//! UUID v4 strings; money columns are stored in minor units with a `Money`
//! accessor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Percentage
// =============================================================================

/// A percentage represented in basis points (bps).
///
/// 1 basis point = 0.01%, so 1250 bps = 12.5%. Promo percent values and
/// membership discounts are both carried this way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Percentage(u32);

impl Percentage {
    /// One hundred percent.
    pub const FULL: Percentage = Percentage(10_000);

    /// Creates a percentage from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Percentage(bps)
    }

    /// Creates a percentage from whole percent points.
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        Percentage(pct * 100)
    }

    /// Converts a stored bps column, clamping into `0..=u32::MAX`.
    pub fn from_stored(bps: i64) -> Self {
        Percentage(bps.clamp(0, u32::MAX as i64) as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero percent.
    #[inline]
    pub const fn zero() -> Self {
        Percentage(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Percentage {
    fn default() -> Self {
        Percentage::zero()
    }
}

// =============================================================================
// Product
// =============================================================================

/// A pharmacy-scoped catalog entry.
///
/// `stock_quantity` is the single stock counter. When inventory batches exist
/// it mirrors their summed quantity; without batches it is the only source of
/// truth.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub pharmacy_id: String,
    pub sku: String,
    pub name: String,
    /// Unit price in minor units.
    pub price_cents: i64,
    pub stock_quantity: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the unit price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Checks whether `quantity` units can be taken from stock.
    #[inline]
    pub fn has_stock(&self, quantity: i64) -> bool {
        self.stock_quantity >= quantity
    }
}

// =============================================================================
// Inventory Batch
// =============================================================================

/// A received lot of a product with its own quantity and optional expiry.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryBatch {
    pub id: String,
    pub product_id: String,
    pub pharmacy_id: String,
    pub batch_number: String,
    pub quantity: i64,
    /// `None` means the stock never expires; it is consumed last.
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl InventoryBatch {
    /// Whether the batch expiry lies strictly before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry_date, Some(expiry) if expiry < now)
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Lifecycle state of an order. Transitions live in [`crate::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Ready,
    /// Terminal. Reaching it triggers the loyalty completion hook once.
    Completed,
    /// Terminal.
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Ready,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: OrderStatus::ALL.iter().map(|s| s.to_string()).collect(),
            })
    }
}

// =============================================================================
// Order
// =============================================================================

/// A priced, stock-reserved order.
///
/// Money fields are fixed at creation:
/// `discount = min(subtotal, membership + promo/manual + points)` and
/// `total = max(0, subtotal − discount)`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub pharmacy_id: String,
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub status: OrderStatus,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    /// 3-letter code carried opaquely.
    pub currency: String,
    pub promo_code_id: Option<String>,
    pub referral_code_used: Option<String>,
    pub points_redeemed: i64,
    pub payment_gateway_id: Option<String>,
    pub notes: Option<String>,
    /// Staff member who created the order.
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Order Item
// =============================================================================

/// A line of an order. Price and name are snapshots taken at creation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// Product name at time of order (frozen).
    pub product_name: String,
    pub quantity: i64,
    /// Unit price at time of order (frozen).
    pub unit_price_cents: i64,
    /// unit_price × quantity.
    pub line_total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Promo Code
// =============================================================================

/// How a promo code's `discount_value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` is basis points of the subtotal.
    Percent,
    /// `discount_value` is an amount in minor units.
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percent => "percent",
            DiscountType::Fixed => "fixed",
        }
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscountType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "percent" | "percentage" => Ok(DiscountType::Percent),
            "fixed" => Ok(DiscountType::Fixed),
            _ => Err(ValidationError::NotAllowed {
                field: "discount_type".to_string(),
                allowed: vec!["percent".to_string(), "fixed".to_string()],
            }),
        }
    }
}

/// A pharmacy-scoped discount code. Rule evaluation lives in [`crate::promo`].
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PromoCode {
    pub id: String,
    pub pharmacy_id: String,
    /// Stored trimmed and upper-cased; unique per pharmacy.
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    /// Basis points for `Percent`, minor units for `Fixed`.
    pub discount_value: i64,
    #[ts(as = "String")]
    pub valid_from: DateTime<Utc>,
    #[ts(as = "String")]
    pub valid_until: DateTime<Utc>,
    /// 0 means unlimited.
    pub max_uses: i64,
    pub used_count: i64,
    pub min_order_amount_cents: i64,
    pub first_order_only: bool,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl PromoCode {
    #[inline]
    pub fn min_order_amount(&self) -> Money {
        Money::from_cents(self.min_order_amount_cents)
    }

    /// Whether the code is capped and the cap has been reached.
    #[inline]
    pub fn uses_exhausted(&self) -> bool {
        self.max_uses > 0 && self.used_count >= self.max_uses
    }
}

// =============================================================================
// Customer & Loyalty
// =============================================================================

/// A pharmacy-scoped customer identity keyed by phone.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub pharmacy_id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub referral_code: Option<String>,
    /// Never negative.
    pub points_balance: i64,
    /// Set at most once; the first referral wins.
    pub referred_by_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Ledger entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PointsTransactionKind {
    EarnPurchase,
    EarnReferral,
    Redeem,
}

/// Immutable points ledger row. Every balance change writes exactly one.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PointsTransaction {
    pub id: String,
    pub pharmacy_id: String,
    pub customer_id: String,
    /// Positive for earn, negative for redeem.
    pub amount: i64,
    pub kind: PointsTransactionKind,
    pub order_id: Option<String>,
    /// For `EarnReferral`: the customer whose first completed order paid out.
    pub referred_customer_id: Option<String>,
    pub description: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Per-pharmacy loyalty rates. No row means loyalty is off for the pharmacy.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReferralPointsConfig {
    pub pharmacy_id: String,
    /// Points awarded per whole `currency_unit_for_points` spent.
    pub points_per_currency_unit: i64,
    pub currency_unit_for_points_cents: i64,
    pub referral_reward_points: i64,
    /// `redemption_rate_points` points buy `redemption_rate_currency_cents`.
    pub redemption_rate_points: i64,
    pub redemption_rate_currency_cents: i64,
    /// 0 means uncapped (bounded by the balance only).
    pub max_redeem_per_order: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl ReferralPointsConfig {
    #[inline]
    pub fn currency_unit_for_points(&self) -> Money {
        Money::from_cents(self.currency_unit_for_points_cents)
    }

    #[inline]
    pub fn redemption_rate_currency(&self) -> Money {
        Money::from_cents(self.redemption_rate_currency_cents)
    }
}

/// Per-pharmacy rates for crediting the staff member who created an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StaffPointsConfig {
    pub pharmacy_id: String,
    pub points_per_currency_unit: i64,
    pub currency_unit_for_points_cents: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StaffPointsConfig {
    #[inline]
    pub fn currency_unit_for_points(&self) -> Money {
        Money::from_cents(self.currency_unit_for_points_cents)
    }
}

/// Staff points ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StaffPointsTransaction {
    pub id: String,
    pub pharmacy_id: String,
    pub user_id: String,
    pub order_id: String,
    pub amount: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Membership
// =============================================================================

/// A membership tier carrying a discount, honoured only while active.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Membership {
    pub id: String,
    pub pharmacy_id: String,
    pub name: String,
    pub discount_bps: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Membership {
    #[inline]
    pub fn discount_percent(&self) -> Percentage {
        Percentage::from_stored(self.discount_bps)
    }
}

/// Link between a customer and a membership tier (one per customer).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CustomerMembership {
    pub customer_id: String,
    pub membership_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payments
// =============================================================================

/// A payment gateway a pharmacy can offer at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentGateway {
    pub id: String,
    pub pharmacy_id: String,
    pub name: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

/// A payment recorded against an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub pharmacy_id: String,
    pub order_id: String,
    pub gateway_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Gateway-side reference.
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_percentage_constructors() {
        assert_eq!(Percentage::from_percent(10).bps(), 1000);
        assert_eq!(Percentage::from_stored(-5), Percentage::zero());
        assert_eq!(Percentage::FULL.bps(), 10_000);
    }

    #[test]
    fn test_order_status_parsing() {
        assert_eq!("completed".parse::<OrderStatus>().unwrap(), OrderStatus::Completed);
        assert_eq!(" Ready ".parse::<OrderStatus>().unwrap(), OrderStatus::Ready);
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_order_status_serializes_lowercase() {
        let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_discount_type_parsing() {
        assert_eq!("PERCENT".parse::<DiscountType>().unwrap(), DiscountType::Percent);
        assert_eq!("fixed".parse::<DiscountType>().unwrap(), DiscountType::Fixed);
        assert!("bogo".parse::<DiscountType>().is_err());
    }

    #[test]
    fn test_batch_expiry() {
        let now = Utc::now();
        let batch = InventoryBatch {
            id: "b".into(),
            product_id: "p".into(),
            pharmacy_id: "ph".into(),
            batch_number: "LOT-1".into(),
            quantity: 5,
            expiry_date: Some(now - Duration::days(1)),
            created_at: now,
            updated_at: now,
        };
        assert!(batch.is_expired(now));

        let never = InventoryBatch { expiry_date: None, ..batch };
        assert!(!never.is_expired(now));
    }
}
