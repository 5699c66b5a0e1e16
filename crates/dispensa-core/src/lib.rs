//! # dispensa-core: Pure Business Logic for the Order Fulfillment Engine
//!
//! This crate holds the pricing, inventory and loyalty rules as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Dispensa Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Request handlers (outside this workspace)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    dispensa-engine                              │   │
//! │  │   OrderPipeline, OrderStatusMachine, LoyaltyEngine, ...         │   │
//! │  └──────────────┬──────────────────────────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────────┐  ┌────────────▼───────────────┐   │
//! │  │   ★ dispensa-core (THIS CRATE) ★ │  │        dispensa-db         │   │
//! │  │                                 │  │  SQLite repositories,      │   │
//! │  │  money  fefo  promo  loyalty    │  │  unit of work, migrations  │   │
//! │  │  status pricing validation      │  └────────────────────────────┘   │
//! │  │                                 │                                    │
//! │  │  NO I/O • NO DATABASE • PURE    │                                    │
//! │  └─────────────────────────────────┘                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities (Product, Order, PromoCode, Customer, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`fefo`] - First-Expiry-First-Out batch planning
//! - [`promo`] - Promo code eligibility and discount
//! - [`loyalty`] - Points earn/redeem math, referral code format
//! - [`status`] - Order status transition table
//! - [`pricing`] - Subtotal/discount/total composition
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use dispensa_core::money::Money;
//! use dispensa_core::pricing::{price_order, DiscountParts};
//!
//! let subtotal = Money::from_cents(10_000);
//! let price = price_order(subtotal, DiscountParts {
//!     promo_or_manual: Money::from_cents(12_000),
//!     ..Default::default()
//! });
//!
//! // Discounts never exceed the subtotal
//! assert_eq!(price.discount, subtotal);
//! assert_eq!(price.total, Money::zero());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod fefo;
pub mod loyalty;
pub mod money;
pub mod pricing;
pub mod promo;
pub mod status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, PromoRejection, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Currency recorded on orders when none is configured.
pub const DEFAULT_CURRENCY: &str = "NPR";

/// Maximum line items allowed in a single order.
pub const MAX_ORDER_ITEMS: usize = 100;

/// Maximum quantity of a single order line.
///
/// Guards against typing 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Collision retries when generating a unique referral code.
pub const REFERRAL_CODE_ATTEMPTS: u32 = 20;
