//! # Repository Module
//!
//! Database repository implementations.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories on a Unit of Work                       │
//! │                                                                         │
//! │  Engine service                                                         │
//! │       │                                                                 │
//! │       │  let mut uow = db.begin().await?;                               │
//! │       │  uow.products().get_by_id(id)                                   │
//! │       ▼                                                                 │
//! │  ProductRepository<'_>  (borrows the transaction's connection)          │
//! │  ├── get_by_id / list_by_pharmacy                                       │
//! │  ├── insert                                                             │
//! │  └── decrement_stock (guarded) / adjust_stock                           │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! │                                                                         │
//! │  A repository cannot outlive its unit of work, so every write made     │
//! │  through it is covered by the same COMMIT or ROLLBACK.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Products and the stock counter
//! - [`batch::BatchRepository`] - Inventory batches
//! - [`order::OrderRepository`] - Orders and order items
//! - [`promo::PromoCodeRepository`] - Promo codes and usage counter
//! - [`customer::CustomerRepository`] - Customers, referral codes, balance
//! - [`loyalty::LoyaltyRepository`] - Points ledgers and rate configs
//! - [`membership::MembershipRepository`] - Membership tiers
//! - [`payment::PaymentRepository`] - Gateways and payments

pub mod batch;
pub mod customer;
pub mod loyalty;
pub mod membership;
pub mod order;
pub mod payment;
pub mod product;
pub mod promo;
