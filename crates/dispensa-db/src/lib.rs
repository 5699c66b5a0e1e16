//! # dispensa-db: Database Layer for the Order Fulfillment Engine
//!
//! SQLite storage with sqlx. Every read and write goes through a
//! [`UnitOfWork`] so that compound operations are atomic.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Dispensa Data Flow                               │
//! │                                                                         │
//! │  dispensa-engine (OrderPipeline::create, ...)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   dispensa-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │   │   │
//! │  │   │               │    │ ProductRepo   │    │              │   │   │
//! │  │   │ SqlitePool    │    │ BatchRepo     │    │ 001_initial  │   │   │
//! │  │   │ begin() ──────┼───►│ OrderRepo ... │    │   _schema    │   │   │
//! │  │   │  UnitOfWork   │    │               │    │              │   │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (WAL)                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dispensa_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("dispensa.db")).await?;
//!
//! let mut uow = db.begin().await?;
//! let products = uow.products().list_by_pharmacy(&pharmacy_id).await?;
//! uow.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod unit_of_work;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use unit_of_work::UnitOfWork;

pub use repository::batch::BatchRepository;
pub use repository::customer::CustomerRepository;
pub use repository::loyalty::LoyaltyRepository;
pub use repository::membership::MembershipRepository;
pub use repository::order::OrderRepository;
pub use repository::payment::PaymentRepository;
pub use repository::product::ProductRepository;
pub use repository::promo::PromoCodeRepository;
