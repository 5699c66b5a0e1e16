//! # dispensa-engine: Order Fulfillment Engine
//!
//! The operations a pharmacy's request handlers call: create an order,
//! move it through its lifecycle, receive stock, manage promo codes,
//! loyalty rates and membership tiers.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Engine                                       │
//! │                                                                         │
//! │  ┌──────────────────┐        ┌──────────────────┐                      │
//! │  │  OrderPipeline   │        │OrderStatusMachine│                      │
//! │  │  price + persist │        │ transitions +    │                      │
//! │  │  + consume stock │        │ completion hook  │                      │
//! │  └───┬───┬───┬───┬──┘        └────────┬─────────┘                      │
//! │      │   │   │   │                    │                                 │
//! │      │   │   │   └──────────┐         │                                 │
//! │      ▼   │   ▼              ▼         ▼                                 │
//! │ ┌────────┐ │ ┌────────────┐ ┌──────────────┐ ┌────────────────┐        │
//! │ │Inventory│ │ │PromoValid- │ │LoyaltyEngine │ │ PaymentService │        │
//! │ │Allocator│ │ │ator        │ │points ledger │ │ (advisory)     │        │
//! │ └────────┘ │ └────────────┘ └──────────────┘ └────────────────┘        │
//! │            ▼                                                            │
//! │     MembershipService                                                   │
//! │                                                                         │
//! │  Every compound operation runs in one dispensa-db UnitOfWork.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dispensa_engine::{Engine, EngineConfig, CreateOrderRequest};
//!
//! let engine = Engine::open(EngineConfig::load_or_default(None)).await?;
//!
//! let details = engine.orders().create(&pharmacy_id, &staff_id, request).await?;
//! engine.status().accept(&pharmacy_id, &details.order.id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod advisory;
pub mod config;
pub mod error;
pub mod inventory;
pub mod loyalty;
pub mod membership;
pub mod orders;
pub mod payments;
pub mod promo;
pub mod status;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, EngineConfig};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use inventory::{BatchUpdate, InventoryAllocator, NewBatch};
pub use loyalty::{LoyaltyEngine, ReferralRates, StaffRates};
pub use membership::{MembershipService, NewMembership};
pub use orders::{CreateOrderRequest, CustomerInfo, OrderDetails, OrderLine, OrderPipeline};
pub use payments::PaymentService;
pub use promo::{NewPromoCode, PromoCodeUpdate, PromoValidation, PromoValidator};
pub use status::OrderStatusMachine;

use dispensa_db::Database;
use tracing::info;

// =============================================================================
// Engine
// =============================================================================

/// Entry point handing out each service over one shared database.
///
/// Services are cheap to construct; they only clone the pool handle.
#[derive(Debug, Clone)]
pub struct Engine {
    db: Database,
    config: EngineConfig,
}

impl Engine {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        Engine { db, config }
    }

    /// Connects to the configured database (running migrations) and builds
    /// the engine.
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        config
            .validate()
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        let db = Database::new(config.db_config()).await?;
        info!(path = %config.database.path.display(), "Engine ready");

        Ok(Engine::new(db, config))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn inventory(&self) -> InventoryAllocator {
        InventoryAllocator::new(self.db.clone())
    }

    pub fn promos(&self) -> PromoValidator {
        PromoValidator::new(self.db.clone())
    }

    pub fn loyalty(&self) -> LoyaltyEngine {
        LoyaltyEngine::new(self.db.clone(), self.config.loyalty.referral_code_attempts)
    }

    pub fn memberships(&self) -> MembershipService {
        MembershipService::new(self.db.clone())
    }

    pub fn payments(&self) -> PaymentService {
        PaymentService::new(self.db.clone())
    }

    pub fn orders(&self) -> OrderPipeline {
        OrderPipeline::new(
            self.db.clone(),
            self.config.orders.clone(),
            self.config.loyalty.referral_code_attempts,
        )
    }

    pub fn status(&self) -> OrderStatusMachine {
        OrderStatusMachine::new(self.db.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_open_in_memory() {
        let mut config = EngineConfig::default();
        config.database.path = PathBuf::from(":memory:");

        let engine = Engine::open(config).await.unwrap();
        assert!(engine.database().health_check().await);
        assert_eq!(engine.config().orders.default_currency, "NPR");
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.orders.default_currency = "RUPEES".into();

        let err = Engine::open(config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
