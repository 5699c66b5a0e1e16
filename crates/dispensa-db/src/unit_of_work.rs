//! # Unit of Work
//!
//! One database transaction shared by every repository touched during a
//! compound operation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  let mut uow = db.begin().await?;        BEGIN IMMEDIATE                │
//! │  uow.orders().insert(&order).await?;     ─┐                             │
//! │  uow.promo_codes().increment_used(..)     │ same connection,            │
//! │  uow.customers().debit_points(..)         │ same transaction            │
//! │  uow.products().decrement_stock(..)      ─┘                             │
//! │  uow.commit().await?;                    COMMIT                         │
//! │                                                                         │
//! │  Any `?` above drops `uow` → ROLLBACK, nothing persisted                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{Sqlite, Transaction};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{
    batch::BatchRepository, customer::CustomerRepository, loyalty::LoyaltyRepository,
    membership::MembershipRepository, order::OrderRepository, payment::PaymentRepository,
    product::ProductRepository, promo::PromoCodeRepository,
};

/// An open transaction. Dropping it without [`UnitOfWork::commit`] rolls back.
#[derive(Debug)]
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        UnitOfWork { tx }
    }

    pub fn products(&mut self) -> ProductRepository<'_> {
        ProductRepository::new(&mut self.tx)
    }

    pub fn batches(&mut self) -> BatchRepository<'_> {
        BatchRepository::new(&mut self.tx)
    }

    pub fn orders(&mut self) -> OrderRepository<'_> {
        OrderRepository::new(&mut self.tx)
    }

    pub fn promo_codes(&mut self) -> PromoCodeRepository<'_> {
        PromoCodeRepository::new(&mut self.tx)
    }

    pub fn customers(&mut self) -> CustomerRepository<'_> {
        CustomerRepository::new(&mut self.tx)
    }

    pub fn loyalty(&mut self) -> LoyaltyRepository<'_> {
        LoyaltyRepository::new(&mut self.tx)
    }

    pub fn memberships(&mut self) -> MembershipRepository<'_> {
        MembershipRepository::new(&mut self.tx)
    }

    pub fn payments(&mut self) -> PaymentRepository<'_> {
        PaymentRepository::new(&mut self.tx)
    }

    /// Commits every write made through this unit of work.
    pub async fn commit(self) -> DbResult<()> {
        self.tx
            .commit()
            .await
            .map_err(DbError::from_begin)?;
        debug!("Unit of work committed");
        Ok(())
    }

    /// Discards every write made through this unit of work.
    pub async fn rollback(self) -> DbResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        debug!("Unit of work rolled back");
        Ok(())
    }
}
