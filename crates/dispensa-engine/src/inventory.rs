//! # Inventory Allocator
//!
//! Stock consumption across inventory batches (FEFO) and batch maintenance
//! that keeps `Product.stock_quantity` in step with the batches.
//!
//! ## Consumption
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  consume(product, qty)                                                  │
//! │                                                                         │
//! │  1. qty > 0, product exists in this pharmacy, stock ≥ qty               │
//! │  2. plan = FEFO plan over the product's batches (no writes yet)         │
//! │     └── batch sum < qty → InsufficientStock, nothing written            │
//! │  3. per draw: drained → DELETE batch, else UPDATE quantity              │
//! │     (both guarded on the quantity the plan was computed from)           │
//! │  4. stock_quantity -= qty  (guarded: stock_quantity ≥ qty)              │
//! │                                                                         │
//! │  All inside the caller's unit of work: any failure rolls back 3 and 4.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use dispensa_core::fefo::{plan_consumption, BatchDraw};
use dispensa_core::validation::validate_required;
use dispensa_core::{CoreError, InventoryBatch, Product, ValidationError};
use dispensa_db::{Database, UnitOfWork};

use crate::error::{EngineError, EngineResult};

/// Stock receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    pub product_id: String,
    pub batch_number: String,
    pub quantity: i64,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
}

/// Partial batch edit. `expiry_date: Some(None)` clears the expiry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdate {
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub expiry_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone)]
pub struct InventoryAllocator {
    db: Database,
}

impl InventoryAllocator {
    pub fn new(db: Database) -> Self {
        InventoryAllocator { db }
    }

    // =========================================================================
    // Consumption
    // =========================================================================

    /// Deducts `quantity` units of a product in its own unit of work.
    pub async fn consume(
        &self,
        pharmacy_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> EngineResult<Vec<BatchDraw>> {
        let mut uow = self.db.begin().await?;
        let plan = Self::consume_in(&mut uow, pharmacy_id, product_id, quantity).await?;
        uow.commit().await?;
        Ok(plan)
    }

    /// Deducts `quantity` units inside `uow`.
    ///
    /// ## Errors
    /// - `quantity <= 0`, insufficient stock or batch total → `Validation`
    /// - unknown product → `NotFound`, other pharmacy → `Forbidden`
    /// - a batch or the counter changed underneath → `Conflict`
    pub(crate) async fn consume_in(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> EngineResult<Vec<BatchDraw>> {
        if quantity <= 0 {
            return Err(ValidationError::must_be_positive("quantity").into());
        }

        let product = Self::product_in(uow, pharmacy_id, product_id).await?;

        if !product.has_stock(quantity) {
            return Err(CoreError::InsufficientStock {
                product: product.name,
                available: product.stock_quantity,
                requested: quantity,
            }
            .into());
        }

        let batches = uow.batches().list_by_product(product_id).await?;
        let plan = plan_consumption(&product.name, &batches, quantity)?;

        for draw in &plan {
            let before = draw.taken + draw.remaining;
            let applied = if draw.drains_batch() {
                uow.batches().delete_if(&draw.batch_id, before).await?
            } else {
                uow.batches()
                    .set_quantity_if(&draw.batch_id, before, draw.remaining)
                    .await?
            };

            if !applied {
                return Err(EngineError::conflict(format!(
                    "Batch {} changed during allocation",
                    draw.batch_id
                )));
            }
            debug!(batch_id = %draw.batch_id, taken = draw.taken, remaining = draw.remaining, "Batch drawn");
        }

        if !uow.products().decrement_stock(product_id, quantity).await? {
            let available = uow.products().stock_of(product_id).await?.unwrap_or(0);
            return Err(CoreError::InsufficientStock {
                product: product.name,
                available,
                requested: quantity,
            }
            .into());
        }

        info!(
            product_id = %product_id,
            quantity,
            batches = plan.len(),
            "Stock consumed"
        );

        Ok(plan)
    }

    // =========================================================================
    // Batch Maintenance
    // =========================================================================

    /// Receives stock: inserts a batch and raises the product counter.
    pub async fn add_batch(&self, pharmacy_id: &str, input: NewBatch) -> EngineResult<InventoryBatch> {
        let batch_number = validate_required("batch_number", &input.batch_number, 50)?;
        if input.quantity <= 0 {
            return Err(ValidationError::must_be_positive("quantity").into());
        }

        let mut uow = self.db.begin().await?;
        let product = Self::product_in(&mut uow, pharmacy_id, &input.product_id).await?;

        let now = Utc::now();
        let batch = InventoryBatch {
            id: Uuid::new_v4().to_string(),
            product_id: product.id.clone(),
            pharmacy_id: pharmacy_id.to_string(),
            batch_number,
            quantity: input.quantity,
            expiry_date: input.expiry_date,
            created_at: now,
            updated_at: now,
        };

        uow.batches().insert(&batch).await?;
        uow.products().adjust_stock(&product.id, batch.quantity).await?;
        uow.commit().await?;

        info!(batch_id = %batch.id, product_id = %product.id, quantity = batch.quantity, "Batch added");
        Ok(batch)
    }

    /// Edits a batch; a quantity change is mirrored on the product counter.
    pub async fn update_batch(
        &self,
        pharmacy_id: &str,
        batch_id: &str,
        update: BatchUpdate,
    ) -> EngineResult<InventoryBatch> {
        let mut uow = self.db.begin().await?;
        let mut batch = Self::batch_in(&mut uow, pharmacy_id, batch_id).await?;
        let previous = batch.quantity;

        if let Some(number) = update.batch_number {
            batch.batch_number = validate_required("batch_number", &number, 50)?;
        }
        if let Some(quantity) = update.quantity {
            if quantity < 0 {
                return Err(ValidationError::OutOfRange {
                    field: "quantity".to_string(),
                    min: 0,
                    max: i64::MAX,
                }
                .into());
            }
            batch.quantity = quantity;
        }
        if let Some(expiry) = update.expiry_date {
            batch.expiry_date = expiry;
        }
        batch.updated_at = Utc::now();

        if !uow.batches().update(&batch).await? {
            return Err(EngineError::not_found("InventoryBatch", batch_id));
        }

        let delta = batch.quantity - previous;
        if delta != 0 {
            uow.products().adjust_stock(&batch.product_id, delta).await?;
        }
        uow.commit().await?;

        info!(batch_id = %batch_id, delta, "Batch updated");
        Ok(batch)
    }

    /// Removes a batch and its remaining quantity from the product counter.
    pub async fn delete_batch(&self, pharmacy_id: &str, batch_id: &str) -> EngineResult<()> {
        let mut uow = self.db.begin().await?;
        let batch = Self::batch_in(&mut uow, pharmacy_id, batch_id).await?;

        uow.batches().delete(&batch.id).await?;
        uow.products()
            .adjust_stock(&batch.product_id, -batch.quantity)
            .await?;
        uow.commit().await?;

        info!(batch_id = %batch_id, quantity = batch.quantity, "Batch deleted");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_batch(&self, pharmacy_id: &str, batch_id: &str) -> EngineResult<InventoryBatch> {
        let mut uow = self.db.begin_read().await?;
        Self::batch_in(&mut uow, pharmacy_id, batch_id).await
    }

    /// A product's batches in consumption order.
    pub async fn list_batches(
        &self,
        pharmacy_id: &str,
        product_id: &str,
    ) -> EngineResult<Vec<InventoryBatch>> {
        let mut uow = self.db.begin_read().await?;
        Self::product_in(&mut uow, pharmacy_id, product_id).await?;
        Ok(uow.batches().list_by_product(product_id).await?)
    }

    pub async fn list_pharmacy_batches(&self, pharmacy_id: &str) -> EngineResult<Vec<InventoryBatch>> {
        let mut uow = self.db.begin_read().await?;
        Ok(uow.batches().list_by_pharmacy(pharmacy_id).await?)
    }

    /// Dated batches expiring within `days` from now (already expired
    /// included), soonest first.
    pub async fn list_expiring_soon(
        &self,
        pharmacy_id: &str,
        days: i64,
    ) -> EngineResult<Vec<InventoryBatch>> {
        if !(0..=3650).contains(&days) {
            return Err(ValidationError::OutOfRange {
                field: "days".to_string(),
                min: 0,
                max: 3650,
            }
            .into());
        }

        let cutoff = Utc::now() + Duration::days(days);
        let mut uow = self.db.begin_read().await?;
        Ok(uow.batches().list_expiring(pharmacy_id, cutoff).await?)
    }

    // =========================================================================
    // Scoped Lookups
    // =========================================================================

    pub(crate) async fn product_in(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        product_id: &str,
    ) -> EngineResult<Product> {
        let product = uow
            .products()
            .get_by_id(product_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Product", product_id))?;

        if product.pharmacy_id != pharmacy_id {
            return Err(EngineError::forbidden("Product", product_id));
        }
        Ok(product)
    }

    async fn batch_in(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        batch_id: &str,
    ) -> EngineResult<InventoryBatch> {
        let batch = uow
            .batches()
            .get_by_id(batch_id)
            .await?
            .ok_or_else(|| EngineError::not_found("InventoryBatch", batch_id))?;

        if batch.pharmacy_id != pharmacy_id {
            return Err(EngineError::forbidden("InventoryBatch", batch_id));
        }
        Ok(batch)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
