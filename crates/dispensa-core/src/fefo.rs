//! # FEFO Batch Planning
//!
//! First-Expiry-First-Out consumption of inventory batches, computed as a
//! plan before anything is written.
//!
//! ## Consumption Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Batches sorted by expiry (dated first, never-expiring last)            │
//! │                                                                         │
//! │   LOT-A 2025-01-01 qty 5   LOT-B 2025-06-01 qty 5   LOT-C (none) qty 5  │
//! │   ─────────────────────    ─────────────────────    ──────────────────  │
//! │   consume 7:  take 5 ✕     take 2 → 3 left          untouched          │
//! │   consume 15: take 5 ✕     take 5 ✕                 take 5 ✕           │
//! │                                                                         │
//! │   ✕ = batch drained, row deleted                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The plan is all-or-nothing: if the batches cannot cover the request,
//! [`plan_consumption`] fails and the caller writes nothing.

use std::cmp::Ordering;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::InventoryBatch;

/// One step of a consumption plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDraw {
    pub batch_id: String,
    /// Units taken from this batch.
    pub taken: i64,
    /// Units left in the batch afterwards.
    pub remaining: i64,
}

impl BatchDraw {
    /// A drained batch is deleted rather than updated.
    #[inline]
    pub fn drains_batch(&self) -> bool {
        self.remaining == 0
    }
}

/// FEFO ordering: expiry ascending with `None` last, then oldest receipt,
/// then id so that the order is total.
pub fn fefo_cmp(a: &InventoryBatch, b: &InventoryBatch) -> Ordering {
    let by_expiry = match (a.expiry_date, b.expiry_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    by_expiry
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts batches into consumption order.
pub fn sort_fefo(batches: &mut [InventoryBatch]) {
    batches.sort_by(fefo_cmp);
}

/// Sum of all batch quantities.
pub fn batch_total(batches: &[InventoryBatch]) -> i64 {
    batches.iter().map(|b| b.quantity.max(0)).sum()
}

/// Computes which batches to draw `quantity` units from.
///
/// `product` only names the product in the error message. Batches may be
/// passed in any order. An empty batch list yields an empty plan: the
/// product counter is then the only stock to deduct.
///
/// ## Errors
/// - `quantity <= 0` → validation error
/// - batch sum below `quantity` → [`CoreError::InsufficientStock`]
pub fn plan_consumption(
    product: &str,
    batches: &[InventoryBatch],
    quantity: i64,
) -> CoreResult<Vec<BatchDraw>> {
    if quantity <= 0 {
        return Err(ValidationError::must_be_positive("quantity").into());
    }

    if batches.is_empty() {
        return Ok(Vec::new());
    }

    let available = batch_total(batches);
    if available < quantity {
        return Err(CoreError::InsufficientStock {
            product: product.to_string(),
            available,
            requested: quantity,
        });
    }

    let mut ordered: Vec<&InventoryBatch> = batches.iter().filter(|b| b.quantity > 0).collect();
    ordered.sort_by(|a, b| fefo_cmp(a, b));

    let mut still_needed = quantity;
    let mut plan = Vec::new();

    for batch in ordered {
        if still_needed == 0 {
            break;
        }
        let taken = still_needed.min(batch.quantity);
        still_needed -= taken;
        plan.push(BatchDraw {
            batch_id: batch.id.clone(),
            taken,
            remaining: batch.quantity - taken,
        });
    }

    Ok(plan)
}

/// Applies a signed delta to a stock counter, floored at zero.
///
/// Used when batches are added, edited or removed so that the product
/// counter follows the batch totals.
#[inline]
pub fn apply_stock_delta(stock: i64, delta: i64) -> i64 {
    (stock + delta).max(0)
}

// =============================================================================
// Unit Tests
// =============================================================================
