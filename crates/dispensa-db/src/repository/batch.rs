//! # Inventory Batch Repository
//!
//! Storage for received lots. Batch rows are written only inside the unit of
//! work that also moves the product stock counter.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use dispensa_core::InventoryBatch;

/// Repository for inventory batch operations.
pub struct BatchRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> BatchRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        BatchRepository { conn }
    }

    pub async fn insert(&mut self, batch: &InventoryBatch) -> DbResult<()> {
        debug!(id = %batch.id, product_id = %batch.product_id, quantity = batch.quantity, "Inserting batch");

        sqlx::query(
            r#"
            INSERT INTO inventory_batches (
                id, product_id, pharmacy_id, batch_number, quantity,
                expiry_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.product_id)
        .bind(&batch.pharmacy_id)
        .bind(&batch.batch_number)
        .bind(batch.quantity)
        .bind(batch.expiry_date)
        .bind(batch.created_at)
        .bind(batch.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&mut self, id: &str) -> DbResult<Option<InventoryBatch>> {
        let batch = sqlx::query_as::<_, InventoryBatch>(
            r#"
            SELECT
                id, product_id, pharmacy_id, batch_number, quantity,
                expiry_date, created_at, updated_at
            FROM inventory_batches
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(batch)
    }

    /// Batches of a product in FEFO order (dated first, never-expiring last).
    pub async fn list_by_product(&mut self, product_id: &str) -> DbResult<Vec<InventoryBatch>> {
        let batches = sqlx::query_as::<_, InventoryBatch>(
            r#"
            SELECT
                id, product_id, pharmacy_id, batch_number, quantity,
                expiry_date, created_at, updated_at
            FROM inventory_batches
            WHERE product_id = ?1
            ORDER BY expiry_date IS NULL, expiry_date, created_at, id
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(batches)
    }

    pub async fn list_by_pharmacy(&mut self, pharmacy_id: &str) -> DbResult<Vec<InventoryBatch>> {
        let batches = sqlx::query_as::<_, InventoryBatch>(
            r#"
            SELECT
                id, product_id, pharmacy_id, batch_number, quantity,
                expiry_date, created_at, updated_at
            FROM inventory_batches
            WHERE pharmacy_id = ?1
            ORDER BY expiry_date IS NULL, expiry_date, created_at, id
            "#,
        )
        .bind(pharmacy_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(batches)
    }

    /// Dated batches expiring on or before `cutoff`, soonest first.
    pub async fn list_expiring(
        &mut self,
        pharmacy_id: &str,
        cutoff: DateTime<Utc>,
    ) -> DbResult<Vec<InventoryBatch>> {
        let batches = sqlx::query_as::<_, InventoryBatch>(
            r#"
            SELECT
                id, product_id, pharmacy_id, batch_number, quantity,
                expiry_date, created_at, updated_at
            FROM inventory_batches
            WHERE pharmacy_id = ?1
              AND expiry_date IS NOT NULL
              AND expiry_date <= ?2
            ORDER BY expiry_date, created_at, id
            "#,
        )
        .bind(pharmacy_id)
        .bind(cutoff)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(batches)
    }

    /// Rewrites batch number, quantity and expiry.
    pub async fn update(&mut self, batch: &InventoryBatch) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_batches SET
                batch_number = ?2,
                quantity = ?3,
                expiry_date = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.batch_number)
        .bind(batch.quantity)
        .bind(batch.expiry_date)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Sets the quantity only if it still equals `expected`.
    ///
    /// Consumption plans are computed from a snapshot; this guard makes a
    /// concurrent change to the same batch fail the plan instead of being
    /// overwritten.
    pub async fn set_quantity_if(&mut self, id: &str, expected: i64, quantity: i64) -> DbResult<bool> {
        debug!(batch_id = %id, expected, quantity, "Setting batch quantity");

        let result = sqlx::query(
            r#"
            UPDATE inventory_batches SET
                quantity = ?3,
                updated_at = ?4
            WHERE id = ?1 AND quantity = ?2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Deletes the batch only if its quantity still equals `expected`.
    pub async fn delete_if(&mut self, id: &str, expected: i64) -> DbResult<bool> {
        debug!(batch_id = %id, expected, "Deleting drained batch");

        let result = sqlx::query("DELETE FROM inventory_batches WHERE id = ?1 AND quantity = ?2")
            .bind(id)
            .bind(expected)
            .execute(&mut *self.conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete(&mut self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM inventory_batches WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
