//! # Product Repository
//!
//! Database operations for products and their stock counter.
//!
//! ## Stock Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two orders race for the last 3 units                                   │
//! │                                                                         │
//! │  Order A: UPDATE ... SET stock = stock - 3 WHERE id = ? AND stock >= 3  │
//! │           → 1 row  ✓                                                    │
//! │  Order B: UPDATE ... SET stock = stock - 3 WHERE id = ? AND stock >= 3  │
//! │           → 0 rows ✗ (caller aborts its unit of work)                   │
//! │                                                                         │
//! │  The check and the write are one statement, so no lost update.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use dispensa_core::Product;

/// Repository for product database operations.
pub struct ProductRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ProductRepository<'c> {
    /// Creates a new ProductRepository on an open connection.
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        ProductRepository { conn }
    }

    /// Gets a product by ID.
    pub async fn get_by_id(&mut self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                id, pharmacy_id, sku, name, price_cents, stock_quantity,
                is_active, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(product)
    }

    /// Lists a pharmacy's products by name.
    pub async fn list_by_pharmacy(&mut self, pharmacy_id: &str) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                id, pharmacy_id, sku, name, price_cents, stock_quantity,
                is_active, created_at, updated_at
            FROM products
            WHERE pharmacy_id = ?1
            ORDER BY name
            "#,
        )
        .bind(pharmacy_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(products)
    }

    /// Inserts a new product.
    pub async fn insert(&mut self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, pharmacy_id, sku, name, price_cents, stock_quantity,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.pharmacy_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.stock_quantity)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Takes `quantity` units from stock if at least that many remain.
    ///
    /// ## Returns
    /// `false` when the guard matched no row (stock too low or unknown id).
    pub async fn decrement_stock(&mut self, id: &str, quantity: i64) -> DbResult<bool> {
        debug!(product_id = %id, quantity, "Decrementing stock");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                stock_quantity = stock_quantity - ?2,
                updated_at = ?3
            WHERE id = ?1 AND stock_quantity >= ?2
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Applies a signed delta to stock, floored at zero.
    ///
    /// Used to mirror batch receipts, edits and deletions.
    pub async fn adjust_stock(&mut self, id: &str, delta: i64) -> DbResult<bool> {
        debug!(product_id = %id, delta, "Adjusting stock");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                stock_quantity = MAX(0, stock_quantity + ?2),
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Returns the current stock counter.
    pub async fn stock_of(&mut self, id: &str) -> DbResult<Option<i64>> {
        let stock: Option<i64> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *self.conn)
                .await?;

        Ok(stock)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
