//! # Order Repository
//!
//! Database operations for orders and order items.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. CREATE (one unit of work)                                           │
//! │     └── insert() → Order { status: Pending }                            │
//! │     └── insert_item() × N  (price/name snapshots)                       │
//! │                                                                         │
//! │  2. ADVANCE                                                             │
//! │     └── update_status(id, from, to) guarded by the current status       │
//! │                                                                         │
//! │  3. COMPLETE                                                            │
//! │     └── update_status(.., Completed) also stamps completed_at           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use dispensa_core::{Order, OrderItem, OrderStatus};

/// Repository for order database operations.
pub struct OrderRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> OrderRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        OrderRepository { conn }
    }

    /// Inserts an order row.
    pub async fn insert(&mut self, order: &Order) -> DbResult<()> {
        debug!(
            id = %order.id,
            pharmacy_id = %order.pharmacy_id,
            total_cents = order.total_cents,
            "Inserting order"
        );

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, pharmacy_id, customer_id, customer_name, customer_phone, customer_email,
                status, subtotal_cents, discount_cents, tax_cents, total_cents, currency,
                promo_code_id, referral_code_used, points_redeemed, payment_gateway_id,
                notes, created_by, created_at, updated_at, completed_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20, ?21
            )
            "#,
        )
        .bind(&order.id)
        .bind(&order.pharmacy_id)
        .bind(&order.customer_id)
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(&order.customer_email)
        .bind(order.status)
        .bind(order.subtotal_cents)
        .bind(order.discount_cents)
        .bind(order.tax_cents)
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(&order.promo_code_id)
        .bind(&order.referral_code_used)
        .bind(order.points_redeemed)
        .bind(&order.payment_gateway_id)
        .bind(&order.notes)
        .bind(&order.created_by)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.completed_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Inserts an order item.
    ///
    /// ## Snapshot Pattern
    /// Product name and unit price are copied onto the item so the order
    /// keeps its history even if the catalog changes later.
    pub async fn insert_item(&mut self, item: &OrderItem) -> DbResult<()> {
        debug!(order_id = %item.order_id, product_id = %item.product_id, quantity = item.quantity, "Inserting order item");

        sqlx::query(
            r#"
            INSERT INTO order_items (
                id, order_id, product_id, product_name, quantity,
                unit_price_cents, line_total_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.line_total_cents)
        .bind(item.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&mut self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT
                id, pharmacy_id, customer_id, customer_name, customer_phone, customer_email,
                status, subtotal_cents, discount_cents, tax_cents, total_cents, currency,
                promo_code_id, referral_code_used, points_redeemed, payment_gateway_id,
                notes, created_by, created_at, updated_at, completed_at
            FROM orders
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(order)
    }

    /// Gets all items for an order, in insertion order.
    pub async fn get_items(&mut self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT
                id, order_id, product_id, product_name, quantity,
                unit_price_cents, line_total_cents, created_at
            FROM order_items
            WHERE order_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(items)
    }

    /// Lists a pharmacy's orders newest first, optionally only one creator's.
    pub async fn list_by_pharmacy(
        &mut self,
        pharmacy_id: &str,
        created_by: Option<&str>,
    ) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT
                id, pharmacy_id, customer_id, customer_name, customer_phone, customer_email,
                status, subtotal_cents, discount_cents, tax_cents, total_cents, currency,
                promo_code_id, referral_code_used, points_redeemed, payment_gateway_id,
                notes, created_by, created_at, updated_at, completed_at
            FROM orders
            WHERE pharmacy_id = ?1
              AND (?2 IS NULL OR created_by = ?2)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(pharmacy_id)
        .bind(created_by)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(orders)
    }

    /// Moves an order from `from` to `to` if it is still in `from`.
    ///
    /// Landing on `Completed` stamps `completed_at`.
    ///
    /// ## Returns
    /// `false` when the order is missing or its status changed underneath.
    pub async fn update_status(
        &mut self,
        id: &str,
        from: OrderStatus,
        to: OrderStatus,
    ) -> DbResult<bool> {
        debug!(order_id = %id, %from, %to, "Updating order status");

        let now = Utc::now();
        let completed_at = (to == OrderStatus::Completed).then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = ?3,
                updated_at = ?4,
                completed_at = COALESCE(?5, completed_at)
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(now)
        .bind(completed_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Orders of a customer at a pharmacy in the given status.
    pub async fn count_by_customer_and_status(
        &mut self,
        pharmacy_id: &str,
        customer_id: &str,
        status: OrderStatus,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE pharmacy_id = ?1 AND customer_id = ?2 AND status = ?3
            "#,
        )
        .bind(pharmacy_id)
        .bind(customer_id)
        .bind(status)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(count)
    }

    /// Orders created by a user at a pharmacy.
    pub async fn count_by_creator(&mut self, pharmacy_id: &str, created_by: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE pharmacy_id = ?1 AND created_by = ?2",
        )
        .bind(pharmacy_id)
        .bind(created_by)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(count)
    }
}
