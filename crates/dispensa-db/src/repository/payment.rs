//! # Payment Repository
//!
//! Payment gateways offered by a pharmacy and payments recorded against
//! orders.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use dispensa_core::{Payment, PaymentGateway, PaymentStatus};

pub struct PaymentRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PaymentRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PaymentRepository { conn }
    }

    // =========================================================================
    // Gateways
    // =========================================================================

    pub async fn insert_gateway(&mut self, gateway: &PaymentGateway) -> DbResult<()> {
        debug!(id = %gateway.id, name = %gateway.name, "Inserting payment gateway");

        sqlx::query(
            r#"
            INSERT INTO payment_gateways (id, pharmacy_id, name, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&gateway.id)
        .bind(&gateway.pharmacy_id)
        .bind(&gateway.name)
        .bind(gateway.is_active)
        .bind(gateway.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn get_gateway(&mut self, id: &str) -> DbResult<Option<PaymentGateway>> {
        let gateway = sqlx::query_as::<_, PaymentGateway>(
            "SELECT id, pharmacy_id, name, is_active, created_at FROM payment_gateways WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(gateway)
    }

    pub async fn list_gateways(&mut self, pharmacy_id: &str) -> DbResult<Vec<PaymentGateway>> {
        let gateways = sqlx::query_as::<_, PaymentGateway>(
            r#"
            SELECT id, pharmacy_id, name, is_active, created_at
            FROM payment_gateways
            WHERE pharmacy_id = ?1
            ORDER BY name
            "#,
        )
        .bind(pharmacy_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(gateways)
    }

    // =========================================================================
    // Payments
    // =========================================================================

    pub async fn insert_payment(&mut self, payment: &Payment) -> DbResult<()> {
        debug!(order_id = %payment.order_id, amount_cents = payment.amount_cents, "Recording payment");

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, pharmacy_id, order_id, gateway_id, amount_cents, currency,
                status, reference, created_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.pharmacy_id)
        .bind(&payment.order_id)
        .bind(&payment.gateway_id)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status)
        .bind(&payment.reference)
        .bind(payment.created_at)
        .bind(payment.completed_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Marks a pending payment completed.
    pub async fn mark_completed(&mut self, id: &str, reference: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = ?2,
                reference = ?3,
                completed_at = ?4
            WHERE id = ?1 AND status = ?5
            "#,
        )
        .bind(id)
        .bind(PaymentStatus::Completed)
        .bind(reference)
        .bind(Utc::now())
        .bind(PaymentStatus::Pending)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_for_order(&mut self, order_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT
                id, pharmacy_id, order_id, gateway_id, amount_cents, currency,
                status, reference, created_at, completed_at
            FROM payments
            WHERE order_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(payments)
    }
}
