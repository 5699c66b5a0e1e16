//! # Customer Repository
//!
//! Customer identities keyed by `(pharmacy_id, phone)`, their referral codes
//! and points balance.
//!
//! Balance changes are single statements so the `points_balance >= 0`
//! invariant holds under concurrent redemptions:
//! ```text
//! debit:  UPDATE ... SET points_balance = points_balance - ? WHERE points_balance >= ?
//! credit: UPDATE ... SET points_balance = points_balance + ?
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use dispensa_core::Customer;

/// Repository for customer operations.
pub struct CustomerRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> CustomerRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        CustomerRepository { conn }
    }

    pub async fn insert(&mut self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, pharmacy_id = %customer.pharmacy_id, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, pharmacy_id, name, phone, email, referral_code,
                points_balance, referred_by_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.pharmacy_id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(&customer.referral_code)
        .bind(customer.points_balance)
        .bind(&customer.referred_by_id)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&mut self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT
                id, pharmacy_id, name, phone, email, referral_code,
                points_balance, referred_by_id, created_at, updated_at
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(customer)
    }

    pub async fn get_by_phone(&mut self, pharmacy_id: &str, phone: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT
                id, pharmacy_id, name, phone, email, referral_code,
                points_balance, referred_by_id, created_at, updated_at
            FROM customers
            WHERE pharmacy_id = ?1 AND phone = ?2
            "#,
        )
        .bind(pharmacy_id)
        .bind(phone)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(customer)
    }

    pub async fn get_by_referral_code(
        &mut self,
        pharmacy_id: &str,
        code: &str,
    ) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT
                id, pharmacy_id, name, phone, email, referral_code,
                points_balance, referred_by_id, created_at, updated_at
            FROM customers
            WHERE pharmacy_id = ?1 AND referral_code = ?2
            "#,
        )
        .bind(pharmacy_id)
        .bind(code)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(customer)
    }

    /// Whether any customer already holds `code`.
    pub async fn referral_code_taken(&mut self, code: &str) -> DbResult<bool> {
        let taken: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM customers WHERE referral_code = ?1)")
                .bind(code)
                .fetch_one(&mut *self.conn)
                .await?;

        Ok(taken == 1)
    }

    /// Refreshes name and email from the latest order.
    pub async fn update_contact(&mut self, id: &str, name: &str, email: Option<&str>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE customers SET
                name = ?2,
                email = COALESCE(?3, email),
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Assigns a referral code to a customer that has none.
    pub async fn set_referral_code(&mut self, id: &str, code: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE customers SET
                referral_code = ?2,
                updated_at = ?3
            WHERE id = ?1 AND referral_code IS NULL
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Records the referrer unless one is already recorded.
    ///
    /// ## Returns
    /// `true` only if this call attached the referral.
    pub async fn set_referred_by_if_unset(&mut self, id: &str, referrer_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE customers SET
                referred_by_id = ?2,
                updated_at = ?3
            WHERE id = ?1 AND referred_by_id IS NULL AND id <> ?2
            "#,
        )
        .bind(id)
        .bind(referrer_id)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Takes `points` from the balance if it covers them.
    pub async fn debit_points(&mut self, id: &str, points: i64) -> DbResult<bool> {
        debug!(customer_id = %id, points, "Debiting points");

        let result = sqlx::query(
            r#"
            UPDATE customers SET
                points_balance = points_balance - ?2,
                updated_at = ?3
            WHERE id = ?1 AND points_balance >= ?2
            "#,
        )
        .bind(id)
        .bind(points)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn credit_points(&mut self, id: &str, points: i64) -> DbResult<bool> {
        debug!(customer_id = %id, points, "Crediting points");

        let result = sqlx::query(
            r#"
            UPDATE customers SET
                points_balance = points_balance + ?2,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(points)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
