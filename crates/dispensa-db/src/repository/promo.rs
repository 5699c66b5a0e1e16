//! # Promo Code Repository
//!
//! Codes are stored normalised (trimmed, upper-case); lookups expect the
//! caller to pass the normalised form.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use dispensa_core::PromoCode;

/// Repository for promo code operations.
pub struct PromoCodeRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PromoCodeRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PromoCodeRepository { conn }
    }

    pub async fn insert(&mut self, promo: &PromoCode) -> DbResult<()> {
        debug!(id = %promo.id, code = %promo.code, "Inserting promo code");

        sqlx::query(
            r#"
            INSERT INTO promo_codes (
                id, pharmacy_id, code, description, discount_type, discount_value,
                valid_from, valid_until, max_uses, used_count, min_order_amount_cents,
                first_order_only, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&promo.id)
        .bind(&promo.pharmacy_id)
        .bind(&promo.code)
        .bind(&promo.description)
        .bind(promo.discount_type)
        .bind(promo.discount_value)
        .bind(promo.valid_from)
        .bind(promo.valid_until)
        .bind(promo.max_uses)
        .bind(promo.used_count)
        .bind(promo.min_order_amount_cents)
        .bind(promo.first_order_only)
        .bind(promo.is_active)
        .bind(promo.created_at)
        .bind(promo.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&mut self, id: &str) -> DbResult<Option<PromoCode>> {
        let promo = sqlx::query_as::<_, PromoCode>(
            r#"
            SELECT
                id, pharmacy_id, code, description, discount_type, discount_value,
                valid_from, valid_until, max_uses, used_count, min_order_amount_cents,
                first_order_only, is_active, created_at, updated_at
            FROM promo_codes
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(promo)
    }

    /// Looks a code up within one pharmacy.
    pub async fn get_by_code(&mut self, pharmacy_id: &str, code: &str) -> DbResult<Option<PromoCode>> {
        let promo = sqlx::query_as::<_, PromoCode>(
            r#"
            SELECT
                id, pharmacy_id, code, description, discount_type, discount_value,
                valid_from, valid_until, max_uses, used_count, min_order_amount_cents,
                first_order_only, is_active, created_at, updated_at
            FROM promo_codes
            WHERE pharmacy_id = ?1 AND code = ?2
            "#,
        )
        .bind(pharmacy_id)
        .bind(code)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(promo)
    }

    pub async fn list_by_pharmacy(&mut self, pharmacy_id: &str) -> DbResult<Vec<PromoCode>> {
        let promos = sqlx::query_as::<_, PromoCode>(
            r#"
            SELECT
                id, pharmacy_id, code, description, discount_type, discount_value,
                valid_from, valid_until, max_uses, used_count, min_order_amount_cents,
                first_order_only, is_active, created_at, updated_at
            FROM promo_codes
            WHERE pharmacy_id = ?1
            ORDER BY created_at DESC, code
            "#,
        )
        .bind(pharmacy_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(promos)
    }

    /// Rewrites the editable fields. `used_count` is never written here.
    pub async fn update(&mut self, promo: &PromoCode) -> DbResult<bool> {
        debug!(id = %promo.id, code = %promo.code, "Updating promo code");

        let result = sqlx::query(
            r#"
            UPDATE promo_codes SET
                code = ?2,
                description = ?3,
                discount_type = ?4,
                discount_value = ?5,
                valid_from = ?6,
                valid_until = ?7,
                max_uses = ?8,
                min_order_amount_cents = ?9,
                first_order_only = ?10,
                is_active = ?11,
                updated_at = ?12
            WHERE id = ?1
            "#,
        )
        .bind(&promo.id)
        .bind(&promo.code)
        .bind(&promo.description)
        .bind(promo.discount_type)
        .bind(promo.discount_value)
        .bind(promo.valid_from)
        .bind(promo.valid_until)
        .bind(promo.max_uses)
        .bind(promo.min_order_amount_cents)
        .bind(promo.first_order_only)
        .bind(promo.is_active)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Records one use if the code still has uses left.
    ///
    /// ## Returns
    /// `false` when the cap was reached concurrently (or the id is unknown).
    pub async fn increment_used_count(&mut self, id: &str) -> DbResult<bool> {
        debug!(promo_id = %id, "Incrementing promo usage");

        let result = sqlx::query(
            r#"
            UPDATE promo_codes SET
                used_count = used_count + 1,
                updated_at = ?2
            WHERE id = ?1 AND (max_uses = 0 OR used_count < max_uses)
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
