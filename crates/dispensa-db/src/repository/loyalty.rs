//! # Loyalty Repository
//!
//! Points ledgers (customer and staff) and the per-pharmacy rate tables.
//! Ledger rows are append-only; nothing here updates or deletes them.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use dispensa_core::{
    PointsTransaction, ReferralPointsConfig, StaffPointsConfig, StaffPointsTransaction,
};

/// Repository for points ledgers and loyalty configuration.
pub struct LoyaltyRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> LoyaltyRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        LoyaltyRepository { conn }
    }

    // =========================================================================
    // Customer ledger
    // =========================================================================

    pub async fn insert_transaction(&mut self, tx: &PointsTransaction) -> DbResult<()> {
        debug!(
            customer_id = %tx.customer_id,
            amount = tx.amount,
            kind = ?tx.kind,
            "Appending points transaction"
        );

        sqlx::query(
            r#"
            INSERT INTO points_transactions (
                id, pharmacy_id, customer_id, amount, kind,
                order_id, referred_customer_id, description, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.pharmacy_id)
        .bind(&tx.customer_id)
        .bind(tx.amount)
        .bind(tx.kind)
        .bind(&tx.order_id)
        .bind(&tx.referred_customer_id)
        .bind(&tx.description)
        .bind(tx.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// A customer's ledger, newest first.
    pub async fn list_transactions(&mut self, customer_id: &str) -> DbResult<Vec<PointsTransaction>> {
        let rows = sqlx::query_as::<_, PointsTransaction>(
            r#"
            SELECT
                id, pharmacy_id, customer_id, amount, kind,
                order_id, referred_customer_id, description, created_at
            FROM points_transactions
            WHERE customer_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows)
    }

    // =========================================================================
    // Referral / customer points config
    // =========================================================================

    pub async fn get_referral_config(&mut self, pharmacy_id: &str) -> DbResult<Option<ReferralPointsConfig>> {
        let config = sqlx::query_as::<_, ReferralPointsConfig>(
            r#"
            SELECT
                pharmacy_id, points_per_currency_unit, currency_unit_for_points_cents,
                referral_reward_points, redemption_rate_points,
                redemption_rate_currency_cents, max_redeem_per_order, updated_at
            FROM referral_points_configs
            WHERE pharmacy_id = ?1
            "#,
        )
        .bind(pharmacy_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(config)
    }

    pub async fn upsert_referral_config(&mut self, config: &ReferralPointsConfig) -> DbResult<()> {
        debug!(pharmacy_id = %config.pharmacy_id, "Saving referral points config");

        sqlx::query(
            r#"
            INSERT INTO referral_points_configs (
                pharmacy_id, points_per_currency_unit, currency_unit_for_points_cents,
                referral_reward_points, redemption_rate_points,
                redemption_rate_currency_cents, max_redeem_per_order, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (pharmacy_id) DO UPDATE SET
                points_per_currency_unit = excluded.points_per_currency_unit,
                currency_unit_for_points_cents = excluded.currency_unit_for_points_cents,
                referral_reward_points = excluded.referral_reward_points,
                redemption_rate_points = excluded.redemption_rate_points,
                redemption_rate_currency_cents = excluded.redemption_rate_currency_cents,
                max_redeem_per_order = excluded.max_redeem_per_order,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&config.pharmacy_id)
        .bind(config.points_per_currency_unit)
        .bind(config.currency_unit_for_points_cents)
        .bind(config.referral_reward_points)
        .bind(config.redemption_rate_points)
        .bind(config.redemption_rate_currency_cents)
        .bind(config.max_redeem_per_order)
        .bind(config.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Staff points
    // =========================================================================

    pub async fn get_staff_config(&mut self, pharmacy_id: &str) -> DbResult<Option<StaffPointsConfig>> {
        let config = sqlx::query_as::<_, StaffPointsConfig>(
            r#"
            SELECT pharmacy_id, points_per_currency_unit, currency_unit_for_points_cents, updated_at
            FROM staff_points_configs
            WHERE pharmacy_id = ?1
            "#,
        )
        .bind(pharmacy_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(config)
    }

    pub async fn upsert_staff_config(&mut self, config: &StaffPointsConfig) -> DbResult<()> {
        debug!(pharmacy_id = %config.pharmacy_id, "Saving staff points config");

        sqlx::query(
            r#"
            INSERT INTO staff_points_configs (
                pharmacy_id, points_per_currency_unit, currency_unit_for_points_cents, updated_at
            ) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (pharmacy_id) DO UPDATE SET
                points_per_currency_unit = excluded.points_per_currency_unit,
                currency_unit_for_points_cents = excluded.currency_unit_for_points_cents,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&config.pharmacy_id)
        .bind(config.points_per_currency_unit)
        .bind(config.currency_unit_for_points_cents)
        .bind(config.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn insert_staff_transaction(&mut self, tx: &StaffPointsTransaction) -> DbResult<()> {
        debug!(user_id = %tx.user_id, order_id = %tx.order_id, amount = tx.amount, "Crediting staff points");

        sqlx::query(
            r#"
            INSERT INTO staff_points_transactions (id, pharmacy_id, user_id, order_id, amount, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.pharmacy_id)
        .bind(&tx.user_id)
        .bind(&tx.order_id)
        .bind(tx.amount)
        .bind(tx.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn list_staff_transactions(
        &mut self,
        pharmacy_id: &str,
        user_id: &str,
    ) -> DbResult<Vec<StaffPointsTransaction>> {
        let rows = sqlx::query_as::<_, StaffPointsTransaction>(
            r#"
            SELECT id, pharmacy_id, user_id, order_id, amount, created_at
            FROM staff_points_transactions
            WHERE pharmacy_id = ?1 AND user_id = ?2
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(pharmacy_id)
        .bind(user_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows)
    }

    /// Staff balance is the ledger sum; there is no stored counter.
    pub async fn staff_balance(&mut self, pharmacy_id: &str, user_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM staff_points_transactions
            WHERE pharmacy_id = ?1 AND user_id = ?2
            "#,
        )
        .bind(pharmacy_id)
        .bind(user_id)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Utc;

    #[tokio::test]
    async fn test_referral_config_upsert() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();
        assert!(uow.loyalty().get_referral_config("ph-1").await.unwrap().is_none());

        let mut config = ReferralPointsConfig {
            pharmacy_id: "ph-1".into(),
            points_per_currency_unit: 1,
            currency_unit_for_points_cents: 10_000,
            referral_reward_points: 50,
            redemption_rate_points: 100,
            redemption_rate_currency_cents: 1_000,
            max_redeem_per_order: 0,
            updated_at: Utc::now(),
        };
        uow.loyalty().upsert_referral_config(&config).await.unwrap();

        config.referral_reward_points = 75;
        uow.loyalty().upsert_referral_config(&config).await.unwrap();

        let loaded = uow.loyalty().get_referral_config("ph-1").await.unwrap().unwrap();
        assert_eq!(loaded.referral_reward_points, 75);
    }

    #[tokio::test]
    async fn test_staff_balance_of_empty_ledger_is_zero() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();
        assert_eq!(uow.loyalty().staff_balance("ph-1", "staff-1").await.unwrap(), 0);
        assert!(uow.loyalty().get_staff_config("ph-1").await.unwrap().is_none());
    }
}
