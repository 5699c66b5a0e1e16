//! # Membership Repository
//!
//! Membership tiers and the one-tier-per-customer link.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use dispensa_core::Membership;

pub struct MembershipRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> MembershipRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        MembershipRepository { conn }
    }

    pub async fn insert(&mut self, membership: &Membership) -> DbResult<()> {
        debug!(id = %membership.id, name = %membership.name, "Inserting membership tier");

        sqlx::query(
            r#"
            INSERT INTO memberships (id, pharmacy_id, name, discount_bps, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&membership.id)
        .bind(&membership.pharmacy_id)
        .bind(&membership.name)
        .bind(membership.discount_bps)
        .bind(membership.is_active)
        .bind(membership.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&mut self, id: &str) -> DbResult<Option<Membership>> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            SELECT id, pharmacy_id, name, discount_bps, is_active, created_at
            FROM memberships
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(membership)
    }

    pub async fn list_by_pharmacy(&mut self, pharmacy_id: &str) -> DbResult<Vec<Membership>> {
        let tiers = sqlx::query_as::<_, Membership>(
            r#"
            SELECT id, pharmacy_id, name, discount_bps, is_active, created_at
            FROM memberships
            WHERE pharmacy_id = ?1
            ORDER BY name
            "#,
        )
        .bind(pharmacy_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(tiers)
    }

    pub async fn set_active(&mut self, id: &str, is_active: bool) -> DbResult<bool> {
        let result = sqlx::query("UPDATE memberships SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(is_active)
            .execute(&mut *self.conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Assigns (or replaces) a customer's tier.
    pub async fn assign(&mut self, customer_id: &str, membership_id: &str) -> DbResult<()> {
        debug!(customer_id = %customer_id, membership_id = %membership_id, "Assigning membership");

        sqlx::query(
            r#"
            INSERT INTO customer_memberships (customer_id, membership_id, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (customer_id) DO UPDATE SET
                membership_id = excluded.membership_id,
                created_at = excluded.created_at
            "#,
        )
        .bind(customer_id)
        .bind(membership_id)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// The customer's tier, active or not.
    pub async fn for_customer(&mut self, customer_id: &str) -> DbResult<Option<Membership>> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            SELECT m.id, m.pharmacy_id, m.name, m.discount_bps, m.is_active, m.created_at
            FROM customer_memberships cm
            JOIN memberships m ON m.id = cm.membership_id
            WHERE cm.customer_id = ?1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(membership)
    }
}
