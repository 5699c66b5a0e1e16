//! Membership tiers and their assignment to customers.
//!
//! A tier's discount only reaches an order while the tier is active.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use dispensa_core::validation::{validate_percentage_bps, validate_required};
use dispensa_core::Membership;
use dispensa_db::{Database, UnitOfWork};

use crate::error::{EngineError, EngineResult};
use crate::loyalty::LoyaltyEngine;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMembership {
    pub name: String,
    /// Basis points, 0..=10000.
    pub discount_bps: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct MembershipService {
    db: Database,
}

impl MembershipService {
    pub fn new(db: Database) -> Self {
        MembershipService { db }
    }

    pub async fn create_tier(&self, pharmacy_id: &str, input: NewMembership) -> EngineResult<Membership> {
        let name = validate_required("name", &input.name, 100)?;
        validate_percentage_bps("discount_percent", input.discount_bps)?;

        let tier = Membership {
            id: Uuid::new_v4().to_string(),
            pharmacy_id: pharmacy_id.to_string(),
            name,
            discount_bps: input.discount_bps,
            is_active: input.is_active,
            created_at: Utc::now(),
        };

        let mut uow = self.db.begin().await?;
        uow.memberships().insert(&tier).await?;
        uow.commit().await?;

        info!(membership_id = %tier.id, name = %tier.name, "Membership tier created");
        Ok(tier)
    }

    pub async fn list_tiers(&self, pharmacy_id: &str) -> EngineResult<Vec<Membership>> {
        let mut uow = self.db.begin_read().await?;
        Ok(uow.memberships().list_by_pharmacy(pharmacy_id).await?)
    }

    pub async fn set_tier_active(
        &self,
        pharmacy_id: &str,
        membership_id: &str,
        is_active: bool,
    ) -> EngineResult<Membership> {
        let mut uow = self.db.begin().await?;
        let mut tier = Self::tier_in(&mut uow, pharmacy_id, membership_id).await?;

        uow.memberships().set_active(membership_id, is_active).await?;
        uow.commit().await?;

        info!(membership_id = %membership_id, is_active, "Membership tier toggled");
        tier.is_active = is_active;
        Ok(tier)
    }

    /// Gives `customer_id` the tier, replacing any previous one.
    pub async fn assign(
        &self,
        pharmacy_id: &str,
        customer_id: &str,
        membership_id: &str,
    ) -> EngineResult<()> {
        let mut uow = self.db.begin().await?;
        LoyaltyEngine::customer_in(&mut uow, pharmacy_id, customer_id).await?;
        Self::tier_in(&mut uow, pharmacy_id, membership_id).await?;

        uow.memberships().assign(customer_id, membership_id).await?;
        uow.commit().await?;

        info!(customer_id = %customer_id, membership_id = %membership_id, "Membership assigned");
        Ok(())
    }

    /// The customer's assigned tier, active or not.
    pub async fn membership_for(
        &self,
        pharmacy_id: &str,
        customer_id: &str,
    ) -> EngineResult<Option<Membership>> {
        let mut uow = self.db.begin_read().await?;
        LoyaltyEngine::customer_in(&mut uow, pharmacy_id, customer_id).await?;
        Ok(uow.memberships().for_customer(customer_id).await?)
    }

    /// The tier that prices an order: assigned and currently active.
    pub(crate) async fn active_membership_in(
        uow: &mut UnitOfWork,
        customer_id: &str,
    ) -> EngineResult<Option<Membership>> {
        Ok(uow
            .memberships()
            .for_customer(customer_id)
            .await?
            .filter(|tier| tier.is_active))
    }

    async fn tier_in(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        membership_id: &str,
    ) -> EngineResult<Membership> {
        let tier = uow
            .memberships()
            .get_by_id(membership_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Membership", membership_id))?;

        if tier.pharmacy_id != pharmacy_id {
            return Err(EngineError::forbidden("Membership", membership_id));
        }
        Ok(tier)
    }
}
