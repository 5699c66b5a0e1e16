//! # Referral & Loyalty Points Engine
//!
//! Customer provisioning, referral attribution and the points ledger.
//!
//! ## Ledger Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Points Ledger                                    │
//! │                                                                         │
//! │  order created  ──► apply_points_redeem ──► balance −N, row "redeem"    │
//! │                                                                         │
//! │  order completed ─► on_order_completed                                  │
//! │                      ├── customer  +P, row "earn_purchase"              │
//! │                      └── first completed order of a referred customer:  │
//! │                          referrer  +R, row "earn_referral"              │
//! │                                                                         │
//! │  Every balance change writes exactly one ledger row, in the same        │
//! │  unit of work as the balance update.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A pharmacy without a [`ReferralPointsConfig`] has loyalty switched off:
//! nothing is earned, nothing can be redeemed, and order preparation
//! resolves no customer.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use dispensa_core::loyalty::{
    normalize_referral_code, referral_code_from_indices, RedeemQuote, REFERRAL_CODE_ALPHABET,
    REFERRAL_CODE_LENGTH,
};
use dispensa_core::validation::{
    non_blank, validate_phone, validate_rate, validate_referral_rates, validate_required,
};
use dispensa_core::{
    CoreError, Customer, Money, Order, OrderStatus, PointsTransaction, PointsTransactionKind,
    ReferralPointsConfig, StaffPointsConfig, StaffPointsTransaction, ValidationError,
};
use dispensa_db::{Database, UnitOfWork};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Inputs & Outputs
// =============================================================================

/// Customer loyalty rates as submitted by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRates {
    pub points_per_currency_unit: i64,
    pub currency_unit_for_points_cents: i64,
    pub referral_reward_points: i64,
    pub redemption_rate_points: i64,
    pub redemption_rate_currency_cents: i64,
    /// 0 = uncapped.
    #[serde(default)]
    pub max_redeem_per_order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffRates {
    pub points_per_currency_unit: i64,
    pub currency_unit_for_points_cents: i64,
}

/// Loyalty-relevant fields of an order request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoyaltyRequest<'a> {
    pub name: &'a str,
    pub phone: Option<&'a str>,
    pub email: Option<&'a str>,
    pub referral_code: Option<&'a str>,
    pub points_to_redeem: Option<i64>,
}

/// What the order pipeline needs from loyalty before pricing.
#[derive(Debug, Clone, Default)]
pub struct LoyaltyPreparation {
    pub customer: Option<Customer>,
    /// Normalised code, set only when it resolved to another customer.
    pub referral_code_used: Option<String>,
    pub points_redeemed: i64,
    pub points_discount: Money,
}

/// Points handed out when an order completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionRewards {
    pub purchase_points: i64,
    pub referral_points: i64,
    pub referrer_id: Option<String>,
}

// =============================================================================
// Loyalty Engine
// =============================================================================

#[derive(Debug, Clone)]
pub struct LoyaltyEngine {
    db: Database,
    referral_code_attempts: u32,
}

impl LoyaltyEngine {
    pub fn new(db: Database, referral_code_attempts: u32) -> Self {
        LoyaltyEngine {
            db,
            referral_code_attempts,
        }
    }

    /// A random 8-symbol code from the unambiguous alphabet.
    pub fn generate_referral_code() -> String {
        let mut rng = rand::thread_rng();
        referral_code_from_indices(
            (0..REFERRAL_CODE_LENGTH).map(|_| rng.gen_range(0..REFERRAL_CODE_ALPHABET.len())),
        )
    }

    async fn unused_referral_code(uow: &mut UnitOfWork, attempts: u32) -> EngineResult<String> {
        for attempt in 1..=attempts {
            let code = Self::generate_referral_code();
            if !uow.customers().referral_code_taken(&code).await? {
                return Ok(code);
            }
            debug!(attempt, "Referral code collision, retrying");
        }

        warn!(attempts, "Could not generate a unique referral code");
        Err(EngineError::Internal(format!(
            "Could not generate a unique referral code after {} attempts",
            attempts
        )))
    }

    // =========================================================================
    // Customers
    // =========================================================================

    /// Finds the pharmacy's customer by phone, or creates one.
    ///
    /// A hit refreshes name and email (a missing email never clears the
    /// stored one) and backfills a missing referral code.
    pub async fn get_or_create_customer(
        &self,
        pharmacy_id: &str,
        name: &str,
        phone: &str,
        email: Option<&str>,
    ) -> EngineResult<Customer> {
        let mut uow = self.db.begin().await?;
        let customer = Self::get_or_create_customer_in(
            &mut uow,
            pharmacy_id,
            name,
            phone,
            email,
            self.referral_code_attempts,
        )
        .await?;
        uow.commit().await?;
        Ok(customer)
    }

    pub(crate) async fn get_or_create_customer_in(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        name: &str,
        phone: &str,
        email: Option<&str>,
        attempts: u32,
    ) -> EngineResult<Customer> {
        let phone = validate_phone(phone)?;
        let name = validate_required("customer_name", name, 200)?;
        let email = non_blank(email);

        if let Some(existing) = uow.customers().get_by_phone(pharmacy_id, &phone).await? {
            uow.customers()
                .update_contact(&existing.id, &name, email.as_deref())
                .await?;

            if existing.referral_code.is_none() {
                let code = Self::unused_referral_code(uow, attempts).await?;
                uow.customers().set_referral_code(&existing.id, &code).await?;
                debug!(customer_id = %existing.id, "Backfilled referral code");
            }

            return uow
                .customers()
                .get_by_id(&existing.id)
                .await?
                .ok_or_else(|| EngineError::not_found("Customer", existing.id));
        }

        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            pharmacy_id: pharmacy_id.to_string(),
            name,
            phone,
            email,
            referral_code: Some(Self::unused_referral_code(uow, attempts).await?),
            points_balance: 0,
            referred_by_id: None,
            created_at: now,
            updated_at: now,
        };

        uow.customers().insert(&customer).await?;
        info!(customer_id = %customer.id, pharmacy_id = %pharmacy_id, "Customer created");

        Ok(customer)
    }

    pub async fn get_customer(&self, pharmacy_id: &str, customer_id: &str) -> EngineResult<Customer> {
        let mut uow = self.db.begin_read().await?;
        Self::customer_in(&mut uow, pharmacy_id, customer_id).await
    }

    pub async fn find_by_phone(
        &self,
        pharmacy_id: &str,
        phone: &str,
    ) -> EngineResult<Option<Customer>> {
        let phone = validate_phone(phone)?;
        let mut uow = self.db.begin_read().await?;
        Ok(uow.customers().get_by_phone(pharmacy_id, &phone).await?)
    }

    pub(crate) async fn customer_in(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        customer_id: &str,
    ) -> EngineResult<Customer> {
        let customer = uow
            .customers()
            .get_by_id(customer_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Customer", customer_id))?;

        if customer.pharmacy_id != pharmacy_id {
            return Err(EngineError::forbidden("Customer", customer_id));
        }
        Ok(customer)
    }

    // =========================================================================
    // Referrals
    // =========================================================================

    /// Attaches the owner of `referral_code` as `customer_id`'s referrer.
    ///
    /// Idempotent: once a referrer is recorded it never changes.
    pub async fn attach_referral(
        &self,
        pharmacy_id: &str,
        customer_id: &str,
        referral_code: &str,
    ) -> EngineResult<Customer> {
        let mut uow = self.db.begin().await?;
        let customer = Self::customer_in(&mut uow, pharmacy_id, customer_id).await?;

        Self::attach_referral_in(&mut uow, &customer, Some(referral_code)).await?;

        let customer = Self::customer_in(&mut uow, pharmacy_id, customer_id).await?;
        uow.commit().await?;
        Ok(customer)
    }

    /// Returns the normalised code when it belongs to another customer of
    /// the same pharmacy. Unknown codes and self-referrals are ignored.
    pub(crate) async fn attach_referral_in(
        uow: &mut UnitOfWork,
        customer: &Customer,
        referral_code: Option<&str>,
    ) -> EngineResult<Option<String>> {
        let Some(code) = non_blank(referral_code).map(|c| normalize_referral_code(&c)) else {
            return Ok(None);
        };

        let Some(referrer) = uow
            .customers()
            .get_by_referral_code(&customer.pharmacy_id, &code)
            .await?
        else {
            debug!(code = %code, "Unknown referral code ignored");
            return Ok(None);
        };

        if referrer.id == customer.id {
            debug!(customer_id = %customer.id, "Self-referral ignored");
            return Ok(None);
        }

        if uow
            .customers()
            .set_referred_by_if_unset(&customer.id, &referrer.id)
            .await?
        {
            info!(customer_id = %customer.id, referrer_id = %referrer.id, "Referral attached");
        } else {
            debug!(customer_id = %customer.id, "Referrer already recorded");
        }

        Ok(Some(code))
    }

    // =========================================================================
    // Redemption
    // =========================================================================

    /// Previews how many points `customer_id` would spend and the discount
    /// they buy against `subtotal`. Never writes.
    pub async fn compute_redeem_discount(
        &self,
        pharmacy_id: &str,
        customer_id: &str,
        points_requested: i64,
        subtotal: Money,
    ) -> EngineResult<RedeemQuote> {
        let mut uow = self.db.begin_read().await?;
        Self::compute_redeem_discount_in(&mut uow, pharmacy_id, customer_id, points_requested, subtotal)
            .await
    }

    pub(crate) async fn compute_redeem_discount_in(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        customer_id: &str,
        points_requested: i64,
        subtotal: Money,
    ) -> EngineResult<RedeemQuote> {
        if points_requested <= 0 {
            return Ok(RedeemQuote::none());
        }

        let Some(config) = uow.loyalty().get_referral_config(pharmacy_id).await? else {
            return Ok(RedeemQuote::none());
        };

        let customer = Self::customer_in(uow, pharmacy_id, customer_id).await?;
        Ok(config.quote_redemption(customer.points_balance, points_requested, subtotal))
    }

    /// Resolves the customer, referral and points discount for a new order.
    pub async fn prepare_order_referral_and_points(
        &self,
        pharmacy_id: &str,
        request: LoyaltyRequest<'_>,
        subtotal: Money,
    ) -> EngineResult<LoyaltyPreparation> {
        let mut uow = self.db.begin().await?;
        let prepared = Self::prepare_order_referral_and_points_in(
            &mut uow,
            pharmacy_id,
            request,
            subtotal,
            self.referral_code_attempts,
        )
        .await?;
        uow.commit().await?;
        Ok(prepared)
    }

    pub(crate) async fn prepare_order_referral_and_points_in(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        request: LoyaltyRequest<'_>,
        subtotal: Money,
        attempts: u32,
    ) -> EngineResult<LoyaltyPreparation> {
        let Some(config) = uow.loyalty().get_referral_config(pharmacy_id).await? else {
            return Ok(LoyaltyPreparation::default());
        };

        let points_requested = request.points_to_redeem.unwrap_or(0);

        let Some(phone) = non_blank(request.phone) else {
            if points_requested > 0 {
                return Err(ValidationError::required("phone").into());
            }
            return Ok(LoyaltyPreparation::default());
        };

        let customer = Self::get_or_create_customer_in(
            uow,
            pharmacy_id,
            request.name,
            &phone,
            request.email,
            attempts,
        )
        .await?;

        let referral_code_used = Self::attach_referral_in(uow, &customer, request.referral_code).await?;
        let quote = config.quote_redemption(customer.points_balance, points_requested, subtotal);

        debug!(
            customer_id = %customer.id,
            points = quote.points,
            discount = %quote.discount,
            "Loyalty prepared"
        );

        Ok(LoyaltyPreparation {
            customer: Some(customer),
            referral_code_used,
            points_redeemed: quote.points,
            points_discount: quote.discount,
        })
    }

    /// Debits `points` for an existing order. An order can be redeemed
    /// against once.
    pub async fn apply_points_redeem(
        &self,
        pharmacy_id: &str,
        order_id: &str,
        customer_id: &str,
        points: i64,
    ) -> EngineResult<()> {
        let mut uow = self.db.begin().await?;

        let order = uow
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;
        if order.pharmacy_id != pharmacy_id {
            return Err(EngineError::forbidden("Order", order_id));
        }
        Self::customer_in(&mut uow, pharmacy_id, customer_id).await?;

        let already_redeemed = uow
            .loyalty()
            .list_transactions(customer_id)
            .await?
            .iter()
            .any(|tx| tx.kind == PointsTransactionKind::Redeem && tx.order_id.as_deref() == Some(order_id));
        if already_redeemed {
            return Err(EngineError::conflict(format!(
                "Points already redeemed for order {}",
                order_id
            )));
        }

        Self::apply_points_redeem_in(&mut uow, pharmacy_id, order_id, customer_id, points).await?;
        uow.commit().await?;
        Ok(())
    }

    pub(crate) async fn apply_points_redeem_in(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        order_id: &str,
        customer_id: &str,
        points: i64,
    ) -> EngineResult<()> {
        if points <= 0 {
            return Err(ValidationError::must_be_positive("points").into());
        }

        if !uow.customers().debit_points(customer_id, points).await? {
            let available = uow
                .customers()
                .get_by_id(customer_id)
                .await?
                .map(|c| c.points_balance)
                .ok_or_else(|| EngineError::not_found("Customer", customer_id))?;
            return Err(CoreError::InsufficientPoints {
                available,
                requested: points,
            }
            .into());
        }

        uow.loyalty()
            .insert_transaction(&PointsTransaction {
                id: Uuid::new_v4().to_string(),
                pharmacy_id: pharmacy_id.to_string(),
                customer_id: customer_id.to_string(),
                amount: -points,
                kind: PointsTransactionKind::Redeem,
                order_id: Some(order_id.to_string()),
                referred_customer_id: None,
                description: format!("Redeemed on order {}", order_id),
                created_at: Utc::now(),
            })
            .await?;

        info!(customer_id = %customer_id, order_id = %order_id, points, "Points redeemed");
        Ok(())
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Awards purchase points and, on a referred customer's first completed
    /// order, the referral reward.
    ///
    /// Must run in the unit of work that moved the order into `completed`,
    /// after the status write.
    pub(crate) async fn on_order_completed_in(
        uow: &mut UnitOfWork,
        order: &Order,
    ) -> EngineResult<CompletionRewards> {
        let Some(config) = uow.loyalty().get_referral_config(&order.pharmacy_id).await? else {
            return Ok(CompletionRewards::default());
        };
        let Some(customer_id) = order.customer_id.as_deref() else {
            return Ok(CompletionRewards::default());
        };

        let mut rewards = CompletionRewards::default();
        let now = Utc::now();

        let purchase_points = config.purchase_points(order.total());
        if purchase_points > 0 {
            uow.customers().credit_points(customer_id, purchase_points).await?;
            uow.loyalty()
                .insert_transaction(&PointsTransaction {
                    id: Uuid::new_v4().to_string(),
                    pharmacy_id: order.pharmacy_id.clone(),
                    customer_id: customer_id.to_string(),
                    amount: purchase_points,
                    kind: PointsTransactionKind::EarnPurchase,
                    order_id: Some(order.id.clone()),
                    referred_customer_id: None,
                    description: format!("Earned on order {}", order.id),
                    created_at: now,
                })
                .await?;
            rewards.purchase_points = purchase_points;
        }

        if order.referral_code_used.is_some() && config.referral_reward_points > 0 {
            let completed = uow
                .orders()
                .count_by_customer_and_status(&order.pharmacy_id, customer_id, OrderStatus::Completed)
                .await?;

            let referrer_id = uow
                .customers()
                .get_by_id(customer_id)
                .await?
                .and_then(|c| c.referred_by_id);

            if let (1, Some(referrer_id)) = (completed, referrer_id) {
                uow.customers()
                    .credit_points(&referrer_id, config.referral_reward_points)
                    .await?;
                uow.loyalty()
                    .insert_transaction(&PointsTransaction {
                        id: Uuid::new_v4().to_string(),
                        pharmacy_id: order.pharmacy_id.clone(),
                        customer_id: referrer_id.clone(),
                        amount: config.referral_reward_points,
                        kind: PointsTransactionKind::EarnReferral,
                        order_id: Some(order.id.clone()),
                        referred_customer_id: Some(customer_id.to_string()),
                        description: format!("Referral reward for customer {}", customer_id),
                        created_at: now,
                    })
                    .await?;

                info!(referrer_id = %referrer_id, referred_id = %customer_id, "Referral rewarded");
                rewards.referral_points = config.referral_reward_points;
                rewards.referrer_id = Some(referrer_id);
            }
        }

        Ok(rewards)
    }

    /// Credits the order's creator; 0 when staff points are not configured.
    pub(crate) async fn award_staff_points_in(uow: &mut UnitOfWork, order: &Order) -> EngineResult<i64> {
        let Some(config) = uow.loyalty().get_staff_config(&order.pharmacy_id).await? else {
            return Ok(0);
        };

        let points = config.points_for(order.total());
        if points <= 0 {
            return Ok(0);
        }

        uow.loyalty()
            .insert_staff_transaction(&StaffPointsTransaction {
                id: Uuid::new_v4().to_string(),
                pharmacy_id: order.pharmacy_id.clone(),
                user_id: order.created_by.clone(),
                order_id: order.id.clone(),
                amount: points,
                created_at: Utc::now(),
            })
            .await?;

        info!(user_id = %order.created_by, order_id = %order.id, points, "Staff points awarded");
        Ok(points)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub async fn set_referral_config(
        &self,
        pharmacy_id: &str,
        rates: ReferralRates,
    ) -> EngineResult<ReferralPointsConfig> {
        validate_referral_rates(
            rates.points_per_currency_unit,
            rates.currency_unit_for_points_cents,
            rates.referral_reward_points,
            rates.redemption_rate_points,
            rates.redemption_rate_currency_cents,
            rates.max_redeem_per_order,
        )?;

        let config = ReferralPointsConfig {
            pharmacy_id: pharmacy_id.to_string(),
            points_per_currency_unit: rates.points_per_currency_unit,
            currency_unit_for_points_cents: rates.currency_unit_for_points_cents,
            referral_reward_points: rates.referral_reward_points,
            redemption_rate_points: rates.redemption_rate_points,
            redemption_rate_currency_cents: rates.redemption_rate_currency_cents,
            max_redeem_per_order: rates.max_redeem_per_order,
            updated_at: Utc::now(),
        };

        let mut uow = self.db.begin().await?;
        uow.loyalty().upsert_referral_config(&config).await?;
        uow.commit().await?;

        info!(pharmacy_id = %pharmacy_id, "Referral points config saved");
        Ok(config)
    }

    pub async fn referral_config(&self, pharmacy_id: &str) -> EngineResult<Option<ReferralPointsConfig>> {
        let mut uow = self.db.begin_read().await?;
        Ok(uow.loyalty().get_referral_config(pharmacy_id).await?)
    }

    pub async fn set_staff_config(
        &self,
        pharmacy_id: &str,
        rates: StaffRates,
    ) -> EngineResult<StaffPointsConfig> {
        validate_rate("points_per_currency_unit", rates.points_per_currency_unit)?;
        validate_rate("currency_unit_for_points", rates.currency_unit_for_points_cents)?;

        let config = StaffPointsConfig {
            pharmacy_id: pharmacy_id.to_string(),
            points_per_currency_unit: rates.points_per_currency_unit,
            currency_unit_for_points_cents: rates.currency_unit_for_points_cents,
            updated_at: Utc::now(),
        };

        let mut uow = self.db.begin().await?;
        uow.loyalty().upsert_staff_config(&config).await?;
        uow.commit().await?;

        info!(pharmacy_id = %pharmacy_id, "Staff points config saved");
        Ok(config)
    }

    pub async fn staff_config(&self, pharmacy_id: &str) -> EngineResult<Option<StaffPointsConfig>> {
        let mut uow = self.db.begin_read().await?;
        Ok(uow.loyalty().get_staff_config(pharmacy_id).await?)
    }

    // =========================================================================
    // Ledgers
    // =========================================================================

    /// The customer's ledger, newest first.
    pub async fn points_history(
        &self,
        pharmacy_id: &str,
        customer_id: &str,
    ) -> EngineResult<Vec<PointsTransaction>> {
        let mut uow = self.db.begin_read().await?;
        Self::customer_in(&mut uow, pharmacy_id, customer_id).await?;
        Ok(uow.loyalty().list_transactions(customer_id).await?)
    }

    pub async fn staff_points_balance(&self, pharmacy_id: &str, user_id: &str) -> EngineResult<i64> {
        let mut uow = self.db.begin_read().await?;
        Ok(uow.loyalty().staff_balance(pharmacy_id, user_id).await?)
    }

    pub async fn staff_points_history(
        &self,
        pharmacy_id: &str,
        user_id: &str,
    ) -> EngineResult<Vec<StaffPointsTransaction>> {
        let mut uow = self.db.begin_read().await?;
        Ok(uow.loyalty().list_staff_transactions(pharmacy_id, user_id).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{self, OTHER_PHARMACY, PHARMACY};
    use dispensa_core::loyalty::is_well_formed_referral_code;

    #[test]
    fn test_generated_codes_are_well_formed() {
        for _ in 0..50 {
            let code = LoyaltyEngine::generate_referral_code();
            assert!(is_well_formed_referral_code(&code), "bad code {}", code);
        }
    }

    #[tokio::test]
    async fn test_get_or_create_customer() {
        let engine = testing::engine().await;
        let loyalty = engine.loyalty();

        let created = loyalty
            .get_or_create_customer(PHARMACY, "Sita", " 9800000001 ", Some("sita@example.com"))
            .await
            .unwrap();
        assert_eq!(created.phone, "9800000001");
        assert!(is_well_formed_referral_code(created.referral_code.as_deref().unwrap()));

        let again = loyalty
            .get_or_create_customer(PHARMACY, "Sita Sharma", "9800000001", None)
            .await
            .unwrap();
        assert_eq!(again.id, created.id);
        assert_eq!(again.name, "Sita Sharma");
        assert_eq!(again.email.as_deref(), Some("sita@example.com"));
        assert_eq!(again.referral_code, created.referral_code);

        // Phones are scoped per pharmacy
        let elsewhere = loyalty
            .get_or_create_customer(OTHER_PHARMACY, "Sita", "9800000001", None)
            .await
            .unwrap();
        assert_ne!(elsewhere.id, created.id);

        let err = loyalty.get_or_create_customer(PHARMACY, "Nobody", "  ", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_attach_referral_first_wins() {
        let engine = testing::engine().await;
        let loyalty = engine.loyalty();
        let ram = testing::customer(&engine, PHARMACY, "Ram", "9800000010", 0).await;
        let hari = testing::customer(&engine, PHARMACY, "Hari", "9800000011", 0).await;
        let gita = testing::customer(&engine, PHARMACY, "Gita", "9800000012", 0).await;

        let ram_code = ram.referral_code.clone().unwrap();
        let attached = loyalty
            .attach_referral(PHARMACY, &gita.id, &ram_code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(attached.referred_by_id.as_deref(), Some(ram.id.as_str()));

        // Same call again, then a different referrer: nothing changes
        loyalty.attach_referral(PHARMACY, &gita.id, &ram_code).await.unwrap();
        let after = loyalty
            .attach_referral(PHARMACY, &gita.id, hari.referral_code.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(after.referred_by_id.as_deref(), Some(ram.id.as_str()));

        // Self-referral and unknown codes are ignored
        let own = loyalty
            .attach_referral(PHARMACY, &hari.id, hari.referral_code.as_deref().unwrap())
            .await
            .unwrap();
        assert!(own.referred_by_id.is_none());
        let unknown = loyalty.attach_referral(PHARMACY, &hari.id, "ZZZZZZZZ").await.unwrap();
        assert!(unknown.referred_by_id.is_none());
    }

    #[tokio::test]
    async fn test_redeem_preview_rounds_to_rate() {
        let engine = testing::engine().await;
        testing::referral_config(&engine, PHARMACY).await;
        let customer = testing::customer(&engine, PHARMACY, "Maya", "9800000020", 150).await;

        let quote = engine
            .loyalty()
            .compute_redeem_discount(PHARMACY, &customer.id, 120, Money::from_cents(50_000))
            .await
            .unwrap();

        assert_eq!(quote.discount, Money::from_cents(1_000));
        assert_eq!(quote.points, 100);
    }

    #[tokio::test]
    async fn test_redeem_preview_without_config_or_points() {
        let engine = testing::engine().await;
        let customer = testing::customer(&engine, PHARMACY, "Maya", "9800000020", 150).await;
        let loyalty = engine.loyalty();

        let quote = loyalty
            .compute_redeem_discount(PHARMACY, &customer.id, 120, Money::from_cents(50_000))
            .await
            .unwrap();
        assert!(quote.is_empty());

        testing::referral_config(&engine, PHARMACY).await;
        let quote = loyalty
            .compute_redeem_discount(PHARMACY, &customer.id, 0, Money::from_cents(50_000))
            .await
            .unwrap();
        assert!(quote.is_empty());
    }

    #[tokio::test]
    async fn test_prepare_without_config_is_empty() {
        let engine = testing::engine().await;
        let prepared = engine
            .loyalty()
            .prepare_order_referral_and_points(
                PHARMACY,
                LoyaltyRequest {
                    name: "Walk-in",
                    phone: Some("9800000030"),
                    points_to_redeem: Some(100),
                    ..Default::default()
                },
                Money::from_cents(10_000),
            )
            .await
            .unwrap();

        assert!(prepared.customer.is_none());
        assert_eq!(prepared.points_redeemed, 0);
        assert!(engine.loyalty().find_by_phone(PHARMACY, "9800000030").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prepare_resolves_customer_and_referral() {
        let engine = testing::engine().await;
        testing::referral_config(&engine, PHARMACY).await;
        let referrer = testing::customer(&engine, PHARMACY, "Ram", "9800000040", 0).await;

        let prepared = engine
            .loyalty()
            .prepare_order_referral_and_points(
                PHARMACY,
                LoyaltyRequest {
                    name: "New Customer",
                    phone: Some("9800000041"),
                    referral_code: referrer.referral_code.as_deref(),
                    ..Default::default()
                },
                Money::from_cents(10_000),
            )
            .await
            .unwrap();

        let customer = prepared.customer.unwrap();
        assert_eq!(customer.referred_by_id.as_deref(), Some(referrer.id.as_str()));
        assert_eq!(prepared.referral_code_used, referrer.referral_code);
        assert_eq!(prepared.points_discount, Money::zero());
    }

    #[tokio::test]
    async fn test_points_without_phone_rejected() {
        let engine = testing::engine().await;
        testing::referral_config(&engine, PHARMACY).await;

        let err = engine
            .loyalty()
            .prepare_order_referral_and_points(
                PHARMACY,
                LoyaltyRequest {
                    name: "Walk-in",
                    points_to_redeem: Some(50),
                    ..Default::default()
                },
                Money::from_cents(10_000),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_apply_points_redeem_once() {
        let engine = testing::engine().await;
        testing::referral_config(&engine, PHARMACY).await;
        let product = testing::product(&engine, PHARMACY, "Vitamin C", 500, 10).await;
        let customer = testing::customer(&engine, PHARMACY, "Maya", "9800000050", 300).await;

        let order = engine
            .orders()
            .create(PHARMACY, "staff-1", testing::order_request(&[(&product.id, 1)]))
            .await
            .unwrap()
            .order;

        let loyalty = engine.loyalty();
        loyalty.apply_points_redeem(PHARMACY, &order.id, &customer.id, 200).await.unwrap();
        assert_eq!(loyalty.get_customer(PHARMACY, &customer.id).await.unwrap().points_balance, 100);

        let err = loyalty
            .apply_points_redeem(PHARMACY, &order.id, &customer.id, 50)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // Opening balance row plus the redemption, newest first
        let history = loyalty.points_history(PHARMACY, &customer.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, -200);
        assert_eq!(history[0].kind, PointsTransactionKind::Redeem);
    }

    #[tokio::test]
    async fn test_apply_points_redeem_insufficient() {
        let engine = testing::engine().await;
        let product = testing::product(&engine, PHARMACY, "Vitamin C", 500, 10).await;
        let customer = testing::customer(&engine, PHARMACY, "Maya", "9800000051", 40).await;
        let order = engine
            .orders()
            .create(PHARMACY, "staff-1", testing::order_request(&[(&product.id, 1)]))
            .await
            .unwrap()
            .order;

        let err = engine
            .loyalty()
            .apply_points_redeem(PHARMACY, &order.id, &customer.id, 100)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(CoreError::InsufficientPoints { available: 40, requested: 100 })
        ));
        let history = engine.loyalty().points_history(PHARMACY, &customer.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(engine.loyalty().get_customer(PHARMACY, &customer.id).await.unwrap().points_balance, 40);
    }

    #[tokio::test]
    async fn test_config_validation() {
        let engine = testing::engine().await;
        let loyalty = engine.loyalty();

        let mut rates = testing::REFERRAL_RATES;
        rates.redemption_rate_points = 0;
        let err = loyalty.set_referral_config(PHARMACY, rates).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(loyalty.referral_config(PHARMACY).await.unwrap().is_none());

        loyalty.set_referral_config(PHARMACY, testing::REFERRAL_RATES).await.unwrap();
        let stored = loyalty.referral_config(PHARMACY).await.unwrap().unwrap();
        assert_eq!(stored.redemption_rate_points, 100);

        let err = loyalty
            .set_staff_config(
                PHARMACY,
                StaffRates {
                    points_per_currency_unit: 1,
                    currency_unit_for_points_cents: 0,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(loyalty.staff_config(PHARMACY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_customer_scoping() {
        let engine = testing::engine().await;
        let customer = testing::customer(&engine, PHARMACY, "Maya", "9800000060", 0).await;

        let err = engine.loyalty().get_customer(OTHER_PHARMACY, &customer.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = engine.loyalty().get_customer(PHARMACY, "missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
