//! # Promo Code Validator
//!
//! Looks up a pharmacy's promo code, gathers what the rules need (current
//! time, the acting user's order count) and lets
//! [`PromoCode::evaluate`](dispensa_core::PromoCode::evaluate) decide.
//!
//! Validation never writes. The order pipeline bumps `used_count` after the
//! order row exists, in the same unit of work, with a guarded update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use dispensa_core::promo::{normalize_code, OrderHistory};
use dispensa_core::validation::{
    non_blank, validate_price_cents, validate_promo_code, validate_promo_terms,
};
use dispensa_core::{DiscountType, Money, Percentage, PromoCode, PromoRejection, ValidationError};
use dispensa_db::{Database, UnitOfWork};

use crate::error::{EngineError, EngineResult};

/// An accepted code and the discount it grants on the given subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoValidation {
    pub promo_code_id: String,
    pub discount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPromoCode {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    /// Basis points for `Percent` (`1000` is 10%), minor units for
    /// `Fixed`. [`NewPromoCode::percent_off`] takes whole percents.
    pub discount_value: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// 0 = unlimited.
    #[serde(default)]
    pub max_uses: i64,
    #[serde(default)]
    pub min_order_amount_cents: i64,
    #[serde(default)]
    pub first_order_only: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewPromoCode {
    /// An active, unlimited code taking `percent` whole percent off.
    pub fn percent_off(
        code: impl Into<String>,
        percent: u32,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Self::with_value(
            code.into(),
            DiscountType::Percent,
            i64::from(Percentage::from_percent(percent).bps()),
            valid_from,
            valid_until,
        )
    }

    /// An active, unlimited code taking a fixed amount off.
    pub fn amount_off(
        code: impl Into<String>,
        amount: Money,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Self::with_value(code.into(), DiscountType::Fixed, amount.cents(), valid_from, valid_until)
    }

    fn with_value(
        code: String,
        discount_type: DiscountType,
        discount_value: i64,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        NewPromoCode {
            code,
            description: None,
            discount_type,
            discount_value,
            valid_from,
            valid_until,
            max_uses: 0,
            min_order_amount_cents: 0,
            first_order_only: false,
            is_active: true,
        }
    }
}

/// Partial promo edit; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCodeUpdate {
    pub code: Option<String>,
    pub description: Option<Option<String>>,
    pub discount_type: Option<DiscountType>,
    /// Same units as [`NewPromoCode::discount_value`].
    pub discount_value: Option<i64>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub min_order_amount_cents: Option<i64>,
    pub first_order_only: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct PromoValidator {
    db: Database,
}

impl PromoValidator {
    pub fn new(db: Database) -> Self {
        PromoValidator { db }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Checks `code` against `subtotal` for the acting `user_id`.
    ///
    /// Safe to call repeatedly, e.g. for a live checkout preview.
    pub async fn validate(
        &self,
        pharmacy_id: &str,
        code: &str,
        subtotal: Money,
        user_id: Option<&str>,
    ) -> EngineResult<PromoValidation> {
        let mut uow = self.db.begin_read().await?;
        let (promo, discount) =
            Self::validate_in(&mut uow, pharmacy_id, code, subtotal, user_id, Utc::now()).await?;

        Ok(PromoValidation {
            promo_code_id: promo.id,
            discount,
        })
    }

    pub(crate) async fn validate_in(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        code: &str,
        subtotal: Money,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> EngineResult<(PromoCode, Money)> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(ValidationError::required("promo_code").into());
        }

        let promo = uow
            .promo_codes()
            .get_by_code(pharmacy_id, &code)
            .await?
            .ok_or(PromoRejection::UnknownCode { code: code.clone() })?;

        let history = match non_blank(user_id) {
            Some(user) if promo.first_order_only => {
                OrderHistory::PriorOrders(uow.orders().count_by_creator(pharmacy_id, &user).await?)
            }
            _ => OrderHistory::Anonymous,
        };

        let discount = promo.evaluate(now, subtotal, history)?;
        debug!(code = %code, discount = %discount, "Promo code accepted");

        Ok((promo, discount))
    }

    // =========================================================================
    // Management
    // =========================================================================

    pub async fn create(&self, pharmacy_id: &str, input: NewPromoCode) -> EngineResult<PromoCode> {
        let code = validate_promo_code(&input.code)?;
        validate_promo_terms(
            input.discount_type,
            input.discount_value,
            input.valid_from,
            input.valid_until,
        )?;
        validate_limits(input.max_uses, input.min_order_amount_cents)?;

        let mut uow = self.db.begin().await?;

        if uow.promo_codes().get_by_code(pharmacy_id, &code).await?.is_some() {
            return Err(EngineError::conflict(format!(
                "Promo code {} already exists",
                code
            )));
        }

        let now = Utc::now();
        let promo = PromoCode {
            id: Uuid::new_v4().to_string(),
            pharmacy_id: pharmacy_id.to_string(),
            code,
            description: non_blank(input.description.as_deref()),
            discount_type: input.discount_type,
            discount_value: input.discount_value,
            valid_from: input.valid_from,
            valid_until: input.valid_until,
            max_uses: input.max_uses,
            used_count: 0,
            min_order_amount_cents: input.min_order_amount_cents,
            first_order_only: input.first_order_only,
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
        };

        uow.promo_codes().insert(&promo).await?;
        uow.commit().await?;

        info!(promo_id = %promo.id, code = %promo.code, "Promo code created");
        Ok(promo)
    }

    /// Applies `update` with the same rules as [`create`](Self::create).
    /// The usage counter is never touched here.
    pub async fn update(
        &self,
        pharmacy_id: &str,
        promo_id: &str,
        update: PromoCodeUpdate,
    ) -> EngineResult<PromoCode> {
        let mut uow = self.db.begin().await?;
        let mut promo = Self::promo_in(&mut uow, pharmacy_id, promo_id).await?;

        if let Some(code) = update.code {
            let code = validate_promo_code(&code)?;
            if code != promo.code {
                if let Some(existing) = uow.promo_codes().get_by_code(pharmacy_id, &code).await? {
                    if existing.id != promo.id {
                        return Err(EngineError::conflict(format!(
                            "Promo code {} already exists",
                            code
                        )));
                    }
                }
            }
            promo.code = code;
        }
        if let Some(description) = update.description {
            promo.description = non_blank(description.as_deref());
        }
        if let Some(discount_type) = update.discount_type {
            promo.discount_type = discount_type;
        }
        if let Some(value) = update.discount_value {
            promo.discount_value = value;
        }
        if let Some(from) = update.valid_from {
            promo.valid_from = from;
        }
        if let Some(until) = update.valid_until {
            promo.valid_until = until;
        }
        if let Some(max_uses) = update.max_uses {
            promo.max_uses = max_uses;
        }
        if let Some(min) = update.min_order_amount_cents {
            promo.min_order_amount_cents = min;
        }
        if let Some(first_only) = update.first_order_only {
            promo.first_order_only = first_only;
        }
        if let Some(active) = update.is_active {
            promo.is_active = active;
        }

        validate_promo_terms(
            promo.discount_type,
            promo.discount_value,
            promo.valid_from,
            promo.valid_until,
        )?;
        validate_limits(promo.max_uses, promo.min_order_amount_cents)?;
        if promo.max_uses > 0 && promo.max_uses < promo.used_count {
            return Err(ValidationError::OutOfRange {
                field: "max_uses".to_string(),
                min: promo.used_count,
                max: i64::MAX,
            }
            .into());
        }

        promo.updated_at = Utc::now();
        uow.promo_codes().update(&promo).await?;
        uow.commit().await?;

        info!(promo_id = %promo.id, code = %promo.code, "Promo code updated");
        Ok(promo)
    }

    pub async fn get(&self, pharmacy_id: &str, promo_id: &str) -> EngineResult<PromoCode> {
        let mut uow = self.db.begin_read().await?;
        Self::promo_in(&mut uow, pharmacy_id, promo_id).await
    }

    pub async fn list(&self, pharmacy_id: &str) -> EngineResult<Vec<PromoCode>> {
        let mut uow = self.db.begin_read().await?;
        Ok(uow.promo_codes().list_by_pharmacy(pharmacy_id).await?)
    }

    async fn promo_in(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        promo_id: &str,
    ) -> EngineResult<PromoCode> {
        let promo = uow
            .promo_codes()
            .get_by_id(promo_id)
            .await?
            .ok_or_else(|| EngineError::not_found("PromoCode", promo_id))?;

        if promo.pharmacy_id != pharmacy_id {
            return Err(EngineError::forbidden("PromoCode", promo_id));
        }
        Ok(promo)
    }
}

fn validate_limits(max_uses: i64, min_order_amount_cents: i64) -> Result<(), ValidationError> {
    if max_uses < 0 {
        return Err(ValidationError::OutOfRange {
            field: "max_uses".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    validate_price_cents("min_order_amount", min_order_amount_cents)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{self, OTHER_PHARMACY, PHARMACY};
    use chrono::Duration;

    fn new_code(code: &str) -> NewPromoCode {
        let now = Utc::now();
        NewPromoCode {
            code: code.to_string(),
            description: Some("Festival offer".into()),
            discount_type: DiscountType::Percent,
            discount_value: 1_000,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            max_uses: 0,
            min_order_amount_cents: 0,
            first_order_only: false,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_validate_is_case_insensitive_and_trimmed() {
        let engine = testing::engine().await;
        let promo = engine.promos().create(PHARMACY, new_code("dashain10")).await.unwrap();
        assert_eq!(promo.code, "DASHAIN10");

        let result = engine
            .promos()
            .validate(PHARMACY, "  Dashain10 ", Money::from_cents(25_000), None)
            .await
            .unwrap();

        assert_eq!(result.promo_code_id, promo.id);
        assert_eq!(result.discount, Money::from_cents(2_500));
    }

    #[tokio::test]
    async fn test_unknown_and_foreign_codes() {
        let engine = testing::engine().await;
        engine.promos().create(PHARMACY, new_code("LOCAL")).await.unwrap();

        let err = engine
            .promos()
            .validate(OTHER_PHARMACY, "LOCAL", Money::from_cents(1_000), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.promo_rejection(),
            Some(PromoRejection::UnknownCode { .. })
        ));
    }

    #[tokio::test]
    async fn test_max_uses_reached_after_increment() {
        let engine = testing::engine().await;
        let mut input = new_code("ONCE");
        input.max_uses = 1;
        let promo = engine.promos().create(PHARMACY, input).await.unwrap();

        let subtotal = Money::from_cents(10_000);
        engine.promos().validate(PHARMACY, "ONCE", subtotal, None).await.unwrap();
        // Validation alone never consumes a use
        engine.promos().validate(PHARMACY, "ONCE", subtotal, None).await.unwrap();

        let mut uow = engine.database().begin().await.unwrap();
        assert!(uow.promo_codes().increment_used_count(&promo.id).await.unwrap());
        uow.commit().await.unwrap();

        let err = engine.promos().validate(PHARMACY, "ONCE", subtotal, None).await.unwrap_err();
        assert_eq!(err.promo_rejection(), Some(&PromoRejection::MaxUsesReached));
        assert!(err.to_string().contains("maximum uses"));
    }

    #[tokio::test]
    async fn test_first_order_only() {
        let engine = testing::engine().await;
        let mut input = new_code("FIRST");
        input.first_order_only = true;
        engine.promos().create(PHARMACY, input).await.unwrap();
        let subtotal = Money::from_cents(10_000);

        let err = engine.promos().validate(PHARMACY, "FIRST", subtotal, None).await.unwrap_err();
        assert_eq!(err.promo_rejection(), Some(&PromoRejection::RequiresIdentifiedUser));

        engine.promos().validate(PHARMACY, "FIRST", subtotal, Some("staff-1")).await.unwrap();

        let product = testing::product(&engine, PHARMACY, "Cetirizine", 450, 10).await;
        engine
            .orders()
            .create(PHARMACY, "staff-1", testing::order_request(&[(&product.id, 1)]))
            .await
            .unwrap();

        let err = engine
            .promos()
            .validate(PHARMACY, "FIRST", subtotal, Some("staff-1"))
            .await
            .unwrap_err();
        assert_eq!(err.promo_rejection(), Some(&PromoRejection::NotFirstOrder));
    }

    #[tokio::test]
    async fn test_minimum_and_fixed_amounts() {
        let engine = testing::engine().await;
        let mut input = new_code("FLAT50");
        input.discount_type = DiscountType::Fixed;
        input.discount_value = 5_000;
        input.min_order_amount_cents = 20_000;
        engine.promos().create(PHARMACY, input).await.unwrap();

        let err = engine
            .promos()
            .validate(PHARMACY, "FLAT50", Money::from_cents(19_999), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.promo_rejection(),
            Some(PromoRejection::BelowMinimum { .. })
        ));

        let ok = engine
            .promos()
            .validate(PHARMACY, "FLAT50", Money::from_cents(20_000), None)
            .await
            .unwrap();
        assert_eq!(ok.discount, Money::from_cents(5_000));
    }

    #[tokio::test]
    async fn test_percent_off_takes_whole_percents() {
        let engine = testing::engine().await;
        let now = Utc::now();

        let ten = NewPromoCode::percent_off("TEN", 10, now - Duration::days(1), now + Duration::days(30));
        assert_eq!(ten.discount_type, DiscountType::Percent);
        assert_eq!(ten.discount_value, 1_000);
        engine.promos().create(PHARMACY, ten).await.unwrap();

        let ok = engine
            .promos()
            .validate(PHARMACY, "TEN", Money::from_cents(3_697), None)
            .await
            .unwrap();
        assert_eq!(ok.discount, Money::from_cents(370));

        let flat = NewPromoCode::amount_off(
            "FLAT",
            Money::from_cents(250),
            now - Duration::days(1),
            now + Duration::days(30),
        );
        assert_eq!(flat.discount_type, DiscountType::Fixed);
        assert_eq!(flat.discount_value, 250);
    }

    #[tokio::test]
    async fn test_create_rules() {
        let engine = testing::engine().await;
        engine.promos().create(PHARMACY, new_code("SAVE")).await.unwrap();

        let err = engine.promos().create(PHARMACY, new_code("save")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // Same code in another pharmacy is fine
        engine.promos().create(OTHER_PHARMACY, new_code("SAVE")).await.unwrap();

        let mut bad = new_code("ZERO");
        bad.discount_value = 0;
        assert_eq!(engine.promos().create(PHARMACY, bad).await.unwrap_err().kind(), ErrorKind::Validation);

        let mut bad = new_code("BACKWARDS");
        bad.valid_until = bad.valid_from;
        assert_eq!(engine.promos().create(PHARMACY, bad).await.unwrap_err().kind(), ErrorKind::Validation);

        let mut bad = new_code("   ");
        bad.code = "   ".into();
        assert_eq!(engine.promos().create(PHARMACY, bad).await.unwrap_err().kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_update() {
        let engine = testing::engine().await;
        let a = engine.promos().create(PHARMACY, new_code("AAA")).await.unwrap();
        engine.promos().create(PHARMACY, new_code("BBB")).await.unwrap();

        let err = engine
            .promos()
            .update(
                PHARMACY,
                &a.id,
                PromoCodeUpdate {
                    code: Some("bbb".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let updated = engine
            .promos()
            .update(
                PHARMACY,
                &a.id,
                PromoCodeUpdate {
                    discount_type: Some(DiscountType::Fixed),
                    discount_value: Some(750),
                    is_active: Some(false),
                    description: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.discount_type, DiscountType::Fixed);
        assert!(updated.description.is_none());

        let stored = engine.promos().get(PHARMACY, &a.id).await.unwrap();
        assert!(!stored.is_active);

        let err = engine.promos().validate(PHARMACY, "AAA", Money::from_cents(5_000), None).await.unwrap_err();
        assert_eq!(err.promo_rejection(), Some(&PromoRejection::Inactive));

        let err = engine.promos().get(OTHER_PHARMACY, &a.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(engine.promos().list(PHARMACY).await.unwrap().len(), 2);
    }
}
