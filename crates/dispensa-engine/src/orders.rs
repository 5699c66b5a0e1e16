//! # Order Pricing & Creation Pipeline
//!
//! Turns a checkout request into a priced, persisted order with its stock
//! deducted.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       OrderPipeline::create                             │
//! │                                                                         │
//! │  ── one unit of work ─────────────────────────────────────────────────  │
//! │   1. validate lines, products, stock, gateway      → subtotal           │
//! │   2. loyalty: customer, referral, points quote                          │
//! │   3. no loyalty customer but a phone: membership lookup (advisory)      │
//! │   4. membership discount                                                │
//! │   5. promo discount, or the manual discount when no promo code          │
//! │   6. points discount                                                    │
//! │   7. discount = min(subtotal, Σ), total = subtotal − discount           │
//! │   8. INSERT order, INSERT items                                         │
//! │   9. promo used_count += 1          (guarded on max_uses)               │
//! │  10. points debit + "redeem" row    (guarded on balance)                │
//! │  11. FEFO consumption per line      (guarded on batch and stock)        │
//! │  ── commit ───────────────────────────────────────────────────────────  │
//! │  12. mock payment (advisory)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failure in 1-11 rolls the whole unit of work back: no order, no
//! items, no promo use, no points spent, no stock moved.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use dispensa_core::pricing::{line_total, membership_discount, price_order, DiscountParts};
use dispensa_core::validation::{
    non_blank, validate_phone, validate_price_cents, validate_quantity, validate_required,
};
use dispensa_core::{
    CoreError, Membership, Money, Order, OrderItem, OrderStatus, Payment, Product, PromoCode,
    PromoRejection,
};
use dispensa_db::{Database, UnitOfWork};

use crate::advisory::{MEMBERSHIP_LOOKUP, MOCK_PAYMENT};
use crate::config::OrderSettings;
use crate::error::{EngineError, EngineResult};
use crate::inventory::InventoryAllocator;
use crate::loyalty::{LoyaltyEngine, LoyaltyRequest};
use crate::membership::MembershipService;
use crate::payments::PaymentService;
use crate::promo::PromoValidator;

// =============================================================================
// Request & Response
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: i64,
}

/// Checkout request.
///
/// `None` and an explicit zero differ for `discount_amount_cents`: only a
/// supplied amount is applied, and only when no promo code is given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer: CustomerInfo,
    pub items: Vec<OrderLine>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub discount_amount_cents: Option<i64>,
    #[serde(default)]
    pub promo_code: Option<String>,
    #[serde(default)]
    pub referral_code: Option<String>,
    #[serde(default)]
    pub points_to_redeem: Option<i64>,
    #[serde(default)]
    pub payment_gateway_id: Option<String>,
}

/// An order with its items, promo code and payments loaded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub promo_code: Option<PromoCode>,
    pub payments: Vec<Payment>,
}

// =============================================================================
// Pipeline
// =============================================================================

#[derive(Debug, Clone)]
pub struct OrderPipeline {
    db: Database,
    payments: PaymentService,
    settings: OrderSettings,
    referral_code_attempts: u32,
}

impl OrderPipeline {
    pub fn new(db: Database, settings: OrderSettings, referral_code_attempts: u32) -> Self {
        OrderPipeline {
            payments: PaymentService::new(db.clone()),
            db,
            settings,
            referral_code_attempts,
        }
    }

    /// Creates an order on behalf of staff member `created_by`.
    pub async fn create(
        &self,
        pharmacy_id: &str,
        created_by: &str,
        request: CreateOrderRequest,
    ) -> EngineResult<OrderDetails> {
        let created_by = validate_required("created_by", created_by, 100)?;
        let customer_name = validate_required("customer_name", &request.customer.name, 200)?;
        let customer_phone = non_blank(request.customer.phone.as_deref())
            .map(|phone| validate_phone(&phone))
            .transpose()?;
        let customer_email = non_blank(request.customer.email.as_deref());

        if request.items.is_empty() {
            return Err(CoreError::EmptyOrder.into());
        }
        if request.items.len() > self.settings.max_items_per_order {
            return Err(CoreError::TooManyItems {
                max: self.settings.max_items_per_order,
            }
            .into());
        }
        for line in &request.items {
            validate_quantity(line.quantity, self.settings.max_item_quantity)?;
        }

        let mut uow = self.db.begin().await?;

        // 1. Products, stock and subtotal
        let lines = Self::load_lines(&mut uow, pharmacy_id, &request.items).await?;
        let subtotal: Money = lines
            .iter()
            .map(|(product, quantity)| line_total(product.price(), *quantity))
            .sum();

        let payment_gateway_id = match non_blank(request.payment_gateway_id.as_deref()) {
            Some(gateway_id) => Self::resolve_gateway(&mut uow, pharmacy_id, gateway_id).await?,
            None => None,
        };

        // 2. Loyalty
        let loyalty = LoyaltyEngine::prepare_order_referral_and_points_in(
            &mut uow,
            pharmacy_id,
            LoyaltyRequest {
                name: &customer_name,
                phone: customer_phone.as_deref(),
                email: customer_email.as_deref(),
                referral_code: request.referral_code.as_deref(),
                points_to_redeem: request.points_to_redeem,
            },
            subtotal,
            self.referral_code_attempts,
        )
        .await?;

        // 3-4. Membership
        let membership = match (&loyalty.customer, &customer_phone) {
            (Some(customer), _) => {
                MembershipService::active_membership_in(&mut uow, &customer.id).await?
            }
            (None, Some(phone)) => MEMBERSHIP_LOOKUP
                .run(Self::membership_by_phone(&mut uow, pharmacy_id, phone))
                .await
                .flatten(),
            (None, None) => None,
        };
        let membership_part = membership_discount(subtotal, membership.as_ref());

        // 5. Promo or manual
        let (promo, promo_or_manual) = match non_blank(request.promo_code.as_deref()) {
            Some(code) => {
                let (promo, discount) = PromoValidator::validate_in(
                    &mut uow,
                    pharmacy_id,
                    &code,
                    subtotal,
                    Some(&created_by),
                    Utc::now(),
                )
                .await?;
                (Some(promo), discount)
            }
            None => match request.discount_amount_cents {
                Some(cents) => {
                    validate_price_cents("discount_amount", cents)?;
                    (None, Money::from_cents(cents))
                }
                None => (None, Money::zero()),
            },
        };

        // 6-7. Price
        let price = price_order(
            subtotal,
            DiscountParts {
                membership: membership_part,
                promo_or_manual,
                points: loyalty.points_discount,
            },
        );

        debug!(
            subtotal = %price.subtotal,
            membership = %membership_part,
            promo_or_manual = %promo_or_manual,
            points = %loyalty.points_discount,
            discount = %price.discount,
            total = %price.total,
            "Order priced"
        );

        // 8. Persist
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            pharmacy_id: pharmacy_id.to_string(),
            customer_id: loyalty.customer.as_ref().map(|c| c.id.clone()),
            customer_name,
            customer_phone,
            customer_email,
            status: OrderStatus::Pending,
            subtotal_cents: price.subtotal.cents(),
            discount_cents: price.discount.cents(),
            tax_cents: price.tax.cents(),
            total_cents: price.total.cents(),
            currency: self.settings.default_currency.clone(),
            promo_code_id: promo.as_ref().map(|p| p.id.clone()),
            referral_code_used: loyalty.referral_code_used.clone(),
            points_redeemed: loyalty.points_redeemed,
            payment_gateway_id,
            notes: non_blank(request.notes.as_deref()),
            created_by,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        uow.orders().insert(&order).await?;

        for (product, quantity) in &lines {
            let item = OrderItem {
                id: Uuid::new_v4().to_string(),
                order_id: order.id.clone(),
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                quantity: *quantity,
                unit_price_cents: product.price_cents,
                line_total_cents: line_total(product.price(), *quantity).cents(),
                created_at: now,
            };
            uow.orders().insert_item(&item).await?;
        }

        // 9. Promo usage
        if let Some(promo) = &promo {
            if !uow.promo_codes().increment_used_count(&promo.id).await? {
                return Err(PromoRejection::MaxUsesReached.into());
            }
        }

        // 10. Points
        if let (Some(customer), true) = (&loyalty.customer, loyalty.points_redeemed > 0) {
            LoyaltyEngine::apply_points_redeem_in(
                &mut uow,
                pharmacy_id,
                &order.id,
                &customer.id,
                loyalty.points_redeemed,
            )
            .await?;
        }

        // 11. Stock
        for (product, quantity) in &lines {
            InventoryAllocator::consume_in(&mut uow, pharmacy_id, &product.id, *quantity).await?;
        }

        uow.commit().await?;

        info!(
            order_id = %order.id,
            pharmacy_id = %pharmacy_id,
            items = lines.len(),
            total = %order.total(),
            "Order created"
        );

        // 12. Payment
        MOCK_PAYMENT.run(self.payments.record_mock_payment(&order)).await;

        self.get(pharmacy_id, &order.id).await
    }

    /// The gateway id to stamp on the order. An unknown or foreign gateway
    /// only costs the order its mock payment.
    async fn resolve_gateway(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        gateway_id: String,
    ) -> EngineResult<Option<String>> {
        match uow.payments().get_gateway(&gateway_id).await? {
            Some(gateway) if gateway.pharmacy_id == pharmacy_id => Ok(Some(gateway_id)),
            Some(_) => {
                warn!(pharmacy_id = %pharmacy_id, gateway_id = %gateway_id, "Gateway belongs to another pharmacy, order left without one");
                Ok(None)
            }
            None => {
                warn!(pharmacy_id = %pharmacy_id, gateway_id = %gateway_id, "Unknown gateway, order left without one");
                Ok(None)
            }
        }
    }

    /// Resolves every line's product and checks stock for the summed
    /// quantity of lines that repeat a product.
    async fn load_lines(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        items: &[OrderLine],
    ) -> EngineResult<Vec<(Product, i64)>> {
        let mut lines = Vec::with_capacity(items.len());
        let mut requested: HashMap<String, i64> = HashMap::new();

        for line in items {
            let product = InventoryAllocator::product_in(uow, pharmacy_id, &line.product_id).await?;

            let wanted = requested.entry(product.id.clone()).or_insert(0);
            *wanted += line.quantity;
            if !product.has_stock(*wanted) {
                return Err(CoreError::InsufficientStock {
                    product: product.name,
                    available: product.stock_quantity,
                    requested: *wanted,
                }
                .into());
            }

            lines.push((product, line.quantity));
        }

        Ok(lines)
    }

    async fn membership_by_phone(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        phone: &str,
    ) -> EngineResult<Option<Membership>> {
        match uow.customers().get_by_phone(pharmacy_id, phone).await? {
            Some(customer) => MembershipService::active_membership_in(uow, &customer.id).await,
            None => Ok(None),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get(&self, pharmacy_id: &str, order_id: &str) -> EngineResult<OrderDetails> {
        let mut uow = self.db.begin_read().await?;
        let order = Self::order_in(&mut uow, pharmacy_id, order_id).await?;

        let items = uow.orders().get_items(order_id).await?;
        let promo_code = match order.promo_code_id.as_deref() {
            Some(promo_id) => uow.promo_codes().get_by_id(promo_id).await?,
            None => None,
        };
        let payments = uow.payments().list_for_order(order_id).await?;

        Ok(OrderDetails {
            order,
            items,
            promo_code,
            payments,
        })
    }

    /// Newest first, optionally only the orders `created_by` created.
    pub async fn list(&self, pharmacy_id: &str, created_by: Option<&str>) -> EngineResult<Vec<Order>> {
        let created_by = non_blank(created_by);
        let mut uow = self.db.begin_read().await?;
        Ok(uow
            .orders()
            .list_by_pharmacy(pharmacy_id, created_by.as_deref())
            .await?)
    }

    pub(crate) async fn order_in(
        uow: &mut UnitOfWork,
        pharmacy_id: &str,
        order_id: &str,
    ) -> EngineResult<Order> {
        let order = uow
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;

        if order.pharmacy_id != pharmacy_id {
            return Err(EngineError::forbidden("Order", order_id));
        }
        Ok(order)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Engine;
    use crate::config::EngineConfig;
    use crate::error::ErrorKind;
    use crate::membership::NewMembership;
    use crate::testing::{self, date, OTHER_PHARMACY, PHARMACY};
    use dispensa_core::{DiscountType, PointsTransactionKind};

    #[tokio::test]
    async fn test_create_prices_and_persists() {
        let engine = testing::engine().await;
        let amox = testing::product(&engine, PHARMACY, "Amoxicillin", 1_250, 10).await;
        let ors = testing::product(&engine, PHARMACY, "ORS", 399, 10).await;
        testing::promo(&engine, PHARMACY, "SAVE10", DiscountType::Percent, 1_000, 0).await;

        let mut request = testing::order_request(&[(&amox.id, 2), (&ors.id, 3)]);
        request.promo_code = Some(" save10 ".into());
        request.notes = Some("Deliver after 5pm".into());

        let details = engine.orders().create(PHARMACY, "staff-1", request).await.unwrap();
        let order = &details.order;

        assert_eq!(order.subtotal_cents, 3_697);
        let line_sum: i64 = details.items.iter().map(|i| i.line_total_cents).sum();
        assert_eq!(order.subtotal_cents, line_sum);
        // 10% of 36.97 rounds half up
        assert_eq!(order.discount_cents, 370);
        assert_eq!(order.total_cents, 3_327);
        assert_eq!(order.tax_cents, 0);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.currency, "NPR");
        assert_eq!(details.promo_code.as_ref().unwrap().used_count, 1);
        assert_eq!(details.items.len(), 2);

        assert_eq!(testing::stock(&engine, &amox.id).await, 8);
        assert_eq!(testing::stock(&engine, &ors.id).await, 7);
    }

    #[tokio::test]
    async fn test_discount_never_exceeds_subtotal() {
        let engine = testing::engine().await;
        let product = testing::product(&engine, PHARMACY, "Antacid", 1_000, 10).await;

        let mut request = testing::order_request(&[(&product.id, 1)]);
        request.discount_amount_cents = Some(5_000);
        let order = engine.orders().create(PHARMACY, "staff-1", request).await.unwrap().order;

        assert_eq!(order.discount_cents, 1_000);
        assert_eq!(order.total_cents, 0);
    }

    #[tokio::test]
    async fn test_manual_discount_rules() {
        let engine = testing::engine().await;
        let product = testing::product(&engine, PHARMACY, "Antacid", 1_000, 10).await;
        testing::promo(&engine, PHARMACY, "FLAT2", DiscountType::Fixed, 200, 0).await;

        let mut request = testing::order_request(&[(&product.id, 1)]);
        request.discount_amount_cents = Some(-100);
        let err = engine.orders().create(PHARMACY, "staff-1", request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut request = testing::order_request(&[(&product.id, 1)]);
        request.discount_amount_cents = Some(300);
        let order = engine.orders().create(PHARMACY, "staff-1", request).await.unwrap().order;
        assert_eq!(order.discount_cents, 300);

        // With a promo code the manual amount is not consulted
        let mut request = testing::order_request(&[(&product.id, 1)]);
        request.discount_amount_cents = Some(300);
        request.promo_code = Some("FLAT2".into());
        let order = engine.orders().create(PHARMACY, "staff-1", request).await.unwrap().order;
        assert_eq!(order.discount_cents, 200);
    }

    #[tokio::test]
    async fn test_rejects_bad_requests() {
        let mut config = EngineConfig::default();
        config.orders.max_items_per_order = 2;
        let engine = testing::engine_with(config).await;
        let product = testing::product(&engine, PHARMACY, "Antacid", 1_000, 10).await;
        let foreign = testing::product(&engine, OTHER_PHARMACY, "Antacid", 1_000, 10).await;
        let orders = engine.orders();

        let err = orders.create(PHARMACY, "staff-1", testing::order_request::<&str>(&[])).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(CoreError::EmptyOrder)));

        let too_many = testing::order_request(&[(&product.id, 1), (&product.id, 1), (&product.id, 1)]);
        let err = orders.create(PHARMACY, "staff-1", too_many).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(CoreError::TooManyItems { max: 2 })));

        let err = orders
            .create(PHARMACY, "staff-1", testing::order_request(&[(&product.id, 0)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = orders
            .create(PHARMACY, "staff-1", testing::order_request(&[(&foreign.id, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = orders
            .create(PHARMACY, "staff-1", testing::order_request(&[("missing", 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut nameless = testing::order_request(&[(&product.id, 1)]);
        nameless.customer.name = "  ".into();
        let err = orders.create(PHARMACY, "staff-1", nameless).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert!(orders.list(PHARMACY, None).await.unwrap().is_empty());
        assert_eq!(testing::stock(&engine, &product.id).await, 10);
    }

    #[tokio::test]
    async fn test_unusable_gateway_does_not_fail_order() {
        let engine = testing::engine().await;
        let product = testing::product(&engine, PHARMACY, "Antacid", 1_000, 10).await;
        let foreign = engine.payments().create_gateway(OTHER_PHARMACY, "Cash", true).await.unwrap();

        for gateway_id in ["gone".to_string(), foreign.id.clone()] {
            let mut request = testing::order_request(&[(&product.id, 1)]);
            request.payment_gateway_id = Some(gateway_id);

            let details = engine.orders().create(PHARMACY, "staff-1", request).await.unwrap();
            assert!(details.order.payment_gateway_id.is_none());
            assert!(details.payments.is_empty());
        }

        assert_eq!(engine.orders().list(PHARMACY, None).await.unwrap().len(), 2);
        assert_eq!(testing::stock(&engine, &product.id).await, 8);
    }

    #[tokio::test]
    async fn test_stock_checked_across_repeated_lines() {
        let engine = testing::engine().await;
        let product = testing::product(&engine, PHARMACY, "Insulin", 45_000, 5).await;

        let err = engine
            .orders()
            .create(PHARMACY, "staff-1", testing::order_request(&[(&product.id, 3), (&product.id, 3)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::Validation(CoreError::InsufficientStock { available: 5, requested: 6, .. })
        ));
        assert_eq!(testing::stock(&engine, &product.id).await, 5);
    }

    #[tokio::test]
    async fn test_consumes_batches_fefo() {
        let engine = testing::engine().await;
        let product = testing::product(&engine, PHARMACY, "Paracetamol", 200, 0).await;
        let jan = testing::receive(&engine, &product, 5, Some(date(2025, 1, 1))).await;
        let jun = testing::receive(&engine, &product, 5, Some(date(2025, 6, 1))).await;

        engine
            .orders()
            .create(PHARMACY, "staff-1", testing::order_request(&[(&product.id, 7)]))
            .await
            .unwrap();

        let inventory = engine.inventory();
        assert_eq!(inventory.get_batch(PHARMACY, &jan.id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(inventory.get_batch(PHARMACY, &jun.id).await.unwrap().quantity, 3);
        assert_eq!(testing::stock(&engine, &product.id).await, 3);
    }

    #[tokio::test]
    async fn test_promo_single_use() {
        let engine = testing::engine().await;
        let product = testing::product(&engine, PHARMACY, "Antacid", 1_000, 10).await;
        testing::promo(&engine, PHARMACY, "ONCE", DiscountType::Fixed, 100, 1).await;

        let mut request = testing::order_request(&[(&product.id, 1)]);
        request.promo_code = Some("ONCE".into());
        engine.orders().create(PHARMACY, "staff-1", request.clone()).await.unwrap();

        let err = engine.orders().create(PHARMACY, "staff-2", request).await.unwrap_err();
        assert_eq!(err.promo_rejection(), Some(&PromoRejection::MaxUsesReached));
        assert!(err.to_string().contains("maximum uses"));
        assert_eq!(testing::stock(&engine, &product.id).await, 9);
    }

    #[tokio::test]
    async fn test_points_redemption() {
        let engine = testing::engine().await;
        testing::referral_config(&engine, PHARMACY).await;
        let product = testing::product(&engine, PHARMACY, "Multivitamin", 50_000, 5).await;
        let customer = testing::customer(&engine, PHARMACY, "Maya", "9800000080", 150).await;

        let mut request = testing::order_request(&[(&product.id, 1)]);
        request.customer.name = "Maya".into();
        request.customer.phone = Some("9800000080".into());
        request.points_to_redeem = Some(120);

        let order = engine.orders().create(PHARMACY, "staff-1", request).await.unwrap().order;

        assert_eq!(order.customer_id.as_deref(), Some(customer.id.as_str()));
        assert_eq!(order.points_redeemed, 100);
        assert_eq!(order.discount_cents, 1_000);
        assert_eq!(order.total_cents, 49_000);

        let loyalty = engine.loyalty();
        assert_eq!(loyalty.get_customer(PHARMACY, &customer.id).await.unwrap().points_balance, 50);
        let history = loyalty.points_history(PHARMACY, &customer.id).await.unwrap();
        assert_eq!(history[0].kind, PointsTransactionKind::Redeem);
        assert_eq!(history[0].amount, -100);
        assert_eq!(history[0].order_id.as_deref(), Some(order.id.as_str()));
    }

    #[tokio::test]
    async fn test_late_failure_rolls_back_everything() {
        let engine = testing::engine().await;
        testing::referral_config(&engine, PHARMACY).await;
        // Counter says 16, batches only hold 6: the FEFO step fails last
        let product = testing::product(&engine, PHARMACY, "Amoxicillin", 10_000, 10).await;
        testing::receive(&engine, &product, 3, Some(date(2025, 1, 1))).await;
        testing::receive(&engine, &product, 3, None).await;
        let promo = testing::promo(&engine, PHARMACY, "LATE", DiscountType::Fixed, 500, 5).await;
        let customer = testing::customer(&engine, PHARMACY, "Maya", "9800000081", 300).await;

        let mut request = testing::order_request(&[(&product.id, 8)]);
        request.customer.phone = Some("9800000081".into());
        request.promo_code = Some("LATE".into());
        request.points_to_redeem = Some(200);

        let err = engine.orders().create(PHARMACY, "staff-1", request).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(CoreError::InsufficientStock { .. })));

        assert!(engine.orders().list(PHARMACY, None).await.unwrap().is_empty());
        assert_eq!(engine.promos().get(PHARMACY, &promo.id).await.unwrap().used_count, 0);
        assert_eq!(
            engine.loyalty().get_customer(PHARMACY, &customer.id).await.unwrap().points_balance,
            300
        );
        assert_eq!(testing::stock(&engine, &product.id).await, 16);
        assert_eq!(engine.inventory().list_batches(PHARMACY, &product.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_membership_discount_with_and_without_loyalty() {
        let engine = testing::engine().await;
        let product = testing::product(&engine, PHARMACY, "Glucometer", 20_000, 10).await;
        let customer = testing::customer(&engine, PHARMACY, "Maya", "9800000082", 0).await;
        let tier = engine
            .memberships()
            .create_tier(
                PHARMACY,
                NewMembership {
                    name: "Gold".into(),
                    discount_bps: 500,
                    is_active: true,
                },
            )
            .await
            .unwrap();
        engine.memberships().assign(PHARMACY, &customer.id, &tier.id).await.unwrap();

        let mut request = testing::order_request(&[(&product.id, 1)]);
        request.customer.phone = Some("9800000082".into());

        // No loyalty config: phone lookup only prices the order
        let order = engine.orders().create(PHARMACY, "staff-1", request.clone()).await.unwrap().order;
        assert_eq!(order.discount_cents, 1_000);
        assert!(order.customer_id.is_none());

        testing::referral_config(&engine, PHARMACY).await;
        let order = engine.orders().create(PHARMACY, "staff-1", request.clone()).await.unwrap().order;
        assert_eq!(order.discount_cents, 1_000);
        assert_eq!(order.customer_id.as_deref(), Some(customer.id.as_str()));

        engine.memberships().set_tier_active(PHARMACY, &tier.id, false).await.unwrap();
        let order = engine.orders().create(PHARMACY, "staff-1", request).await.unwrap().order;
        assert_eq!(order.discount_cents, 0);
    }

    #[tokio::test]
    async fn test_referral_recorded_on_order() {
        let engine = testing::engine().await;
        testing::referral_config(&engine, PHARMACY).await;
        let product = testing::product(&engine, PHARMACY, "Antacid", 1_000, 10).await;
        let referrer = testing::customer(&engine, PHARMACY, "Ram", "9800000083", 0).await;

        let mut request = testing::order_request(&[(&product.id, 1)]);
        request.customer.phone = Some("9800000084".into());
        request.referral_code = referrer.referral_code.as_ref().map(|c| c.to_lowercase());

        let order = engine.orders().create(PHARMACY, "staff-1", request).await.unwrap().order;
        assert_eq!(order.referral_code_used, referrer.referral_code);

        let referred = engine
            .loyalty()
            .get_customer(PHARMACY, order.customer_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(referred.referred_by_id.as_deref(), Some(referrer.id.as_str()));
    }

    #[tokio::test]
    async fn test_get_and_list() {
        let engine = testing::engine().await;
        let product = testing::product(&engine, PHARMACY, "Antacid", 1_000, 10).await;
        let orders = engine.orders();

        let first = orders
            .create(PHARMACY, "staff-1", testing::order_request(&[(&product.id, 1)]))
            .await
            .unwrap();
        orders
            .create(PHARMACY, "staff-2", testing::order_request(&[(&product.id, 1)]))
            .await
            .unwrap();

        assert_eq!(orders.list(PHARMACY, None).await.unwrap().len(), 2);
        let mine = orders.list(PHARMACY, Some("staff-1")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, first.order.id);

        let loaded = orders.get(PHARMACY, &first.order.id).await.unwrap();
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].product_name, "Antacid");

        let err = orders.get(OTHER_PHARMACY, &first.order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = orders.get(PHARMACY, "missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    // -------------------------------------------------------------------------
    // Concurrent checkouts on a shared file
    // -------------------------------------------------------------------------

    /// Spawns one `create` per request and collects the outcomes.
    async fn create_concurrently(
        engine: &Engine,
        requests: Vec<CreateOrderRequest>,
    ) -> Vec<EngineResult<OrderDetails>> {
        let handles: Vec<_> = requests
            .into_iter()
            .enumerate()
            .map(|(i, request)| {
                let orders = engine.orders();
                tokio::spawn(async move {
                    orders.create(PHARMACY, &format!("staff-{}", i % 4), request).await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_orders_on_separate_products() {
        let (engine, _store) = testing::file_engine(8).await;
        let mut products = Vec::new();
        for i in 0..8 {
            products.push(testing::product(&engine, PHARMACY, &format!("Item {}", i), 500, 100).await);
        }

        let requests = (0..40)
            .map(|i| testing::order_request(&[(&products[i % 8].id, 1)]))
            .collect();
        let results = create_concurrently(&engine, requests).await;

        for result in &results {
            assert!(result.is_ok(), "order failed: {:?}", result.as_ref().err());
        }
        for product in &products {
            assert_eq!(testing::stock(&engine, &product.id).await, 95);
        }
        assert_eq!(engine.orders().list(PHARMACY, None).await.unwrap().len(), 40);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_orders_cannot_oversell() {
        let (engine, _store) = testing::file_engine(8).await;
        let product = testing::product(&engine, PHARMACY, "Inhaler", 2_000, 0).await;
        testing::receive(&engine, &product, 5, Some(date(2031, 1, 1))).await;

        let requests = (0..12).map(|_| testing::order_request(&[(&product.id, 1)])).collect();
        let results = create_concurrently(&engine, requests).await;

        let placed = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(placed, 5);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                matches!(err, EngineError::Validation(CoreError::InsufficientStock { .. })),
                "unexpected failure: {}",
                err
            );
        }
        assert_eq!(testing::stock(&engine, &product.id).await, 0);
        assert!(engine.inventory().list_batches(PHARMACY, &product.id).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_orders_share_single_use_promo() {
        let (engine, _store) = testing::file_engine(8).await;
        let product = testing::product(&engine, PHARMACY, "Antacid", 1_000, 50).await;
        let promo = testing::promo(&engine, PHARMACY, "ONCE", DiscountType::Fixed, 100, 1).await;

        let requests = (0..8)
            .map(|_| {
                let mut request = testing::order_request(&[(&product.id, 1)]);
                request.promo_code = Some("ONCE".into());
                request
            })
            .collect();
        let results = create_concurrently(&engine, requests).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.promo_rejection(), Some(&PromoRejection::MaxUsesReached), "{}", err);
        }
        assert_eq!(engine.promos().get(PHARMACY, &promo.id).await.unwrap().used_count, 1);
        assert_eq!(testing::stock(&engine, &product.id).await, 49);
    }
}
