//! # Payments
//!
//! Payment gateways per pharmacy and the mock payment recorded after an
//! order is created. There is no real gateway integration: a mock payment
//! is inserted `pending` and immediately marked `completed`.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use dispensa_core::validation::validate_required;
use dispensa_core::{Order, Payment, PaymentGateway, PaymentStatus};
use dispensa_db::Database;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct PaymentService {
    db: Database,
}

impl PaymentService {
    pub fn new(db: Database) -> Self {
        PaymentService { db }
    }

    pub async fn create_gateway(
        &self,
        pharmacy_id: &str,
        name: &str,
        is_active: bool,
    ) -> EngineResult<PaymentGateway> {
        let gateway = PaymentGateway {
            id: Uuid::new_v4().to_string(),
            pharmacy_id: pharmacy_id.to_string(),
            name: validate_required("name", name, 100)?,
            is_active,
            created_at: Utc::now(),
        };

        let mut uow = self.db.begin().await?;
        uow.payments().insert_gateway(&gateway).await?;
        uow.commit().await?;

        info!(gateway_id = %gateway.id, name = %gateway.name, "Payment gateway created");
        Ok(gateway)
    }

    pub async fn list_gateways(&self, pharmacy_id: &str) -> EngineResult<Vec<PaymentGateway>> {
        let mut uow = self.db.begin_read().await?;
        Ok(uow.payments().list_gateways(pharmacy_id).await?)
    }

    pub async fn payments_for_order(&self, pharmacy_id: &str, order_id: &str) -> EngineResult<Vec<Payment>> {
        let mut uow = self.db.begin_read().await?;
        let order = uow
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;
        if order.pharmacy_id != pharmacy_id {
            return Err(EngineError::forbidden("Order", order_id));
        }

        Ok(uow.payments().list_for_order(order_id).await?)
    }

    /// Records a completed payment for the order's total.
    ///
    /// `Ok(None)` when the order has no gateway, or the gateway is inactive
    /// or belongs to another pharmacy.
    pub async fn record_mock_payment(&self, order: &Order) -> EngineResult<Option<Payment>> {
        let Some(gateway_id) = order.payment_gateway_id.as_deref() else {
            return Ok(None);
        };

        let mut uow = self.db.begin().await?;

        let usable = uow
            .payments()
            .get_gateway(gateway_id)
            .await?
            .filter(|g| g.is_active && g.pharmacy_id == order.pharmacy_id);
        if usable.is_none() {
            debug!(order_id = %order.id, gateway_id = %gateway_id, "Gateway not usable, no payment recorded");
            return Ok(None);
        }

        let mut payment = Payment {
            id: Uuid::new_v4().to_string(),
            pharmacy_id: order.pharmacy_id.clone(),
            order_id: order.id.clone(),
            gateway_id: gateway_id.to_string(),
            amount_cents: order.total_cents,
            currency: order.currency.clone(),
            status: PaymentStatus::Pending,
            reference: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        uow.payments().insert_payment(&payment).await?;

        let reference = format!("MOCK-{}", payment.id.split('-').next().unwrap_or_default().to_uppercase());
        if !uow.payments().mark_completed(&payment.id, &reference).await? {
            return Err(EngineError::conflict(format!(
                "Payment {} is no longer pending",
                payment.id
            )));
        }
        uow.commit().await?;

        payment.status = PaymentStatus::Completed;
        payment.reference = Some(reference);
        payment.completed_at = Some(Utc::now());

        info!(order_id = %order.id, payment_id = %payment.id, amount = %payment.amount(), "Mock payment recorded");
        Ok(Some(payment))
    }
}
