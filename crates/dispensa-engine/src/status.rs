//! # Order Status State Machine
//!
//! Applies status changes allowed by the transition table in
//! [`dispensa_core::status`] and runs the completion side effects.
//!
//! ```text
//! pending ──► confirmed ──► processing ──► ready ──► completed
//!    │            │              │           │
//!    └────────────┴──────────────┴───────────┴─────► cancelled
//! ```
//!
//! Moving into `completed` writes the status, the customer's purchase
//! points, the referral reward and the staff points in one unit of work.
//! The status write is guarded on the previous status, so two racing
//! completions cannot both pay out.

use tracing::{debug, info};

use dispensa_core::status::{check_transition, Transition};
use dispensa_core::{Order, OrderStatus};
use dispensa_db::Database;

use crate::error::{EngineError, EngineResult};
use crate::loyalty::LoyaltyEngine;
use crate::orders::OrderPipeline;

#[derive(Debug, Clone)]
pub struct OrderStatusMachine {
    db: Database,
}

impl OrderStatusMachine {
    pub fn new(db: Database) -> Self {
        OrderStatusMachine { db }
    }

    /// Moves the order to `to`. Moving to the current status is a no-op.
    ///
    /// ## Errors
    /// - transition not in the table → `Validation` naming both states
    /// - status changed by someone else meanwhile → `Conflict`
    pub async fn update_status(
        &self,
        pharmacy_id: &str,
        order_id: &str,
        to: OrderStatus,
    ) -> EngineResult<Order> {
        self.transition(pharmacy_id, order_id, to, None).await
    }

    /// `pending → confirmed`; any other current status is a `Conflict`.
    pub async fn accept(&self, pharmacy_id: &str, order_id: &str) -> EngineResult<Order> {
        self.transition(
            pharmacy_id,
            order_id,
            OrderStatus::Confirmed,
            Some(OrderStatus::Pending),
        )
        .await
    }

    /// Statuses the order can move to next.
    pub async fn next_statuses(&self, pharmacy_id: &str, order_id: &str) -> EngineResult<Vec<OrderStatus>> {
        let mut uow = self.db.begin_read().await?;
        let order = OrderPipeline::order_in(&mut uow, pharmacy_id, order_id).await?;
        Ok(order.status.next_states())
    }

    async fn transition(
        &self,
        pharmacy_id: &str,
        order_id: &str,
        to: OrderStatus,
        required: Option<OrderStatus>,
    ) -> EngineResult<Order> {
        let mut uow = self.db.begin().await?;
        let order = OrderPipeline::order_in(&mut uow, pharmacy_id, order_id).await?;

        if let Some(required) = required {
            if order.status != required {
                return Err(EngineError::conflict(format!(
                    "Order {} is {}, expected {}",
                    order_id, order.status, required
                )));
            }
        }

        let transition = check_transition(order.status, to)?;
        let Transition::Move { from, to } = transition else {
            debug!(order_id = %order_id, status = %order.status, "Status unchanged");
            return Ok(order);
        };

        if !uow.orders().update_status(order_id, from, to).await? {
            return Err(EngineError::conflict(format!(
                "Order {} changed status concurrently",
                order_id
            )));
        }

        let order = OrderPipeline::order_in(&mut uow, pharmacy_id, order_id).await?;

        if transition.completes_order() {
            let rewards = LoyaltyEngine::on_order_completed_in(&mut uow, &order).await?;
            let staff_points = LoyaltyEngine::award_staff_points_in(&mut uow, &order).await?;
            debug!(
                order_id = %order_id,
                purchase_points = rewards.purchase_points,
                referral_points = rewards.referral_points,
                staff_points,
                "Completion rewards applied"
            );
        }

        uow.commit().await?;

        info!(order_id = %order_id, %from, %to, "Order status updated");
        Ok(order)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
