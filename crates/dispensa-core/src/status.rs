//! # Order Status Transitions
//!
//! The order lifecycle as a data table.
//!
//! ```text
//!   pending ──► confirmed ──► processing ──► ready ──► completed
//!      │            │              │           │
//!      └────────────┴──────┬───────┴───────────┘
//!                          ▼
//!                      cancelled
//! ```
//!
//! `completed` and `cancelled` are terminal. Moving to the current state is a
//! no-op that always succeeds.

use crate::error::{CoreError, CoreResult};
use crate::types::OrderStatus;

use OrderStatus::*;

/// Every legal `(from, to)` pair.
pub const ORDER_TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (Pending, Confirmed),
    (Confirmed, Processing),
    (Processing, Ready),
    (Ready, Completed),
    (Pending, Cancelled),
    (Confirmed, Cancelled),
    (Processing, Cancelled),
    (Ready, Cancelled),
];

/// Outcome of checking a requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Requested state equals the current one; nothing to write.
    Unchanged(OrderStatus),
    /// A legal move.
    Move { from: OrderStatus, to: OrderStatus },
}

impl Transition {
    /// True only for a move that lands on `completed`, i.e. when the
    /// completion side effects must run.
    pub fn completes_order(&self) -> bool {
        matches!(self, Transition::Move { to: Completed, .. })
    }
}

impl OrderStatus {
    /// Table lookup; same-state is always allowed.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        self == to || ORDER_TRANSITIONS.contains(&(self, to))
    }

    /// States reachable in one step.
    pub fn next_states(self) -> Vec<OrderStatus> {
        ORDER_TRANSITIONS
            .iter()
            .filter(|(from, _)| *from == self)
            .map(|(_, to)| *to)
            .collect()
    }
}

/// Validates `from → to`.
///
/// ## Errors
/// [`CoreError::InvalidTransition`] naming both states.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> CoreResult<Transition> {
    if from == to {
        return Ok(Transition::Unchanged(from));
    }

    if !from.can_transition_to(to) {
        return Err(CoreError::InvalidTransition { from, to });
    }

    Ok(Transition::Move { from, to })
}

// =============================================================================
// Unit Tests
// =============================================================================
