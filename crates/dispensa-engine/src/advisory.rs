//! # Advisory Operations
//!
//! Side effects whose failure must not fail the operation around them,
//! such as the mock payment after order creation or the membership lookup
//! when loyalty is not configured.
//!
//! ```text
//! OrderPipeline::create
//!   ├── steps 1-11 (fail-stop, one unit of work) ──► error aborts everything
//!   └── MOCK_PAYMENT.run(..) ──► Err: warn! and carry on, order still returned
//! ```

use std::fmt::Display;
use std::future::Future;

use tracing::{debug, warn};

/// A named best-effort operation. Failures are logged at `warn` and
/// swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advisory {
    name: &'static str,
}

/// Records a completed payment for a freshly created order.
pub const MOCK_PAYMENT: Advisory = Advisory::new("mock_payment");

/// Finds an existing customer by phone for membership pricing when
/// loyalty is not configured.
pub const MEMBERSHIP_LOOKUP: Advisory = Advisory::new("membership_lookup");

impl Advisory {
    pub const fn new(name: &'static str) -> Self {
        Advisory { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Awaits `operation`; `None` if it failed.
    pub async fn run<T, E, F>(&self, operation: F) -> Option<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        match operation.await {
            Ok(value) => {
                debug!(advisory = self.name, "Advisory operation succeeded");
                Some(value)
            }
            Err(e) => {
                warn!(advisory = self.name, error = %e, "Advisory operation failed, continuing");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_passes_value_through() {
        let out = MOCK_PAYMENT.run(async { Ok::<_, String>(42) }).await;
        assert_eq!(out, Some(42));
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let out: Option<i32> = MEMBERSHIP_LOOKUP
            .run(async { Err::<i32, _>("gateway offline") })
            .await;
        assert_eq!(out, None);
        assert_eq!(MEMBERSHIP_LOOKUP.name(), "membership_lookup");
    }
}
