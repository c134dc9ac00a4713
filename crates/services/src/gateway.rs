//! External settlement gateway collaborator.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{Payment, Refund};
use thiserror::Error;

/// Failure reported by the external settlement provider.
///
/// A timeout on the provider side surfaces as this error too and follows
/// the same compensation path as an explicit decline.
#[derive(Debug, Clone, Error)]
#[error("settlement gateway error: {0}")]
pub struct GatewayError(pub String);

/// External money movement, for payments and (symmetrically) refunds.
///
/// Calls here are the one blocking, slow operation in the system and must
/// never be made while holding an inventory or order row lock.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Collects the payment amount from the customer.
    async fn settle_payment(&self, payment: &Payment) -> Result<(), GatewayError>;

    /// Returns the refund amount to the customer.
    async fn settle_refund(&self, refund: &Refund) -> Result<(), GatewayError>;
}

#[derive(Debug, Default)]
struct StubGatewayState {
    fail_on_payments: bool,
    fail_on_refunds: bool,
    payment_attempts: u32,
    refund_attempts: u32,
}

/// Controllable gateway stub for tests and demo deployments.
///
/// Succeeds by default; flip the failure toggles to drive the compensation
/// paths.
#[derive(Debug, Clone, Default)]
pub struct StubGateway {
    state: Arc<RwLock<StubGatewayState>>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent payment settlements fail.
    pub fn set_fail_on_payments(&self, fail: bool) {
        self.state.write().unwrap().fail_on_payments = fail;
    }

    /// Makes subsequent refund settlements fail.
    pub fn set_fail_on_refunds(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refunds = fail;
    }

    /// Number of payment settlement attempts seen.
    pub fn payment_attempts(&self) -> u32 {
        self.state.read().unwrap().payment_attempts
    }

    /// Number of refund settlement attempts seen.
    pub fn refund_attempts(&self) -> u32 {
        self.state.read().unwrap().refund_attempts
    }
}

#[async_trait]
impl SettlementGateway for StubGateway {
    async fn settle_payment(&self, payment: &Payment) -> Result<(), GatewayError> {
        let mut state = self.state.write().unwrap();
        state.payment_attempts += 1;
        if state.fail_on_payments {
            return Err(GatewayError(format!("payment {} declined", payment.id())));
        }
        Ok(())
    }

    async fn settle_refund(&self, refund: &Refund) -> Result<(), GatewayError> {
        let mut state = self.state.write().unwrap();
        state.refund_attempts += 1;
        if state.fail_on_refunds {
            return Err(GatewayError(format!("refund {} declined", refund.id())));
        }
        Ok(())
    }
}
