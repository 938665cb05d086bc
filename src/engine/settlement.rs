// External settlement - pushes external transfers to the outside world
// The concrete network call lives behind the trait; tests use the mock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

use crate::ledger::Amount;

/// Errors an external settlement target can report
#[derive(Error, Debug, Clone)]
pub enum SettlementError {
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Receipt returned by a settlement target on success
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementReceipt {
    reference: String,
    amount: Amount,
    timestamp: DateTime<Utc>,
}

impl SettlementReceipt {
    pub fn new(reference: &str, amount: Amount) -> Self {
        Self {
            reference: reference.to_string(),
            amount,
            timestamp: Utc::now(),
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Capability for settling a transfer against an external network
#[async_trait]
pub trait ExternalSettlement: Send + Sync {
    /// Attempt to send `amount` from a local wallet address to an
    /// external one
    async fn send(
        &self,
        from_address: &str,
        to_address: &str,
        amount: Amount,
    ) -> Result<SettlementReceipt, SettlementError>;
}

/// Mock settlement target for tests and the simulator binary
pub struct MockExternalSettlement {
    should_succeed: bool,
    failure_message: Option<String>,
    delay_ms: u64,
    failures_before_success: AtomicUsize,
    call_count: AtomicUsize,
}

impl MockExternalSettlement {
    /// Create a new mock target (defaults to rejection)
    pub fn new() -> Self {
        Self {
            should_succeed: false,
            failure_message: None,
            delay_ms: 0,
            failures_before_success: AtomicUsize::new(0),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Configure to always succeed
    pub fn with_success(mut self) -> Self {
        self.should_succeed = true;
        self
    }

    /// Configure to always reject with a message
    pub fn with_failure(mut self, message: &str) -> Self {
        self.should_succeed = false;
        self.failure_message = Some(message.to_string());
        self
    }

    /// Add a delay before responding
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Reject N times, then succeed
    pub fn with_failures_then_success(mut self, failures: usize) -> Self {
        self.should_succeed = true;
        self.failures_before_success = AtomicUsize::new(failures);
        self
    }

    /// How many times `send` has been called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockExternalSettlement {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExternalSettlement for MockExternalSettlement {
    async fn send(
        &self,
        _from_address: &str,
        _to_address: &str,
        amount: Amount,
    ) -> Result<SettlementReceipt, SettlementError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        let call_num = self.call_count.fetch_add(1, Ordering::SeqCst);
        let failures_remaining = self.failures_before_success.load(Ordering::SeqCst);

        if failures_remaining > 0 && call_num < failures_remaining {
            return Err(SettlementError::Rejected(
                self.failure_message
                    .clone()
                    .unwrap_or_else(|| "mock rejection".to_string()),
            ));
        }

        if self.should_succeed {
            Ok(SettlementReceipt::new(
                &format!("ext-mock-{}", call_num),
                amount,
            ))
        } else {
            Err(SettlementError::Rejected(
                self.failure_message
                    .clone()
                    .unwrap_or_else(|| "mock rejection".to_string()),
            ))
        }
    }
}
