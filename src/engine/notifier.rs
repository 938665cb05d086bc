// Notifier - tells the outside world a transaction settled
// Fire and forget: a notification failure never rolls back the ledger.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::ledger::{Transaction, TxId};

/// Capability invoked on transaction completion (email, log, UI)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, transaction: &Transaction);
}

/// Notifier that emits a structured log line per settled transaction
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, transaction: &Transaction) {
        info!(
            tx = %transaction.id(),
            from = %transaction.source(),
            to = %transaction.destination(),
            amount = %transaction.amount(),
            status = %transaction.status(),
            "transaction settled"
        );
    }
}

/// Mock notifier that records which transactions it was told about
#[derive(Default)]
pub struct MockNotifier {
    notified: Mutex<Vec<TxId>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notified(&self) -> Vec<TxId> {
        self.notified.lock().await.clone()
    }

    pub async fn notified_count(&self) -> usize {
        self.notified.lock().await.len()
    }

    pub async fn was_notified(&self, id: &TxId) -> bool {
        self.notified.lock().await.iter().any(|n| n == id)
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, transaction: &Transaction) {
        self.notified.lock().await.push(transaction.id().clone());
    }
}
