// Transfer Engine - validates, commits, broadcasts and settles transfers
//
// submit() commits the balance mutation atomically through the ledger,
// publishes the pending event in commit order, then schedules asynchronous
// settlement. Once committed, an internal transfer's balance mutation is
// final; settlement only flips the status for observability. External
// transfers hold their debit in the pending balance until the external
// target accepts or rejects them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broadcast::{BroadcastBus, EventHandler, TransactionEvent};
use crate::engine::notifier::Notifier;
use crate::engine::request::TransferRequest;
use crate::engine::settlement::{ExternalSettlement, SettlementError};
use crate::ledger::{Amount, Destination, LedgerStore, Transaction, TransferError, TxId, TxStatus};
use crate::registry::{NodeId, NodeRegistry};

/// Configuration for the transfer engine
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Simulated settlement delay for internal transfers
    pub settlement_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settlement_delay: Duration::from_secs(3),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settlement_delay(mut self, delay: Duration) -> Self {
        self.settlement_delay = delay;
        self
    }
}

/// Orchestrates the transfer protocol against the ledger, the broadcast
/// bus and the external collaborators.
pub struct TransferEngine {
    registry: Arc<NodeRegistry>,
    ledger: Arc<Mutex<LedgerStore>>,
    bus: Arc<BroadcastBus>,
    settlement: Arc<dyn ExternalSettlement>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
    /// Settlement tasks that have not fired yet, keyed by transaction id
    pending: Arc<Mutex<HashMap<TxId, JoinHandle<()>>>>,
}

impl TransferEngine {
    pub fn new(
        registry: Arc<NodeRegistry>,
        ledger: Arc<Mutex<LedgerStore>>,
        bus: Arc<BroadcastBus>,
        settlement: Arc<dyn ExternalSettlement>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            bus,
            settlement,
            notifier,
            config,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<Mutex<LedgerStore>> {
        &self.ledger
    }

    /// Number of settlement tasks that have not fired yet
    pub async fn pending_settlements(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Handler that applies inbound peer events to the local ledger
    pub fn remote_applier(&self) -> Arc<RemoteApplier> {
        Arc::new(RemoteApplier {
            ledger: Arc::clone(&self.ledger),
        })
    }

    // ========================================================================
    // QUERIES (for front ends)
    // ========================================================================

    pub async fn balance(&self, id: NodeId) -> Result<Amount, TransferError> {
        self.ledger.lock().await.balance(id)
    }

    /// Fee that an internal transfer of `amount` would be charged
    pub async fn fee_preview(&self, amount: Amount) -> Amount {
        self.ledger.lock().await.fee_for(amount)
    }

    /// Snapshot of a node's history, most recent first
    pub async fn history(&self, id: NodeId) -> Vec<Transaction> {
        self.ledger.lock().await.history(id).cloned().collect()
    }

    // ========================================================================
    // SUBMIT
    // ========================================================================

    /// Validate and execute a transfer intent.
    ///
    /// On success the returned transaction is PENDING, the balances have
    /// already moved, and peers have been told. Validation failures leave
    /// the ledger untouched.
    pub async fn submit(&self, request: TransferRequest) -> Result<Transaction, TransferError> {
        match request.destination().clone() {
            Destination::Node(dest) => {
                self.submit_internal(request.source(), dest, request.amount())
                    .await
            }
            Destination::External(address) => {
                self.submit_external(request.source(), address, request.amount())
                    .await
            }
        }
    }

    async fn submit_internal(
        &self,
        source: NodeId,
        dest: NodeId,
        amount: Amount,
    ) -> Result<Transaction, TransferError> {
        let tx = {
            let mut ledger = self.ledger.lock().await;
            let tx = ledger.apply_internal_transfer(source, dest, amount)?;
            // Published under the ledger lock so publish order equals
            // commit order (FIFO per source)
            self.bus
                .publish(source, &TransactionEvent::from_transaction(&tx))
                .await;
            tx
        };

        info!(
            tx = %tx.id(),
            from = %source,
            to = %dest,
            amount = %amount,
            fee = %tx.fee(),
            "internal transfer committed"
        );

        self.schedule_internal_settlement(&tx).await;
        Ok(tx)
    }

    async fn submit_external(
        &self,
        source: NodeId,
        address: String,
        amount: Amount,
    ) -> Result<Transaction, TransferError> {
        validate_external_address(&address)?;

        let tx = {
            let mut ledger = self.ledger.lock().await;
            let tx = ledger.apply_external_debit(source, amount, &address)?;
            self.bus
                .publish(source, &TransactionEvent::from_transaction(&tx))
                .await;
            tx
        };

        info!(
            tx = %tx.id(),
            from = %source,
            to = %address,
            amount = %amount,
            "external debit committed, awaiting settlement"
        );

        self.schedule_external_settlement(&tx, address).await;
        Ok(tx)
    }

    // ========================================================================
    // SETTLEMENT TASKS
    // ========================================================================

    async fn schedule_internal_settlement(&self, tx: &Transaction) {
        let txid = tx.id().clone();
        let origin = tx.source();
        let ledger = Arc::clone(&self.ledger);
        let bus = Arc::clone(&self.bus);
        let notifier = Arc::clone(&self.notifier);
        let pending = Arc::clone(&self.pending);
        let delay = self.config.settlement_delay;

        let task_id = txid.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.lock().await.remove(&task_id);

            let settled = {
                let mut ledger = ledger.lock().await;
                match ledger.mark_completed(&task_id) {
                    Ok(()) => ledger.get_transaction(&task_id).cloned(),
                    // Lost the race against a cancel; nothing to do
                    Err(TransferError::AlreadySettled(_)) => None,
                    Err(err) => {
                        // A fired timer must always find its transaction
                        error!(
                            tx = %task_id,
                            %err,
                            "settlement fired for a transaction the ledger does not know"
                        );
                        debug_assert!(false, "settlement lost a pending transaction");
                        None
                    }
                }
            };

            if let Some(tx) = settled {
                bus.publish(origin, &TransactionEvent::from_transaction(&tx))
                    .await;
                notifier.notify(&tx).await;
                debug!(tx = %tx.id(), "internal transfer completed");
            }
        });

        self.pending.lock().await.insert(txid, handle);
    }

    async fn schedule_external_settlement(&self, tx: &Transaction, address: String) {
        let txid = tx.id().clone();
        let origin = tx.source();
        let amount = tx.amount();
        let from_address = self
            .registry
            .get(origin)
            .map(|node| node.wallet_address().to_string())
            .unwrap_or_default();

        let ledger = Arc::clone(&self.ledger);
        let bus = Arc::clone(&self.bus);
        let settlement = Arc::clone(&self.settlement);
        let notifier = Arc::clone(&self.notifier);
        let pending = Arc::clone(&self.pending);

        let task_id = txid.clone();
        let handle = tokio::spawn(async move {
            let outcome = settlement.send(&from_address, &address, amount).await;
            pending.lock().await.remove(&task_id);

            let settled = {
                let mut ledger = ledger.lock().await;
                match outcome {
                    Ok(receipt) => match ledger.settle_external(&task_id) {
                        Ok(()) => {
                            debug!(
                                tx = %task_id,
                                reference = %receipt.reference(),
                                "external transfer accepted"
                            );
                            ledger.get_transaction(&task_id).cloned()
                        }
                        Err(TransferError::AlreadySettled(_)) => None,
                        Err(err) => {
                            error!(
                                tx = %task_id,
                                %err,
                                "external settlement resolved an unknown transaction"
                            );
                            debug_assert!(false, "settlement lost a pending transaction");
                            None
                        }
                    },
                    Err(SettlementError::Rejected(reason)) => {
                        warn!(tx = %task_id, %reason, "external settlement rejected, reverting debit");
                        match ledger.revert_external(&task_id, &reason) {
                            Ok(()) => ledger.get_transaction(&task_id).cloned(),
                            Err(TransferError::AlreadySettled(_)) => None,
                            Err(err) => {
                                error!(tx = %task_id, %err, "failed to revert external debit");
                                None
                            }
                        }
                    }
                }
            };

            if let Some(tx) = settled {
                bus.publish(origin, &TransactionEvent::from_transaction(&tx))
                    .await;
                if tx.status() == TxStatus::Completed {
                    notifier.notify(&tx).await;
                }
            }
        });

        self.pending.lock().await.insert(txid, handle);
    }

    // ========================================================================
    // CANCEL
    // ========================================================================

    /// Cancel a pending transaction before its settlement fires.
    ///
    /// Internal transfers keep their committed balance mutation (the
    /// commit is final); only the record moves to FAILED. A cancelled
    /// external transfer reverts its pending debit. Terminal transactions
    /// and pending transactions whose settlement is no longer abortable
    /// are rejected with `AlreadySettled`.
    pub async fn cancel(&self, id: &TxId) -> Result<(), TransferError> {
        let handle = self.pending.lock().await.remove(id);

        let Some(handle) = handle else {
            let ledger = self.ledger.lock().await;
            return match ledger.get_transaction(id) {
                None => Err(TransferError::UnknownTransaction(id.clone())),
                Some(_) => Err(TransferError::AlreadySettled(id.clone())),
            };
        };
        handle.abort();

        let cancelled = {
            let mut ledger = self.ledger.lock().await;
            let is_external = ledger
                .get_transaction(id)
                .map(|tx| tx.destination().is_external())
                .ok_or_else(|| TransferError::UnknownTransaction(id.clone()))?;

            if is_external {
                ledger.revert_external(id, "cancelled")?;
            } else {
                ledger.mark_failed(id, "cancelled")?;
            }
            ledger.get_transaction(id).cloned()
        };

        if let Some(tx) = cancelled {
            info!(tx = %tx.id(), "transfer cancelled");
            self.bus
                .publish(tx.source(), &TransactionEvent::from_transaction(&tx))
                .await;
        }
        Ok(())
    }
}

/// Applies transactions received from peers to the local ledger,
/// idempotently keyed by transaction id
pub struct RemoteApplier {
    ledger: Arc<Mutex<LedgerStore>>,
}

#[async_trait]
impl EventHandler for RemoteApplier {
    async fn on_event(&self, event: TransactionEvent) {
        let outcome = self.ledger.lock().await.apply_remote(&event);
        debug!(tx = %event.id(), ?outcome, "applied peer event");
    }
}

/// Shape check for external addresses. The full address-format rules are
/// an external collaborator concern; the engine only rejects requests
/// that cannot possibly name an address.
fn validate_external_address(address: &str) -> Result<(), TransferError> {
    let plausible = address.len() >= 8
        && address.len() <= 90
        && address.chars().all(|c| c.is_ascii_alphanumeric());
    if plausible {
        Ok(())
    } else {
        Err(TransferError::ExternalAddressInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BusConfig;
    use crate::engine::settlement::MockExternalSettlement;
    use crate::engine::MockNotifier;
    use crate::ledger::LedgerConfig;
    use crate::registry::NodeConfig;

    fn test_engine(settlement: MockExternalSettlement) -> TransferEngine {
        let registry = Arc::new(NodeRegistry::new(NodeConfig::simulated_mesh(
            3,
            Amount::from_coins(1000).unwrap(),
        )));
        let ledger = Arc::new(Mutex::new(LedgerStore::new(
            Arc::clone(&registry),
            LedgerConfig::default(),
        )));
        let bus = Arc::new(BroadcastBus::new(Arc::clone(&registry), BusConfig::default()));
        TransferEngine::new(
            registry,
            ledger,
            bus,
            Arc::new(settlement),
            Arc::new(MockNotifier::new()),
            EngineConfig::default(),
        )
    }

    #[test]
    fn test_address_shape_check() {
        assert!(validate_external_address("bc1qlongenough").is_ok());
        assert!(validate_external_address("").is_err());
        assert!(validate_external_address("short").is_err());
        assert!(validate_external_address("has spaces inside").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_internal_transfer_settles_after_delay() {
        let engine = test_engine(MockExternalSettlement::new());
        let tx = engine
            .submit(TransferRequest::internal(
                NodeId::new(1),
                NodeId::new(2),
                Amount::from_coins(100).unwrap(),
            ))
            .await
            .unwrap();

        assert_eq!(tx.status(), TxStatus::Pending);
        assert_eq!(engine.pending_settlements().await, 1);

        tokio::time::sleep(Duration::from_secs(4)).await;

        let ledger = engine.ledger().lock().await;
        assert_eq!(
            ledger.get_transaction(tx.id()).unwrap().status(),
            TxStatus::Completed
        );
        // The settlement transition itself does not move balances
        assert_eq!(
            ledger.balance(NodeId::new(1)).unwrap(),
            Amount::parse("899.99").unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_settlement() {
        let engine = test_engine(MockExternalSettlement::new());
        let tx = engine
            .submit(TransferRequest::internal(
                NodeId::new(1),
                NodeId::new(2),
                Amount::from_coins(10).unwrap(),
            ))
            .await
            .unwrap();

        engine.cancel(tx.id()).await.unwrap();

        let status = {
            let ledger = engine.ledger().lock().await;
            ledger.get_transaction(tx.id()).unwrap().status()
        };
        assert_eq!(status, TxStatus::Failed);

        // Cancelling again is rejected
        assert!(matches!(
            engine.cancel(tx.id()).await,
            Err(TransferError::AlreadySettled(_))
        ));
    }

    #[tokio::test]
    async fn test_external_rejection_reverts_debit() {
        let engine = test_engine(MockExternalSettlement::new().with_failure("no route"));
        let tx = engine
            .submit(TransferRequest::external(
                NodeId::new(1),
                "bc1qoutside",
                Amount::from_coins(25).unwrap(),
            ))
            .await
            .unwrap();

        // Let the settlement task run
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let ledger = engine.ledger().lock().await;
        let settled = ledger.get_transaction(tx.id()).unwrap();
        assert_eq!(settled.status(), TxStatus::Failed);
        assert_eq!(settled.failure_reason(), Some("no route"));
        assert_eq!(
            ledger.balance(NodeId::new(1)).unwrap(),
            Amount::from_coins(1000).unwrap()
        );
        assert_eq!(ledger.pending_balance(NodeId::new(1)).unwrap(), Amount::ZERO);
    }
}
