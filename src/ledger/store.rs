// Ledger Store - owns balances and transaction history
// The only component permitted to mutate balances.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::broadcast::TransactionEvent;
use crate::ledger::amount::{Amount, FeeRate};
use crate::ledger::transaction::{Destination, Transaction, TxId, TxStatus};
use crate::registry::{NodeId, NodeRegistry};

/// Errors that can occur while validating or executing a transfer
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("invalid amount")]
    InvalidAmount,

    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Amount, required: Amount },

    #[error("node {0} is disconnected")]
    NodeDisconnected(NodeId),

    #[error("invalid external address")]
    ExternalAddressInvalid,

    #[error("external settlement rejected the transfer: {0}")]
    TransferRejected(String),

    #[error("unknown transaction: {0}")]
    UnknownTransaction(TxId),

    #[error("transaction {0} already settled")]
    AlreadySettled(TxId),
}

/// Outcome of applying a transaction received from a peer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteApply {
    /// First time this id was seen; record inserted into local histories
    Inserted,
    /// Known id moved from pending to a terminal status
    Updated,
    /// Known id, nothing to change (idempotent redelivery)
    Unchanged,
}

/// Ledger configuration
#[derive(Clone, Copy, Debug)]
pub struct LedgerConfig {
    /// Fee rate applied to internal transfers
    pub fee_rate: FeeRate,
    /// Whether external transfers are also charged the fee.
    /// The reference behavior only charges internal transfers.
    pub charge_external_fee: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fee_rate: FeeRate::default(),
            charge_external_fee: false,
        }
    }
}

impl LedgerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fee_rate(mut self, rate: FeeRate) -> Self {
        self.fee_rate = rate;
        self
    }

    pub fn with_external_fee(mut self, charge: bool) -> Self {
        self.charge_external_fee = charge;
        self
    }
}

/// Per-node bookkeeping: balance, in-flight pending balance, and an
/// append-only history of transaction ids.
#[derive(Clone, Debug)]
struct Account {
    balance: Amount,
    pending_balance: Amount,
    history: Vec<TxId>,
}

impl Account {
    fn new(balance: Amount) -> Self {
        Self {
            balance,
            pending_balance: Amount::ZERO,
            history: Vec::new(),
        }
    }
}

/// The ledger store.
///
/// Balances move only through the methods here, each of which runs to
/// completion under the caller's lock, so no observer can see a transfer
/// with only one side applied. Fees are destroyed, not credited to any
/// account; they accumulate in `fees_collected` purely for conservation
/// accounting.
#[derive(Debug)]
pub struct LedgerStore {
    registry: Arc<NodeRegistry>,
    accounts: HashMap<NodeId, Account>,
    transactions: HashMap<TxId, Transaction>,
    fees_collected: Amount,
    config: LedgerConfig,
}

impl LedgerStore {
    /// Create a store seeded with each registry node's initial balance
    pub fn new(registry: Arc<NodeRegistry>, config: LedgerConfig) -> Self {
        let accounts = registry
            .list()
            .iter()
            .map(|node| (node.id(), Account::new(node.initial_balance())))
            .collect();

        Self {
            registry,
            accounts,
            transactions: HashMap::new(),
            fees_collected: Amount::ZERO,
            config,
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn balance(&self, id: NodeId) -> Result<Amount, TransferError> {
        self.accounts
            .get(&id)
            .map(|a| a.balance)
            .ok_or(TransferError::UnknownNode(id))
    }

    pub fn pending_balance(&self, id: NodeId) -> Result<Amount, TransferError> {
        self.accounts
            .get(&id)
            .map(|a| a.pending_balance)
            .ok_or(TransferError::UnknownNode(id))
    }

    /// Fee that would be charged for an internal transfer of `amount`
    pub fn fee_for(&self, amount: Amount) -> Amount {
        self.config.fee_rate.fee_for(amount)
    }

    pub fn get_transaction(&self, id: &TxId) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// A node's transactions, most recent first.
    ///
    /// The iterator is finite and restartable: each call starts again from
    /// the newest record. An unknown node yields an empty sequence.
    pub fn history(&self, id: NodeId) -> impl Iterator<Item = &Transaction> + '_ {
        self.accounts
            .get(&id)
            .into_iter()
            .flat_map(|a| a.history.iter().rev())
            .filter_map(move |txid| self.transactions.get(txid))
    }

    /// Total fees destroyed so far
    pub fn fees_collected(&self) -> Amount {
        self.fees_collected
    }

    /// Sum of balance plus pending balance across all nodes.
    ///
    /// `total_funds() + fees_collected()` is constant across any sequence
    /// of internal transfers.
    pub fn total_funds(&self) -> Amount {
        self.accounts.values().fold(Amount::ZERO, |acc, a| {
            acc.saturating_add(a.balance).saturating_add(a.pending_balance)
        })
    }

    // ========================================================================
    // TRANSFERS
    // ========================================================================

    /// Validate and execute an internal transfer as a single atomic step.
    ///
    /// Validation order is fixed: unknown nodes, then amount, then source
    /// connectivity, then funds. Any failure leaves both balances
    /// untouched. On success the debit and credit have both happened and
    /// the pending record is in both histories before this returns.
    pub fn apply_internal_transfer(
        &mut self,
        source: NodeId,
        dest: NodeId,
        amount: Amount,
    ) -> Result<Transaction, TransferError> {
        if !self.accounts.contains_key(&source) {
            return Err(TransferError::UnknownNode(source));
        }
        if !self.accounts.contains_key(&dest) {
            return Err(TransferError::UnknownNode(dest));
        }
        if amount.is_zero() {
            return Err(TransferError::InvalidAmount);
        }
        if !self.registry.is_connected(source) {
            return Err(TransferError::NodeDisconnected(source));
        }

        let fee = self.config.fee_rate.fee_for(amount);
        let required = amount.checked_add(fee).ok_or(TransferError::InvalidAmount)?;
        let available = self.accounts[&source].balance;
        if available < required {
            return Err(TransferError::InsufficientFunds {
                available,
                required,
            });
        }
        // Credit must stay representable; checked before any mutation
        if self.accounts[&dest].balance.checked_add(amount).is_none() {
            return Err(TransferError::InvalidAmount);
        }

        let tx = Transaction::new(source, Destination::Node(dest), amount, fee);

        if let Some(src) = self.accounts.get_mut(&source) {
            src.balance = src.balance.saturating_sub(required);
            src.history.push(tx.id().clone());
        }
        if source != dest {
            if let Some(dst) = self.accounts.get_mut(&dest) {
                dst.balance = dst.balance.saturating_add(amount);
                dst.history.push(tx.id().clone());
            }
        } else if let Some(src) = self.accounts.get_mut(&source) {
            // Self-transfer nets to the fee; one history entry
            src.balance = src.balance.saturating_add(amount);
        }
        self.fees_collected = self.fees_collected.saturating_add(fee);

        self.transactions.insert(tx.id().clone(), tx.clone());
        Ok(tx)
    }

    /// Validate and debit an outgoing external transfer.
    ///
    /// The debited amount moves into the source's pending balance until
    /// external settlement resolves it one way or the other.
    pub fn apply_external_debit(
        &mut self,
        source: NodeId,
        amount: Amount,
        address: &str,
    ) -> Result<Transaction, TransferError> {
        if !self.accounts.contains_key(&source) {
            return Err(TransferError::UnknownNode(source));
        }
        if amount.is_zero() {
            return Err(TransferError::InvalidAmount);
        }
        if !self.registry.is_connected(source) {
            return Err(TransferError::NodeDisconnected(source));
        }

        let fee = if self.config.charge_external_fee {
            self.config.fee_rate.fee_for(amount)
        } else {
            Amount::ZERO
        };
        let required = amount.checked_add(fee).ok_or(TransferError::InvalidAmount)?;
        let available = self.accounts[&source].balance;
        if available < required {
            return Err(TransferError::InsufficientFunds {
                available,
                required,
            });
        }

        let tx = Transaction::new(source, Destination::external(address), amount, fee);

        if let Some(src) = self.accounts.get_mut(&source) {
            src.balance = src.balance.saturating_sub(required);
            src.pending_balance = src.pending_balance.saturating_add(required);
            src.history.push(tx.id().clone());
        }

        self.transactions.insert(tx.id().clone(), tx.clone());
        Ok(tx)
    }

    // ========================================================================
    // SETTLEMENT TRANSITIONS
    // ========================================================================

    /// Move a pending transaction to COMPLETED
    pub fn mark_completed(&mut self, id: &TxId) -> Result<(), TransferError> {
        let tx = self
            .transactions
            .get_mut(id)
            .ok_or_else(|| TransferError::UnknownTransaction(id.clone()))?;
        if tx.is_terminal() {
            return Err(TransferError::AlreadySettled(id.clone()));
        }
        tx.set_completed();
        Ok(())
    }

    /// Move a pending transaction to FAILED with a reason
    pub fn mark_failed(&mut self, id: &TxId, reason: &str) -> Result<(), TransferError> {
        let tx = self
            .transactions
            .get_mut(id)
            .ok_or_else(|| TransferError::UnknownTransaction(id.clone()))?;
        if tx.is_terminal() {
            return Err(TransferError::AlreadySettled(id.clone()));
        }
        tx.set_failed(reason);
        Ok(())
    }

    /// Resolve a pending external debit as settled: the held funds leave
    /// the system, the fee (if any) is destroyed, the record completes.
    pub(crate) fn settle_external(&mut self, id: &TxId) -> Result<(), TransferError> {
        let (source, total, fee, terminal) = {
            let tx = self
                .transactions
                .get(id)
                .ok_or_else(|| TransferError::UnknownTransaction(id.clone()))?;
            debug_assert!(tx.destination().is_external());
            (tx.source(), tx.total_debit(), tx.fee(), tx.is_terminal())
        };
        if terminal {
            return Err(TransferError::AlreadySettled(id.clone()));
        }

        if let Some(src) = self.accounts.get_mut(&source) {
            src.pending_balance = src.pending_balance.saturating_sub(total);
        }
        self.fees_collected = self.fees_collected.saturating_add(fee);
        if let Some(tx) = self.transactions.get_mut(id) {
            tx.set_completed();
        }
        Ok(())
    }

    /// Resolve a pending external debit as rejected: the held funds return
    /// to the source balance, the record fails. The one compensating
    /// action in the design.
    pub(crate) fn revert_external(&mut self, id: &TxId, reason: &str) -> Result<(), TransferError> {
        let (source, total, terminal) = {
            let tx = self
                .transactions
                .get(id)
                .ok_or_else(|| TransferError::UnknownTransaction(id.clone()))?;
            debug_assert!(tx.destination().is_external());
            (tx.source(), tx.total_debit(), tx.is_terminal())
        };
        if terminal {
            return Err(TransferError::AlreadySettled(id.clone()));
        }

        if let Some(src) = self.accounts.get_mut(&source) {
            src.pending_balance = src.pending_balance.saturating_sub(total);
            src.balance = src.balance.saturating_add(total);
        }
        if let Some(tx) = self.transactions.get_mut(id) {
            tx.set_failed(reason);
        }
        Ok(())
    }

    // ========================================================================
    // PEER EVENTS
    // ========================================================================

    /// Apply a transaction event received from a peer, idempotently keyed
    /// by id. Balances are never touched here - the originating node owns
    /// the balance mutation; this only converges the transaction view.
    pub fn apply_remote(&mut self, event: &TransactionEvent) -> RemoteApply {
        if let Some(tx) = self.transactions.get_mut(event.id()) {
            if !tx.is_terminal() && event.status().is_terminal() {
                match event.status() {
                    TxStatus::Completed => tx.set_completed(),
                    TxStatus::Failed => tx.set_failed("reported failed by peer"),
                    TxStatus::Pending => {}
                }
                return RemoteApply::Updated;
            }
            return RemoteApply::Unchanged;
        }

        let tx = Transaction::from_parts(
            event.id().clone(),
            event.from(),
            event.to().clone(),
            event.amount(),
            event.fee(),
            event.timestamp(),
            event.status(),
        );

        if let Some(acc) = self.accounts.get_mut(&event.from()) {
            acc.history.push(tx.id().clone());
        }
        if let Some(dest_id) = event.to().node_id() {
            if dest_id != event.from() {
                if let Some(acc) = self.accounts.get_mut(&dest_id) {
                    acc.history.push(tx.id().clone());
                }
            }
        }
        self.transactions.insert(tx.id().clone(), tx);
        RemoteApply::Inserted
    }
}
