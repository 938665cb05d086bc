// Transaction records and their pending -> terminal lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ledger::Amount;
use crate::registry::NodeId;

/// Unique identifier for a transaction
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(String);

impl TxId {
    /// Generate a random transaction id
    pub fn generate() -> Self {
        use rand::Rng;
        let raw: u32 = rand::thread_rng().gen();
        Self(format!("TX-{:08X}", raw))
    }

    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a transfer is going: another node in the registry, or an
/// external address outside it. Mutually exclusive by construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    Node(NodeId),
    External(String),
}

impl Destination {
    pub fn external(address: &str) -> Self {
        Self::External(address.to_string())
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }

    /// The destination node id, if this is an internal transfer
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            Self::External(_) => None,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "node {}", id),
            Self::External(address) => write!(f, "{}", address),
        }
    }
}

/// Lifecycle status of a transaction.
///
/// Transitions are monotonic: Pending -> Completed or Pending -> Failed,
/// and the terminal states are final.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A single transfer record.
///
/// Created by the ledger on a validated request and referenced by both
/// parties' histories; the record itself is never deleted, only its
/// status moves forward.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    id: TxId,
    source: NodeId,
    destination: Destination,
    amount: Amount,
    fee: Amount,
    timestamp: DateTime<Utc>,
    status: TxStatus,
    failure_reason: Option<String>,
}

impl Transaction {
    pub(crate) fn new(source: NodeId, destination: Destination, amount: Amount, fee: Amount) -> Self {
        Self {
            id: TxId::generate(),
            source,
            destination,
            amount,
            fee,
            timestamp: Utc::now(),
            status: TxStatus::Pending,
            failure_reason: None,
        }
    }

    /// Rebuild a record from its parts, as received from a peer
    pub(crate) fn from_parts(
        id: TxId,
        source: NodeId,
        destination: Destination,
        amount: Amount,
        fee: Amount,
        timestamp: DateTime<Utc>,
        status: TxStatus,
    ) -> Self {
        Self {
            id,
            source,
            destination,
            amount,
            fee,
            timestamp,
            status,
            failure_reason: None,
        }
    }

    pub fn id(&self) -> &TxId {
        &self.id
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn fee(&self) -> Amount {
        self.fee
    }

    /// Amount plus fee - what the source actually pays
    pub fn total_debit(&self) -> Amount {
        self.amount.saturating_add(self.fee)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn status(&self) -> TxStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn set_completed(&mut self) {
        self.status = TxStatus::Completed;
    }

    pub(crate) fn set_failed(&mut self, reason: &str) {
        self.status = TxStatus::Failed;
        self.failure_reason = Some(reason.to_string());
    }
}
