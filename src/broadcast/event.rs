// Transaction events and their wire codec

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{Amount, Destination, Transaction, TxId, TxStatus};
use crate::registry::NodeId;

/// Errors that can occur while encoding or decoding events
#[derive(Error, Debug)]
pub enum EventCodecError {
    #[error("event serialization failed")]
    SerializationFailed,

    #[error("event deserialization failed")]
    DeserializationFailed,
}

/// The structured record peers exchange about a transaction.
///
/// Carries everything a peer needs to converge on the same ledger view;
/// peers apply it idempotently keyed by `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    id: TxId,
    from: NodeId,
    to: Destination,
    amount: Amount,
    fee: Amount,
    timestamp: DateTime<Utc>,
    status: TxStatus,
}

impl TransactionEvent {
    /// Snapshot a transaction record into an event
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            id: tx.id().clone(),
            from: tx.source(),
            to: tx.destination().clone(),
            amount: tx.amount(),
            fee: tx.fee(),
            timestamp: tx.timestamp(),
            status: tx.status(),
        }
    }

    pub fn id(&self) -> &TxId {
        &self.id
    }

    pub fn from(&self) -> NodeId {
        self.from
    }

    pub fn to(&self) -> &Destination {
        &self.to
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn fee(&self) -> Amount {
        self.fee
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn status(&self) -> TxStatus {
        self.status
    }

    /// Serialize for the wire
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventCodecError> {
        postcard::to_allocvec(self).map_err(|_| EventCodecError::SerializationFailed)
    }

    /// Deserialize from the wire
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EventCodecError> {
        postcard::from_bytes(bytes).map_err(|_| EventCodecError::DeserializationFailed)
    }
}
