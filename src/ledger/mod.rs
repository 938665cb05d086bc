// Ledger module - balances, fees and transaction lifecycle

mod amount;
mod store;
mod transaction;

pub use amount::{Amount, AmountError, FeeRate, COIN};
pub use store::{LedgerConfig, LedgerStore, RemoteApply, TransferError};
pub use transaction::{Destination, Transaction, TxId, TxStatus};
