// Engine module - transfer orchestration and external collaborators

#[allow(clippy::module_inception)]
mod engine;
mod notifier;
mod request;
mod settlement;

pub use engine::{EngineConfig, RemoteApplier, TransferEngine};
pub use notifier::{LogNotifier, MockNotifier, Notifier};
pub use request::TransferRequest;
pub use settlement::{
    ExternalSettlement, MockExternalSettlement, SettlementError, SettlementReceipt,
};
