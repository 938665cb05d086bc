// Broadcast module - transaction event fan-out between peers

mod bus;
mod event;

pub use bus::{BroadcastBus, BusConfig, EventHandler};
pub use event::{EventCodecError, TransactionEvent};
