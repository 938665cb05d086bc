// walletmesh - a multi-node wallet bookkeeping simulator
//
// A fixed set of wallet nodes exchange value internally or with external
// addresses. The ledger owns all balance mutations and enforces the
// conservation law (fees are destroyed, not credited); the engine drives
// the PENDING -> COMPLETED/FAILED lifecycle; the bus fans committed events
// out to peers.
//
// Known limits, by design:
// - events are FIFO per origin but have no cross-origin total order
//   (no consensus);
// - state is in-memory only: a transaction whose settlement timer never
//   fires because the process died stays PENDING after restart.

pub mod broadcast;
pub mod engine;
pub mod ledger;
pub mod registry;
