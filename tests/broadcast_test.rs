// Broadcast Tests
// Fan-out rules, idempotent peer application and cross-node convergence

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use walletmesh::broadcast::{BroadcastBus, BusConfig, TransactionEvent};
use walletmesh::engine::{
    EngineConfig, LogNotifier, MockExternalSettlement, TransferEngine, TransferRequest,
};
use walletmesh::ledger::{
    Amount, LedgerConfig, LedgerStore, RemoteApply, TxStatus,
};
use walletmesh::registry::{NodeConfig, NodeId, NodeRegistry};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn coins(n: u64) -> Amount {
    Amount::from_coins(n).unwrap()
}

fn registry(count: u32) -> Arc<NodeRegistry> {
    Arc::new(NodeRegistry::new(NodeConfig::simulated_mesh(
        count,
        coins(1000),
    )))
}

/// A standalone "process": its own registry view, ledger, bus and engine
fn standalone_engine(registry: Arc<NodeRegistry>, bus: Arc<BroadcastBus>) -> TransferEngine {
    let ledger = Arc::new(Mutex::new(LedgerStore::new(
        Arc::clone(&registry),
        LedgerConfig::default(),
    )));
    TransferEngine::new(
        registry,
        ledger,
        bus,
        Arc::new(MockExternalSettlement::new().with_success()),
        Arc::new(LogNotifier),
        EngineConfig::new().with_settlement_delay(Duration::from_millis(10)),
    )
}

// ============================================================================
// IDEMPOTENT PEER APPLICATION
// ============================================================================

#[tokio::test]
async fn test_remote_apply_is_idempotent_by_id() {
    let reg = registry(3);
    let mut local = LedgerStore::new(Arc::clone(&reg), LedgerConfig::default());
    let mut remote = LedgerStore::new(reg, LedgerConfig::default());

    let tx = remote
        .apply_internal_transfer(NodeId::new(1), NodeId::new(2), coins(10))
        .unwrap();
    let event = TransactionEvent::from_transaction(&tx);

    assert_eq!(local.apply_remote(&event), RemoteApply::Inserted);
    assert_eq!(local.apply_remote(&event), RemoteApply::Unchanged);
    assert_eq!(local.apply_remote(&event), RemoteApply::Unchanged);

    // One record, visible in both parties' histories
    assert_eq!(local.transaction_count(), 1);
    assert_eq!(local.history(NodeId::new(1)).count(), 1);
    assert_eq!(local.history(NodeId::new(2)).count(), 1);
    // And no balance movement: the originator owns the mutation
    assert_eq!(local.balance(NodeId::new(1)).unwrap(), coins(1000));
}

#[tokio::test]
async fn test_remote_status_update_converges() {
    let reg = registry(3);
    let mut local = LedgerStore::new(Arc::clone(&reg), LedgerConfig::default());
    let mut remote = LedgerStore::new(reg, LedgerConfig::default());

    let tx = remote
        .apply_internal_transfer(NodeId::new(1), NodeId::new(2), coins(10))
        .unwrap();
    let pending = TransactionEvent::from_transaction(&tx);
    local.apply_remote(&pending);

    remote.mark_completed(tx.id()).unwrap();
    let completed =
        TransactionEvent::from_transaction(remote.get_transaction(tx.id()).unwrap());

    assert_eq!(local.apply_remote(&completed), RemoteApply::Updated);
    assert_eq!(
        local.get_transaction(tx.id()).unwrap().status(),
        TxStatus::Completed
    );

    // A late PENDING redelivery never downgrades the terminal state
    assert_eq!(local.apply_remote(&pending), RemoteApply::Unchanged);
    assert_eq!(
        local.get_transaction(tx.id()).unwrap().status(),
        TxStatus::Completed
    );
}

// ============================================================================
// CONVERGENCE ACROSS CONCURRENT ORIGINS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_origins_observed_exactly_once_each() {
    // Two "processes" A and B share a bus; each submits one transfer.
    // Every peer must end up having applied both transactions exactly
    // once, whatever the relative order of arrival.
    let reg = registry(2);
    let bus = Arc::new(BroadcastBus::new(Arc::clone(&reg), BusConfig::default()));

    let engine_a = standalone_engine(Arc::clone(&reg), Arc::clone(&bus));
    let engine_b = standalone_engine(Arc::clone(&reg), Arc::clone(&bus));

    let rx_a = bus.register_peer(NodeId::new(1)).await;
    let rx_b = bus.register_peer(NodeId::new(2)).await;
    BroadcastBus::attach_handler(NodeId::new(1), rx_a, engine_a.remote_applier());
    BroadcastBus::attach_handler(NodeId::new(2), rx_b, engine_b.remote_applier());

    let t1 = engine_a
        .submit(TransferRequest::internal(
            NodeId::new(1),
            NodeId::new(2),
            coins(10),
        ))
        .await
        .unwrap();
    let t2 = engine_b
        .submit(TransferRequest::internal(
            NodeId::new(2),
            NodeId::new(1),
            coins(20),
        ))
        .await
        .unwrap();

    // Let settlement fire and the handlers drain their channels
    tokio::time::sleep(Duration::from_millis(100)).await;

    for engine in [&engine_a, &engine_b] {
        let ledger = engine.ledger().lock().await;
        let local_t1 = ledger.get_transaction(t1.id()).unwrap();
        let local_t2 = ledger.get_transaction(t2.id()).unwrap();
        assert_eq!(local_t1.status(), TxStatus::Completed);
        assert_eq!(local_t2.status(), TxStatus::Completed);
        // Exactly once: each id appears a single time per history
        assert_eq!(
            ledger
                .history(NodeId::new(1))
                .filter(|tx| tx.id() == t1.id())
                .count(),
            1
        );
        assert_eq!(
            ledger
                .history(NodeId::new(1))
                .filter(|tx| tx.id() == t2.id())
                .count(),
            1
        );
    }
}

// ============================================================================
// FAN-OUT RULES
// ============================================================================

#[tokio::test]
async fn test_originator_excluded_from_fanout() {
    let reg = registry(3);
    let bus = BroadcastBus::new(Arc::clone(&reg), BusConfig::default());

    let mut rx1 = bus.register_peer(NodeId::new(1)).await;
    let mut rx2 = bus.register_peer(NodeId::new(2)).await;
    let mut rx3 = bus.register_peer(NodeId::new(3)).await;

    let mut store = LedgerStore::new(reg, LedgerConfig::default());
    let tx = store
        .apply_internal_transfer(NodeId::new(1), NodeId::new(2), coins(1))
        .unwrap();
    let event = TransactionEvent::from_transaction(&tx);

    let delivered = bus.publish(NodeId::new(1), &event).await;
    assert_eq!(delivered, 2);
    assert!(rx1.try_recv().is_err());
    assert_eq!(rx2.try_recv().unwrap().id(), tx.id());
    assert_eq!(rx3.try_recv().unwrap().id(), tx.id());
}

#[tokio::test]
async fn test_no_replay_for_late_peers() {
    let reg = registry(3);
    let bus = BroadcastBus::new(Arc::clone(&reg), BusConfig::default());

    let mut store = LedgerStore::new(reg, LedgerConfig::default());
    let tx = store
        .apply_internal_transfer(NodeId::new(1), NodeId::new(2), coins(1))
        .unwrap();
    let event = TransactionEvent::from_transaction(&tx);

    bus.publish(NodeId::new(1), &event).await;

    // A peer registering after publish gets nothing: no backlog
    let mut rx_late = bus.register_peer(NodeId::new(3)).await;
    assert!(rx_late.try_recv().is_err());
}

#[tokio::test]
async fn test_wire_roundtrip_between_peers() {
    let reg = registry(2);
    let mut store = LedgerStore::new(reg, LedgerConfig::default());
    let tx = store
        .apply_internal_transfer(NodeId::new(1), NodeId::new(2), coins(3))
        .unwrap();

    let event = TransactionEvent::from_transaction(&tx);
    let bytes = event.to_bytes().unwrap();
    let decoded = TransactionEvent::from_bytes(&bytes).unwrap();

    assert_eq!(decoded, event);
    assert_eq!(decoded.amount(), coins(3));
}
