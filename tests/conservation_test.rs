// Conservation Tests
// The explicit conservation law: across any sequence of internal
// transfers, total funds plus destroyed fees never change.

use std::sync::Arc;

use walletmesh::ledger::{Amount, LedgerConfig, LedgerStore};
use walletmesh::registry::{NodeConfig, NodeId, NodeRegistry};

fn coins(n: u64) -> Amount {
    Amount::from_coins(n).unwrap()
}

fn mesh_store(count: u32) -> LedgerStore {
    let registry = Arc::new(NodeRegistry::new(NodeConfig::simulated_mesh(
        count,
        coins(1000),
    )));
    LedgerStore::new(registry, LedgerConfig::default())
}

#[test]
fn test_conservation_over_many_internal_transfers() {
    let mut store = mesh_store(13);
    let before = store.total_funds();

    // A deterministic but uneven walk over node pairs and amounts
    let mut sent = 0usize;
    for step in 0u64..200 {
        let from = NodeId::new((step % 13 + 1) as u32);
        let to = NodeId::new((step * 7 % 13 + 1) as u32);
        let amount = Amount::from_minor_units((step + 1) * 37_000_000 % 900_000_000 + 1);

        if store.apply_internal_transfer(from, to, amount).is_ok() {
            sent += 1;
        }

        let now = store.total_funds().saturating_add(store.fees_collected());
        assert_eq!(now, before, "conservation broken after step {}", step);
    }
    assert!(sent > 0);
}

#[test]
fn test_conservation_unaffected_by_status_transitions() {
    let mut store = mesh_store(3);
    let before = store.total_funds();

    let tx1 = store
        .apply_internal_transfer(NodeId::new(1), NodeId::new(2), coins(100))
        .unwrap();
    let tx2 = store
        .apply_internal_transfer(NodeId::new(2), NodeId::new(3), coins(50))
        .unwrap();

    store.mark_completed(tx1.id()).unwrap();
    store.mark_failed(tx2.id(), "cancelled").unwrap();

    let after = store.total_funds().saturating_add(store.fees_collected());
    assert_eq!(after, before);
}

#[test]
fn test_pending_external_funds_still_counted() {
    let mut store = mesh_store(2);
    let before = store.total_funds();

    // While an external transfer is pending, its debit sits in the
    // pending balance and is still part of the system total
    store
        .apply_external_debit(NodeId::new(1), coins(200), "bc1qgateway")
        .unwrap();

    let after = store.total_funds().saturating_add(store.fees_collected());
    assert_eq!(after, before);
}

#[test]
fn test_fees_accumulate_exactly() {
    let mut store = mesh_store(2);

    for _ in 0..10 {
        store
            .apply_internal_transfer(NodeId::new(1), NodeId::new(2), coins(50))
            .unwrap();
    }

    // Ten transfers of 50 at 0.0001 each destroy exactly 0.05
    assert_eq!(store.fees_collected(), Amount::parse("0.05").unwrap());
}
