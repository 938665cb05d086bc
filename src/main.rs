// walletmesh binary - boots a simulated mesh and runs a demo transfer

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use walletmesh::broadcast::{BroadcastBus, BusConfig};
use walletmesh::engine::{
    EngineConfig, LogNotifier, MockExternalSettlement, TransferEngine, TransferRequest,
};
use walletmesh::ledger::{Amount, FeeRate, LedgerConfig, LedgerStore};
use walletmesh::registry::{NodeConfig, NodeId, NodeRegistry};

#[derive(Parser, Debug)]
#[command(name = "walletmesh", about = "Multi-node wallet mesh simulator")]
struct Args {
    /// Number of simulated nodes
    #[arg(long, default_value_t = 13)]
    nodes: u32,

    /// Initial balance per node, in coins
    #[arg(long, default_value = "1000")]
    initial_balance: String,

    /// Fee rate in parts per million (100 = 0.0001)
    #[arg(long, default_value_t = 100)]
    fee_ppm: u32,

    /// Simulated settlement delay in milliseconds
    #[arg(long, default_value_t = 3000)]
    settlement_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let initial_balance = Amount::parse(&args.initial_balance)
        .map_err(|e| format!("invalid --initial-balance: {}", e))?;

    let registry = Arc::new(NodeRegistry::new(NodeConfig::simulated_mesh(
        args.nodes,
        initial_balance,
    )));
    let ledger = Arc::new(Mutex::new(LedgerStore::new(
        Arc::clone(&registry),
        LedgerConfig::new().with_fee_rate(FeeRate::from_ppm(args.fee_ppm)),
    )));
    let bus = Arc::new(BroadcastBus::new(Arc::clone(&registry), BusConfig::default()));
    let engine = TransferEngine::new(
        Arc::clone(&registry),
        ledger,
        Arc::clone(&bus),
        Arc::new(MockExternalSettlement::new().with_success()),
        Arc::new(LogNotifier),
        EngineConfig::new().with_settlement_delay(Duration::from_millis(args.settlement_delay_ms)),
    );

    // Wire every node into the bus so broadcasts have somewhere to go
    for node in registry.list() {
        let rx = bus.register_peer(node.id()).await;
        BroadcastBus::attach_handler(node.id(), rx, engine.remote_applier());
    }

    info!(nodes = registry.len(), "mesh started");
    for node in registry.list() {
        info!(
            node = %node.id(),
            name = node.name(),
            address = %node.address(),
            wallet = node.wallet_address(),
            balance = %node.initial_balance(),
            "node online"
        );
    }

    // Demo: move 100 coins from node 1 to node 2 and wait for settlement
    let source = NodeId::new(1);
    let dest = NodeId::new(2);
    let amount = Amount::from_coins(100).ok_or("amount out of range")?;

    let fee = engine.fee_preview(amount).await;
    info!(%amount, %fee, "submitting demo transfer");

    let tx = engine
        .submit(TransferRequest::internal(source, dest, amount))
        .await
        .map_err(|e| format!("transfer failed: {}", e))?;

    tokio::time::sleep(Duration::from_millis(args.settlement_delay_ms + 200)).await;

    for id in [source, dest] {
        let balance = engine
            .balance(id)
            .await
            .map_err(|e| format!("balance query failed: {}", e))?;
        info!(node = %id, %balance, "final balance");
    }
    for tx in engine.history(source).await {
        info!(
            tx = %tx.id(),
            status = %tx.status(),
            amount = %tx.amount(),
            fee = %tx.fee(),
            "history entry"
        );
    }

    info!(tx = %tx.id(), "demo complete");
    Ok(())
}
