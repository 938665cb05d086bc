// Node identity and static configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ledger::Amount;

/// Unique identifier for a wallet node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Simulated network address of a node, used for display and ops only
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAddress {
    host: String,
    port: u16,
}

impl NetworkAddress {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Static configuration for a single node, consumed at startup
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub id: NodeId,
    pub name: String,
    pub address: NetworkAddress,
    pub initial_balance: Amount,
}

impl NodeConfig {
    pub fn new(id: u32, name: &str, address: NetworkAddress, initial_balance: Amount) -> Self {
        Self {
            id: NodeId::new(id),
            name: name.to_string(),
            address,
            initial_balance,
        }
    }

    /// Build a simulated mesh of `count` nodes on a shared host,
    /// each funded with the same initial balance.
    pub fn simulated_mesh(count: u32, initial_balance: Amount) -> Vec<NodeConfig> {
        (1..=count)
            .map(|i| {
                NodeConfig::new(
                    i,
                    &format!("Node {}", i),
                    NetworkAddress::new("127.0.0.1", 3000 + i as u16),
                    initial_balance,
                )
            })
            .collect()
    }
}

/// A wallet node: immutable identity plus an operator-toggled connectivity flag.
///
/// The balance itself lives in the ledger; the registry only carries the
/// identity, the display address and the connectivity state.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    name: String,
    address: NetworkAddress,
    wallet_address: String,
    initial_balance: Amount,
    connected: AtomicBool,
}

impl Node {
    pub fn from_config(config: NodeConfig) -> Self {
        Self {
            id: config.id,
            name: config.name,
            address: config.address,
            wallet_address: simulated_wallet_address(),
            initial_balance: config.initial_balance,
            connected: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &NetworkAddress {
        &self.address
    }

    /// Simulated wallet address, used as the from-address for external settlement
    pub fn wallet_address(&self) -> &str {
        &self.wallet_address
    }

    pub fn initial_balance(&self) -> Amount {
        self.initial_balance
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Toggle connectivity; returns the previous state
    pub fn set_connected(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::SeqCst)
    }
}

/// Generate a simulated bech32-looking wallet address
fn simulated_wallet_address() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(13)
        .map(char::from)
        .collect();
    format!("bc1{}", suffix.to_lowercase())
}
