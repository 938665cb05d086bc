// Broadcast Bus - fans transaction events out to connected peers
//
// Delivery is at-most-once per connected peer at publish time: no backlog,
// no replay on reconnect. Events from one origin arrive in commit order
// (FIFO per origin), but there is no cross-origin total order - concurrent
// transfers from different nodes may be observed in different relative
// orders by different peers. That weak-consistency property is by contract,
// not a bug; this system does not solve consensus.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::broadcast::event::TransactionEvent;
use crate::registry::{NodeId, NodeRegistry};

/// Handler invoked once per inbound peer event
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, event: TransactionEvent);
}

/// Configuration for the broadcast bus
#[derive(Clone, Copy, Debug)]
pub struct BusConfig {
    /// Per-peer channel capacity; a full channel drops the event for
    /// that peer rather than blocking the publisher
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

impl BusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

/// Fans out transaction events to every connected peer except the
/// originator. Each peer has its own bounded channel, so a slow or dead
/// peer never delays the others or the publisher.
pub struct BroadcastBus {
    registry: Arc<NodeRegistry>,
    peers: Mutex<HashMap<NodeId, mpsc::Sender<TransactionEvent>>>,
    config: BusConfig,
}

impl BroadcastBus {
    pub fn new(registry: Arc<NodeRegistry>, config: BusConfig) -> Self {
        Self {
            registry,
            peers: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Register a peer connection; the returned receiver yields the events
    /// published while the peer stays registered and connected
    pub async fn register_peer(&self, peer: NodeId) -> mpsc::Receiver<TransactionEvent> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        self.peers.lock().await.insert(peer, tx);
        rx
    }

    /// Drop a peer connection; returns whether it was registered
    pub async fn disconnect_peer(&self, peer: NodeId) -> bool {
        self.peers.lock().await.remove(&peer).is_some()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.lock().await.len()
    }

    /// Publish an event to every connected peer except the originator.
    ///
    /// Never blocks on a slow peer: a full channel drops that peer's copy,
    /// a closed channel unregisters the peer. Returns the delivery count.
    pub async fn publish(&self, origin: NodeId, event: &TransactionEvent) -> usize {
        let mut peers = self.peers.lock().await;
        let mut delivered = 0;
        let mut dead: Vec<NodeId> = Vec::new();

        for (peer, sender) in peers.iter() {
            if *peer == origin {
                continue;
            }
            if !self.registry.is_connected(*peer) {
                continue;
            }
            match sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(peer = %peer, tx = %event.id(), "peer channel full, dropping event");
                }
                Err(TrySendError::Closed(_)) => dead.push(*peer),
            }
        }

        for peer in dead {
            debug!(peer = %peer, "removing closed peer channel");
            peers.remove(&peer);
        }

        delivered
    }

    /// Drive a peer's receive side: invoke the handler once per inbound
    /// event until the channel closes
    pub fn attach_handler(
        peer: NodeId,
        mut rx: mpsc::Receiver<TransactionEvent>,
        handler: Arc<dyn EventHandler>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler.on_event(event).await;
            }
            debug!(peer = %peer, "peer receive loop ended");
        })
    }
}
