// Transfer requests - the intent a caller submits to the engine

use serde::{Deserialize, Serialize};

use crate::ledger::{Amount, Destination};
use crate::registry::NodeId;

/// A transfer intent: who pays, where the value goes, how much.
///
/// The destination tag decides the branch: another registry node, or an
/// address outside the mesh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    source: NodeId,
    destination: Destination,
    amount: Amount,
}

impl TransferRequest {
    /// Transfer between two registry nodes
    pub fn internal(source: NodeId, dest: NodeId, amount: Amount) -> Self {
        Self {
            source,
            destination: Destination::Node(dest),
            amount,
        }
    }

    /// Transfer to an address outside the registry
    pub fn external(source: NodeId, address: &str, amount: Amount) -> Self {
        Self {
            source,
            destination: Destination::external(address),
            amount,
        }
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_variants() {
        let internal = TransferRequest::internal(NodeId::new(1), NodeId::new(2), Amount::ZERO);
        assert!(!internal.destination().is_external());

        let external = TransferRequest::external(NodeId::new(1), "bc1qaway", Amount::ZERO);
        assert!(external.destination().is_external());
        assert_eq!(external.source(), NodeId::new(1));
    }
}
