// Registry module - the fixed node set everything else references

mod node;
#[allow(clippy::module_inception)]
mod registry;

pub use node::{NetworkAddress, Node, NodeConfig, NodeId};
pub use registry::{NodeRegistry, RegistryError};
