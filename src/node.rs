//! Storage nodes and I/O-group node selection
//!
//! The controller reports its nodes once at setup. Nodes that cannot serve
//! any protocol are pruned and the rest frozen into a [`NodeInventory`]
//! that connection requests read without locking.

use crate::controller::VolumePlacement;
use crate::error::{DriverError, DriverResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Transport protocol a node can serve volumes over
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "iSCSI")]
    Iscsi,
    #[serde(rename = "FC")]
    Fc,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Iscsi => write!(f, "iSCSI"),
            Protocol::Fc => write!(f, "FC"),
        }
    }
}

/// A controller node able to serve I/O
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageNode {
    pub id: String,
    /// Display name
    pub name: String,
    pub ipv4: Vec<Ipv4Addr>,
    pub ipv6: Vec<Ipv6Addr>,
    /// iSCSI target name (IQN) of the node
    pub iscsi_name: String,
    /// I/O group the node belongs to
    pub io_group: String,
    pub enabled_protocols: BTreeSet<Protocol>,
}

impl StorageNode {
    /// Create a node with no addresses and no enabled protocols
    pub fn new(id: impl Into<String>, name: impl Into<String>, io_group: impl Into<String>) -> Self {
        StorageNode {
            id: id.into(),
            name: name.into(),
            ipv4: Vec::new(),
            ipv6: Vec::new(),
            iscsi_name: String::new(),
            io_group: io_group.into(),
            enabled_protocols: BTreeSet::new(),
        }
    }

    pub fn with_iscsi_name(mut self, iscsi_name: impl Into<String>) -> Self {
        self.iscsi_name = iscsi_name.into();
        self
    }

    pub fn with_ipv4(mut self, addr: Ipv4Addr) -> Self {
        self.ipv4.push(addr);
        self
    }

    pub fn with_ipv6(mut self, addr: Ipv6Addr) -> Self {
        self.ipv6.push(addr);
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.enabled_protocols.insert(protocol);
        self
    }

    pub fn supports(&self, protocol: Protocol) -> bool {
        self.enabled_protocols.contains(&protocol)
    }

    /// Whether the node has what an iSCSI portal needs
    pub fn is_iscsi_capable(&self) -> bool {
        (!self.ipv4.is_empty() || !self.ipv6.is_empty()) && !self.iscsi_name.is_empty()
    }

    /// Address to advertise in the target portal: first IPv4, else first IPv6
    pub fn portal_address(&self) -> DriverResult<IpAddr> {
        self.ipv4
            .first()
            .map(|addr| IpAddr::V4(*addr))
            .or_else(|| self.ipv6.first().map(|addr| IpAddr::V6(*addr)))
            .ok_or_else(|| {
                DriverError::BackendInconsistency(format!(
                    "node {} ({}) has no IP address",
                    self.name, self.id
                ))
            })
    }
}

/// Immutable snapshot of the nodes that can serve I/O
#[derive(Debug, Clone)]
pub struct NodeInventory {
    nodes: Vec<StorageNode>,
    enabled_protocols: BTreeSet<Protocol>,
}

impl NodeInventory {
    /// Prune the controller's node list into an inventory
    ///
    /// iSCSI is enabled on every node with an IP address and an iSCSI name,
    /// and withdrawn from any node without them. Nodes left with no
    /// protocol are dropped. Controller order is preserved.
    pub fn from_nodes(nodes: Vec<StorageNode>) -> DriverResult<Self> {
        let mut enabled_protocols = BTreeSet::new();
        let mut kept = Vec::with_capacity(nodes.len());

        for mut node in nodes {
            if node.is_iscsi_capable() {
                node.enabled_protocols.insert(Protocol::Iscsi);
            } else {
                node.enabled_protocols.remove(&Protocol::Iscsi);
            }
            if node.enabled_protocols.is_empty() {
                log::info!("{} will be removed since it is not supported by the iSCSI driver", node.name);
                continue;
            }
            enabled_protocols.extend(node.enabled_protocols.iter().copied());
            kept.push(node);
        }

        if kept.is_empty() {
            log::error!("No configured nodes");
            return Err(DriverError::NoConfiguredNodes);
        }

        Ok(NodeInventory {
            nodes: kept,
            enabled_protocols,
        })
    }

    pub fn nodes(&self) -> &[StorageNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Protocols enabled on at least one node
    pub fn enabled_protocols(&self) -> &BTreeSet<Protocol> {
        &self.enabled_protocols
    }

    pub fn get(&self, id: &str) -> Option<&StorageNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Pick the node that serves a volume's traffic
    ///
    /// Candidates are the nodes in the volume's I/O group that support
    /// `protocol`. The preferred node wins when it supports the protocol;
    /// otherwise the first candidate is used and the selection is marked
    /// degraded.
    pub fn select_serving_node(
        &self,
        protocol: Protocol,
        placement: &VolumePlacement,
    ) -> DriverResult<NodeSelection<'_>> {
        let mut preferred = None;
        let mut candidates = Vec::new();
        for node in self.nodes.iter().filter(|node| node.supports(protocol)) {
            if node.id == placement.preferred_node_id {
                preferred = Some(node);
            }
            if node.io_group == placement.io_group_id {
                candidates.push(node);
            }
        }

        if candidates.is_empty() {
            log::error!(
                "No {} node found in I/O group {} for volume {}",
                protocol,
                placement.io_group_id,
                placement.volume
            );
            return Err(DriverError::NoServingNodeInGroup {
                io_group: placement.io_group_id.clone(),
                volume: placement.volume.clone(),
            });
        }

        let (node, degraded) = match preferred {
            Some(node) => (node, false),
            None => {
                log::warn!(
                    "Did not find preferred node {} for volume {}; using {} from I/O group {}",
                    placement.preferred_node_id,
                    placement.volume,
                    candidates[0].id,
                    placement.io_group_id
                );
                (candidates[0], true)
            }
        };
        let address = node.portal_address()?;

        Ok(NodeSelection {
            node,
            candidates,
            address,
            degraded,
        })
    }
}

/// Outcome of [`NodeInventory::select_serving_node`]
#[derive(Debug, Clone)]
pub struct NodeSelection<'a> {
    pub node: &'a StorageNode,
    /// Nodes in the volume's I/O group supporting the protocol
    pub candidates: Vec<&'a StorageNode>,
    pub address: IpAddr,
    /// The preferred node was not available
    pub degraded: bool,
}
