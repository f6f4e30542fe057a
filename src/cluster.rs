//! Cluster membership collaborator.
//!
//! The host does not run a consensus protocol; it only relays what an
//! embedded cluster implementation reports.

use serde::Serialize;

use crate::error::ClusterError;

/// One member of the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterMember {
    pub id: String,
    pub name: String,
    pub peer_urls: Vec<String>,
}

/// Read-only view of the cluster this node belongs to.
pub trait ClusterInfo: Send + Sync {
    fn node_id(&self) -> String;

    fn node_name(&self) -> String;

    fn leader_id(&self) -> String;

    fn cluster_members(&self) -> Result<Vec<ClusterMember>, ClusterError>;
}
