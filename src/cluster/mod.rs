//! Cluster Module
//!
//! Assembles the fixed universe: one simulated network, the manager replica pair and
//! `node_count` nodes sharing `page_count` pages.
//!
//! ## Submodules
//! - **`dump`**: merged manager/owner tables and the coherence check.
//! - **`benchmark`**: the canned fault scenarios driven against a running cluster.

pub mod benchmark;
pub mod dump;

pub use benchmark::{BenchmarkReport, Scenario};
pub use dump::{ClusterDump, PageState};

use crate::config::IvyConfig;
use crate::error::{IvyError, Result};
use crate::failover::FailoverController;
use crate::manager::{CentralManager, Directory, ManagerTimings};
use crate::network::Network;
use crate::node::{ManagerRoute, Node, NodeHandle, NodeSnapshot};
use crate::protocol::types::{ManagerId, NodeId, OfficeState, PageId};

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const PRIMARY: ManagerId = ManagerId(0);
pub const BACKUP: ManagerId = ManagerId(1);

pub struct Cluster {
    config: IvyConfig,
    network: Arc<Network>,
    controller: FailoverController,
    nodes: BTreeMap<NodeId, NodeHandle>,
    node_tasks: Vec<JoinHandle<()>>,
}

impl Cluster {
    /// Spawns every actor. Manager 0 starts INCUMBENT, manager 1 OVERTHROWN, and every
    /// node addresses manager 0.
    pub fn start(config: &IvyConfig) -> Result<Self> {
        config.validate()?;

        let network = Network::new(config.max_network_delay);
        let node_ids: Vec<NodeId> = (1..=config.node_count).map(NodeId).collect();
        let pages: Vec<PageId> = (1..=config.page_count).map(PageId).collect();
        let timings = ManagerTimings {
            sync_interval: config.sync_interval,
            ack_timeout: config.ack_timeout,
        };

        let managers = [
            (PRIMARY, BACKUP, OfficeState::Incumbent),
            (BACKUP, PRIMARY, OfficeState::Overthrown),
        ]
        .into_iter()
        .map(|(id, peer, office)| {
            let directory = Directory::new(node_ids.iter().copied(), pages.iter().copied());
            CentralManager::new(id, peer, office, directory, network.clone(), timings)
        })
        .collect();

        let mut nodes = BTreeMap::new();
        let mut node_tasks = Vec::with_capacity(node_ids.len());
        for id in &node_ids {
            let (node, handle) = Node::new(
                *id,
                ManagerRoute::new(PRIMARY, BACKUP),
                pages.iter().copied().collect(),
                network.clone(),
                config.reply_timeout,
            );
            node_tasks.push(tokio::spawn(node.run()));
            nodes.insert(*id, handle);
        }

        let handles = nodes.values().cloned().collect();
        let controller = FailoverController::start(managers, handles, config.settle_delay);

        tracing::info!(
            "Cluster started with {} nodes and {} pages",
            config.node_count,
            config.page_count
        );

        Ok(Self {
            config: config.clone(),
            network,
            controller,
            nodes,
            node_tasks,
        })
    }

    pub fn config(&self) -> &IvyConfig {
        &self.config
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn controller(&self) -> &FailoverController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut FailoverController {
        &mut self.controller
    }

    pub fn node(&self, id: NodeId) -> Result<&NodeHandle> {
        self.nodes.get(&id).ok_or(IvyError::NodeNotFound(id))
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    async fn node_snapshots(&self) -> Result<BTreeMap<NodeId, NodeSnapshot>> {
        let mut snapshots = BTreeMap::new();
        for (id, node) in &self.nodes {
            snapshots.insert(*id, node.inspect().await?);
        }
        Ok(snapshots)
    }

    /// The table of `manager` joined with its owners' access types.
    pub async fn state_dump(&self, manager: ManagerId) -> Result<ClusterDump> {
        let dump = self.controller.dump(manager).await?;
        let snapshots = self.node_snapshots().await?;
        Ok(ClusterDump::merge(&dump, &snapshots))
    }

    /// Checks the node caches against `manager`'s table. Only meaningful while no
    /// request is in flight.
    pub async fn verify_coherence(&self, manager: ManagerId) -> Result<()> {
        let dump = self.controller.dump(manager).await?;
        let snapshots = self.node_snapshots().await?;
        dump::verify(&dump, &snapshots)
    }

    /// Stops both replicas and every node.
    pub async fn shutdown(mut self) {
        self.controller.shutdown().await;
        for task in &self.node_tasks {
            task.abort();
        }
        tracing::info!("Cluster stopped");
    }
}
