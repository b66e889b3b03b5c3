use crate::error::{IvyError, Result};
use crate::manager::{CentralManager, ManagerHandle, ManagerStatus, StateDump};
use crate::node::NodeHandle;
use crate::protocol::types::{ManagerId, OfficeState};

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A replica is either listening on its own task or held here after a crash.
enum Replica {
    Running(JoinHandle<CentralManager>),
    Down(CentralManager),
}

/// Owns both manager replicas and drives crash/restart on behalf of the benchmark.
pub struct FailoverController {
    replicas: BTreeMap<ManagerId, Replica>,
    handles: BTreeMap<ManagerId, ManagerHandle>,
    peers: BTreeMap<ManagerId, ManagerId>,
    nodes: Vec<NodeHandle>,
    settle_delay: Duration,
}

impl FailoverController {
    /// Spawns the receive loop of both replicas.
    pub fn start(
        managers: Vec<(CentralManager, ManagerHandle)>,
        nodes: Vec<NodeHandle>,
        settle_delay: Duration,
    ) -> Self {
        let mut replicas = BTreeMap::new();
        let mut handles = BTreeMap::new();
        let ids: Vec<ManagerId> = managers.iter().map(|(m, _)| m.id()).collect();

        for (manager, handle) in managers {
            let id = manager.id();
            tracing::info!("[Failover] starting CM {} as {}", id, manager.office());
            replicas.insert(id, Replica::Running(tokio::spawn(manager.run())));
            handles.insert(id, handle);
        }

        // Replicas come in a primary/backup pair.
        let mut peers = BTreeMap::new();
        if let [a, b] = ids.as_slice() {
            peers.insert(*a, *b);
            peers.insert(*b, *a);
        }

        Self {
            replicas,
            handles,
            peers,
            nodes,
            settle_delay,
        }
    }

    pub fn is_alive(&self, id: ManagerId) -> bool {
        matches!(self.replicas.get(&id), Some(Replica::Running(_)))
    }

    pub fn handle(&self, id: ManagerId) -> Result<&ManagerHandle> {
        self.handles.get(&id).ok_or(IvyError::ManagerNotFound(id))
    }

    pub fn manager_ids(&self) -> Vec<ManagerId> {
        self.replicas.keys().copied().collect()
    }

    fn peer(&self, id: ManagerId) -> Result<ManagerId> {
        self.peers.get(&id).copied().ok_or(IvyError::ManagerNotFound(id))
    }

    /// Crashes `id`: stops its loop, collects the final dump and tells every node to
    /// address the peer from now on.
    ///
    /// Refused while the peer is itself down, since nodes would be left with no
    /// replica to fail over to.
    pub async fn kill(&mut self, id: ManagerId) -> Result<StateDump> {
        let peer = self.peer(id)?;
        if !self.is_alive(id) {
            return Err(IvyError::ManagerAlreadyDown(id));
        }
        if !self.is_alive(peer) {
            return Err(IvyError::BothManagersDown { target: id, peer });
        }

        tracing::info!("**************************************************");
        tracing::info!(" KILLING CM {}", id);
        tracing::info!("**************************************************");

        let handle = self.handle(id)?.clone();
        let Some(Replica::Running(task)) = self.replicas.remove(&id) else {
            return Err(IvyError::ManagerAlreadyDown(id));
        };
        let reported = handle.kill().await;
        let manager = task.await?;
        let dump = match reported {
            Ok(dump) => dump,
            Err(e) => {
                tracing::warn!("[Failover] CM {} stopped without reporting: {}", id, e);
                manager.state_dump()
            }
        };
        self.replicas.insert(id, Replica::Down(manager));

        for node in &self.nodes {
            if let Err(e) = node.notify_manager_death(id).await {
                tracing::warn!("[Failover] Node {} kept its addressing: {}", node.id(), e);
            }
        }

        Ok(dump)
    }

    /// Brings a killed replica back as a passive listener.
    pub fn restart(&mut self, id: ManagerId) -> Result<()> {
        let mut manager = match self.replicas.remove(&id) {
            Some(Replica::Down(manager)) => manager,
            Some(running) => {
                self.replicas.insert(id, running);
                return Err(IvyError::ManagerNotDown(id));
            }
            None => return Err(IvyError::ManagerNotFound(id)),
        };

        manager.prepare_restart();
        debug_assert_eq!(manager.office(), OfficeState::Overthrown);
        self.replicas
            .insert(id, Replica::Running(tokio::spawn(manager.run())));
        Ok(())
    }

    pub async fn kill_and_restart(&mut self, id: ManagerId) -> Result<StateDump> {
        let dump = self.kill(id).await?;
        tokio::time::sleep(self.settle_delay).await;
        self.restart(id)?;
        Ok(dump)
    }

    /// Current table of `id`, served from the held replica when it is down.
    pub async fn dump(&self, id: ManagerId) -> Result<StateDump> {
        match self.replicas.get(&id) {
            Some(Replica::Running(_)) => self.handle(id)?.dump().await,
            Some(Replica::Down(manager)) => Ok(manager.state_dump()),
            None => Err(IvyError::ManagerNotFound(id)),
        }
    }

    pub async fn status(&self, id: ManagerId) -> Result<ManagerStatus> {
        match self.replicas.get(&id) {
            Some(Replica::Running(_)) => self.handle(id)?.status().await,
            Some(Replica::Down(manager)) => Ok(manager.status()),
            None => Err(IvyError::ManagerNotFound(id)),
        }
    }

    /// Stops every running replica, bypassing the last-replica guard.
    pub async fn shutdown(&mut self) {
        for id in self.manager_ids() {
            if !self.is_alive(id) {
                continue;
            }
            let Some(Replica::Running(task)) = self.replicas.remove(&id) else {
                continue;
            };
            if let Ok(handle) = self.handle(id) {
                let _ = handle.kill().await;
            }
            match task.await {
                Ok(manager) => {
                    self.replicas.insert(id, Replica::Down(manager));
                }
                Err(e) => tracing::error!("[Failover] CM {} task failed: {}", id, e),
            }
        }
    }
}
