use super::state::StateDump;
use crate::error::{IvyError, Result};
use crate::protocol::types::{ActorId, ManagerId, OfficeState};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// Out-of-band instructions for a manager, separate from protocol traffic.
#[derive(Debug)]
pub enum ManagerControl {
    /// Crash: become OVERTHROWN, dump state, stop the receive loop.
    Kill { reply: oneshot::Sender<StateDump> },
    Dump { reply: oneshot::Sender<StateDump> },
    Status { reply: oneshot::Sender<ManagerStatus> },
    /// Push a snapshot now if incumbent. Replies with the snapshot's `seq`.
    SyncNow { reply: oneshot::Sender<Result<Option<u64>>> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerStatus {
    pub id: ManagerId,
    pub office: OfficeState,
    pub version: u64,
    /// Exchanges completed successfully.
    pub requests_served: u64,
    /// Requests rejected, abandoned by a kill, or timed out.
    pub requests_failed: u64,
    pub snapshots_sent: u64,
    pub last_applied_snapshot: Option<u64>,
}

/// Cloneable handle used by the controller, the cluster and tests.
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    id: ManagerId,
    control: mpsc::UnboundedSender<ManagerControl>,
}

impl ManagerHandle {
    pub(crate) fn new(id: ManagerId, control: mpsc::UnboundedSender<ManagerControl>) -> Self {
        Self { id, control }
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub async fn kill(&self) -> Result<StateDump> {
        let (reply, rx) = oneshot::channel();
        self.request(ManagerControl::Kill { reply }, rx).await
    }

    pub async fn dump(&self) -> Result<StateDump> {
        let (reply, rx) = oneshot::channel();
        self.request(ManagerControl::Dump { reply }, rx).await
    }

    pub async fn status(&self) -> Result<ManagerStatus> {
        let (reply, rx) = oneshot::channel();
        self.request(ManagerControl::Status { reply }, rx).await
    }

    pub async fn sync_now(&self) -> Result<Option<u64>> {
        let (reply, rx) = oneshot::channel();
        self.request(ManagerControl::SyncNow { reply }, rx).await?
    }

    async fn request<T>(&self, control: ManagerControl, rx: oneshot::Receiver<T>) -> Result<T> {
        let stopped = IvyError::ActorStopped(ActorId::Manager(self.id));
        self.control.send(control).map_err(|_| stopped)?;
        rx.await
            .map_err(|_| IvyError::ActorStopped(ActorId::Manager(self.id)))
    }
}
