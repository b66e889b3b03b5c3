//! Error Types
//!
//! Every failure the protocol can surface to a caller. Orphaned round trips become
//! `ReplyTimeout`, lookups outside the fixed node/page universe become explicit
//! `*NotFound` variants instead of undefined reads.

use crate::protocol::messages::MessageType;
use crate::protocol::types::{ActorId, ManagerId, NodeId, PageId};

pub type Result<T> = std::result::Result<T, IvyError>;

#[derive(Debug, thiserror::Error)]
pub enum IvyError {
    #[error("page {0} is not part of the page universe")]
    PageNotFound(PageId),

    #[error("node {0} is not registered")]
    NodeNotFound(NodeId),

    #[error("manager {0} is not registered")]
    ManagerNotFound(ManagerId),

    #[error("no endpoint registered for {0}")]
    ActorNotFound(ActorId),

    #[error("{0} has stopped and no longer accepts requests")]
    ActorStopped(ActorId),

    #[error("{actor} timed out waiting for {expected} on page {page}")]
    ReplyTimeout {
        actor: ActorId,
        expected: MessageType,
        page: PageId,
    },

    #[error("{holder} was asked for page {page} but does not hold it")]
    PageNotHeld { page: PageId, holder: ActorId },

    #[error("manager {manager} was killed while serving page {page}")]
    ExchangeAbandoned { manager: ManagerId, page: PageId },

    #[error("death notice for manager {dead} ignored, node already addresses manager {current}")]
    StaleDeathNotice { dead: ManagerId, current: ManagerId },

    #[error("refusing to stop manager {target}: peer manager {peer} is already down")]
    BothManagersDown { target: ManagerId, peer: ManagerId },

    #[error("manager {0} is already down")]
    ManagerAlreadyDown(ManagerId),

    #[error("manager {0} is running")]
    ManagerNotDown(ManagerId),

    #[error("coherence violation: {0}")]
    CoherenceViolation(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("actor task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}
