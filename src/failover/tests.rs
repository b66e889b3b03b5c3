//! Failover Module Tests
//!
//! Real manager and node actors wired over a low-jitter network. The periodic sync is
//! effectively disabled so every snapshot in these tests is an explicit `sync_now`.

#[cfg(test)]
mod tests {
    use crate::error::IvyError;
    use crate::failover::FailoverController;
    use crate::manager::{CentralManager, Directory, ManagerTimings};
    use crate::network::Network;
    use crate::node::{ManagerRoute, Node, NodeHandle};
    use crate::protocol::messages::{Message, MessageType};
    use crate::protocol::types::{ActorId, ManagerId, NodeId, OfficeState, PageId};
    use std::sync::Arc;
    use std::time::Duration;

    const PRIMARY: ManagerId = ManagerId(0);
    const BACKUP: ManagerId = ManagerId(1);

    struct Setup {
        network: Arc<Network>,
        controller: FailoverController,
        nodes: Vec<NodeHandle>,
    }

    fn setup() -> Setup {
        let network = Network::new(Duration::from_millis(2));
        let node_ids: Vec<NodeId> = (1..=2).map(NodeId).collect();
        let pages: Vec<PageId> = (1..=2).map(PageId).collect();
        let timings = ManagerTimings {
            sync_interval: Duration::from_secs(3600),
            ack_timeout: Duration::from_secs(1),
        };

        let managers = [
            (PRIMARY, BACKUP, OfficeState::Incumbent),
            (BACKUP, PRIMARY, OfficeState::Overthrown),
        ]
        .into_iter()
        .map(|(id, peer, office)| {
            let directory = Directory::new(node_ids.clone(), pages.clone());
            CentralManager::new(id, peer, office, directory, network.clone(), timings)
        })
        .collect();

        let nodes: Vec<NodeHandle> = node_ids
            .iter()
            .map(|id| {
                let (node, handle) = Node::new(
                    *id,
                    ManagerRoute::new(PRIMARY, BACKUP),
                    pages.iter().copied().collect(),
                    network.clone(),
                    Duration::from_secs(2),
                );
                tokio::spawn(node.run());
                handle
            })
            .collect();

        let controller =
            FailoverController::start(managers, nodes.clone(), Duration::from_millis(20));

        Setup {
            network,
            controller,
            nodes,
        }
    }

    // ============================================================
    // KILL
    // ============================================================

    #[tokio::test]
    async fn test_kill_redirects_every_node() {
        let mut s = setup();
        s.nodes[0].write(PageId(1), "a").await.unwrap();

        let dump = s.controller.kill(PRIMARY).await.unwrap();

        assert_eq!(dump.manager, PRIMARY);
        assert_eq!(dump.office, OfficeState::Overthrown);
        assert_eq!(dump.owner(PageId(1)).unwrap(), NodeId(1));
        assert!(!s.controller.is_alive(PRIMARY));
        for node in &s.nodes {
            assert_eq!(node.inspect().await.unwrap().current_manager, BACKUP);
        }
    }

    #[tokio::test]
    async fn test_kill_refused_when_peer_is_down() {
        let mut s = setup();
        s.controller.kill(PRIMARY).await.unwrap();

        let result = s.controller.kill(BACKUP).await;

        assert!(matches!(
            result,
            Err(IvyError::BothManagersDown {
                target: BACKUP,
                peer: PRIMARY
            })
        ));
        assert!(s.controller.is_alive(BACKUP));
        assert_eq!(s.nodes[0].inspect().await.unwrap().current_manager, BACKUP);
    }

    #[tokio::test]
    async fn test_kill_of_stopped_replica() {
        let mut s = setup();
        s.controller.kill(PRIMARY).await.unwrap();

        let result = s.controller.kill(PRIMARY).await;

        assert!(matches!(result, Err(IvyError::ManagerAlreadyDown(PRIMARY))));
    }

    #[tokio::test]
    async fn test_unknown_manager() {
        let mut s = setup();

        assert!(matches!(
            s.controller.kill(ManagerId(5)).await,
            Err(IvyError::ManagerNotFound(ManagerId(5)))
        ));
        assert!(matches!(
            s.controller.dump(ManagerId(5)).await,
            Err(IvyError::ManagerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dump_of_stopped_replica_comes_from_held_state() {
        let mut s = setup();
        s.nodes[1].write(PageId(2), "b").await.unwrap();
        s.controller.kill(PRIMARY).await.unwrap();

        let dump = s.controller.dump(PRIMARY).await.unwrap();
        let status = s.controller.status(PRIMARY).await.unwrap();

        assert_eq!(dump.owner(PageId(2)).unwrap(), NodeId(2));
        assert_eq!(status.requests_served, 1);
    }

    // ============================================================
    // RESTART
    // ============================================================

    #[tokio::test]
    async fn test_restart_of_running_replica_is_refused() {
        let mut s = setup();

        assert!(matches!(
            s.controller.restart(BACKUP),
            Err(IvyError::ManagerNotDown(BACKUP))
        ));
    }

    #[tokio::test]
    async fn test_kill_and_restart_rejoins_as_backup() {
        let mut s = setup();
        s.nodes[0].write(PageId(1), "a").await.unwrap();

        s.controller.kill_and_restart(PRIMARY).await.unwrap();

        assert!(s.controller.is_alive(PRIMARY));
        let status = s.controller.status(PRIMARY).await.unwrap();
        assert_eq!(status.office, OfficeState::Overthrown);
        // The restarted replica keeps the directory it had when it crashed.
        let dump = s.controller.dump(PRIMARY).await.unwrap();
        assert_eq!(dump.owner(PageId(1)).unwrap(), NodeId(1));
    }

    #[tokio::test]
    async fn test_traffic_queued_while_down_is_discarded() {
        let mut s = setup();
        s.controller.kill(PRIMARY).await.unwrap();

        let stray = Message::new(
            MessageType::ReadReq,
            ActorId::Node(NodeId(1)),
            NodeId(1),
            PageId(1),
        );
        s.network.send(ActorId::Manager(PRIMARY), stray).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        s.controller.restart(PRIMARY).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let status = s.controller.status(PRIMARY).await.unwrap();
        assert_eq!(status.requests_served, 0);
        assert_eq!(status.office, OfficeState::Overthrown);
    }

    #[tokio::test]
    async fn test_snapshot_queued_while_down_is_applied_on_restart() {
        let mut s = setup();
        s.controller.kill(PRIMARY).await.unwrap();

        s.nodes[0].write(PageId(2), "via backup").await.unwrap();
        let seq = s.controller.handle(BACKUP).unwrap().sync_now().await.unwrap();
        assert_eq!(seq, Some(1));

        s.controller.restart(PRIMARY).unwrap();
        let mut applied = None;
        for _ in 0..50 {
            applied = s.controller.status(PRIMARY).await.unwrap().last_applied_snapshot;
            if applied.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(applied, Some(1));
        let dump = s.controller.dump(PRIMARY).await.unwrap();
        assert_eq!(dump.owner(PageId(2)).unwrap(), NodeId(1));
    }

    #[tokio::test]
    async fn test_shutdown_stops_every_replica() {
        let mut s = setup();

        s.controller.shutdown().await;

        assert!(!s.controller.is_alive(PRIMARY));
        assert!(!s.controller.is_alive(BACKUP));
        assert!(s.controller.dump(BACKUP).await.is_ok());
    }
}
