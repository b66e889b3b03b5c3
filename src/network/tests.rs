//! Network Module Tests
//!
//! ## Test Scopes
//! - **Registry**: lookups of unknown endpoints fail explicitly.
//! - **Routing**: messages land on the request or response queue by type.
//! - **Accounting**: every accepted send is counted.

#[cfg(test)]
mod tests {
    use crate::error::IvyError;
    use crate::network::Network;
    use crate::protocol::messages::{Message, MessageType, Snapshot};
    use crate::protocol::types::{ActorId, ManagerId, NodeId, PageId};
    use std::collections::{BTreeMap, BTreeSet};
    use std::time::Duration;

    fn node(id: u32) -> ActorId {
        ActorId::Node(NodeId(id))
    }

    // ============================================================
    // REGISTRY
    // ============================================================

    #[tokio::test]
    async fn test_send_to_unknown_actor_fails() {
        let network = Network::new(Duration::ZERO);

        let msg = Message::new(MessageType::ReadReq, node(1), NodeId(1), PageId(1));
        let result = network.send(ActorId::Manager(ManagerId(0)), msg);

        assert!(matches!(result, Err(IvyError::ActorNotFound(_))));
        assert_eq!(network.messages_sent(), 0);
    }

    #[tokio::test]
    async fn test_register_marks_endpoint() {
        let network = Network::new(Duration::ZERO);
        let _inbox = network.register(node(4));

        assert!(network.is_registered(node(4)));
        assert!(!network.is_registered(node(5)));
    }

    // ============================================================
    // ROUTING
    // ============================================================

    #[tokio::test]
    async fn test_forward_lands_on_request_queue() {
        let network = Network::new(Duration::from_millis(5));
        let mut inbox = network.register(node(2));

        let msg = Message::new(
            MessageType::ReadFwd,
            ActorId::Manager(ManagerId(0)),
            NodeId(3),
            PageId(1),
        );
        network.send(node(2), msg.clone()).unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), inbox.requests.recv())
            .await
            .expect("delivery timed out")
            .expect("queue closed");

        assert_eq!(received, msg);
        assert!(inbox.responses.try_recv().is_err());
        assert_eq!(network.messages_sent(), 1);
    }

    #[tokio::test]
    async fn test_page_transfer_lands_on_response_queue() {
        let network = Network::new(Duration::ZERO);
        let mut inbox = network.register(node(3));

        let msg = Message::new(MessageType::WritePg, node(1), NodeId(3), PageId(2))
            .with_content("old");
        network.send(node(3), msg).unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), inbox.responses.recv())
            .await
            .expect("delivery timed out")
            .expect("queue closed");

        assert_eq!(received.kind, MessageType::WritePg);
        assert_eq!(received.content, "old");
    }

    #[tokio::test]
    async fn test_snapshot_is_delivered_immediately() {
        let network = Network::new(Duration::from_millis(50));
        let mut inbox = network.register(ActorId::Manager(ManagerId(1)));

        let snapshot = Snapshot {
            sender: ManagerId(0),
            seq: 1,
            version: 3,
            nodes: BTreeSet::from([NodeId(1)]),
            page_owner: BTreeMap::from([(PageId(1), NodeId(1))]),
            page_copies: BTreeMap::new(),
        };
        network.send_snapshot(ManagerId(1), snapshot.clone()).unwrap();

        assert_eq!(inbox.snapshots.try_recv().unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_drain_discards_queued_protocol_messages() {
        let network = Network::new(Duration::ZERO);
        let mut inbox = network.register(node(1));

        for page in 1..=3 {
            let msg = Message::new(MessageType::Invalidate, node(9), NodeId(9), PageId(page));
            network.send(node(1), msg).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(inbox.drain_protocol(), 3);
        assert!(inbox.requests.try_recv().is_err());
    }
}
