//! Protocol Module Tests
//!
//! Validates queue routing of every message type and the wire encoding of envelopes.

#[cfg(test)]
mod tests {
    use crate::protocol::messages::{Message, MessageType, Queue};
    use crate::protocol::types::{ActorId, ManagerId, NodeId, PageId, Permission};

    // ============================================================
    // QUEUE ROUTING
    // ============================================================

    #[test]
    fn test_work_items_use_request_queue() {
        for kind in [
            MessageType::ReadReq,
            MessageType::WriteReq,
            MessageType::ReadFwd,
            MessageType::WriteFwd,
            MessageType::Invalidate,
        ] {
            assert_eq!(kind.queue(), Queue::Request, "{} should be a request", kind);
        }
    }

    #[test]
    fn test_replies_use_response_queue() {
        for kind in [
            MessageType::ReadAck,
            MessageType::WriteAck,
            MessageType::InvalidateAck,
            MessageType::ReadOwnerNil,
            MessageType::WriteOwnerNil,
            MessageType::ReadPg,
            MessageType::WritePg,
        ] {
            assert_eq!(kind.queue(), Queue::Response, "{} should be a reply", kind);
        }
    }

    // ============================================================
    // ENCODING
    // ============================================================

    #[test]
    fn test_message_survives_the_wire() {
        let msg = Message::new(
            MessageType::ReadPg,
            ActorId::Node(NodeId(1)),
            NodeId(2),
            PageId(7),
        )
        .with_content("This is written by node id 1");

        let encoded = msg.encode().expect("encode failed");
        let decoded = Message::decode(&encoded).expect("decode failed");

        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_garbage_bytes_are_a_codec_error() {
        let result = Message::decode(&[0xff, 0x01]);

        assert!(matches!(result, Err(crate::error::IvyError::Codec(_))));
    }

    // ============================================================
    // DISPLAY
    // ============================================================

    #[test]
    fn test_display_names() {
        assert_eq!(MessageType::ReadOwnerNil.to_string(), "READ_OWNER_NIL");
        assert_eq!(MessageType::InvalidateAck.to_string(), "INVALIDATEACK");
        assert_eq!(Permission::ReadWrite.to_string(), "READWRITE");
        assert_eq!(ActorId::Manager(ManagerId(1)).to_string(), "CM 1");
        assert_eq!(ActorId::Node(NodeId(3)).to_string(), "Node 3");
    }
}
