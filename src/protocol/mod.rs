//! Protocol Definitions
//!
//! Identifiers, permissions and the wire messages of the Ivy coherence protocol.
//!
//! ## Message Families
//! - **Node -> Manager**: `READREQ`, `WRITEREQ` requests and the `READACK`, `WRITEACK`,
//!   `INVALIDATEACK` acknowledgements that close an exchange.
//! - **Manager -> Node**: `READFWD`, `WRITEFWD`, `INVALIDATE` instructions and the
//!   `READ_OWNER_NIL` / `WRITE_OWNER_NIL` bootstrap grants.
//! - **Node -> Node**: `READPG`, `WRITEPG` page transfers from the owner to the requester.
//! - **Manager -> Manager**: `Snapshot`, a full copy of the directory pushed by the incumbent.

pub mod messages;
pub mod types;

#[cfg(test)]
mod tests;
