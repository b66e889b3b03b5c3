//! Node Module
//!
//! The client/cache side of the protocol. Each node keeps a local cache of pages tagged
//! READONLY or READWRITE, issues reads and writes through the manager it currently
//! addresses, and answers the manager's forwards and invalidations.
//!
//! ## Submodules
//! - **`cache`**: per-page permission + content.
//! - **`routing`**: the primary/backup addressing state machine.
//! - **`service`**: the node's receive loop.
//! - **`handle`**: the caller-facing API (`read`, `write`, death notices, inspection).

pub mod cache;
pub mod handle;
pub mod routing;
pub mod service;

pub use cache::{CacheEntry, PageCache};
pub use handle::{NodeHandle, NodeSnapshot, NodeStats, PageRead, PageWrite};
pub use routing::{Addressing, ManagerRoute};
pub use service::Node;
