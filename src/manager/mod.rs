//! Central Manager Module
//!
//! The coherence authority. Holds the page directory (owner + copy set per page) and
//! orchestrates forwards, invalidations and ownership transfer. Two replicas exist;
//! the incumbent periodically pushes a full snapshot of its directory to the other.
//!
//! ## Submodules
//! - **`state`**: the page directory and its dump format.
//! - **`service`**: the single-flight receive loop and the read/write handlers.
//! - **`handle`**: control surface (kill, dump, status, sync-now).

pub mod handle;
pub mod service;
pub mod state;

pub use handle::{ManagerControl, ManagerHandle, ManagerStatus};
pub use service::{CentralManager, ManagerTimings};
pub use state::{Directory, DirectoryEntry, StateDump};
