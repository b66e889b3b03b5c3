//! Fault Tolerant Ivy Library
//!
//! A simulation of the Ivy single-writer/multiple-reader distributed shared memory
//! protocol, coordinated by a central manager that is itself replicated as a
//! primary/backup pair. Every participant is an actor on its own task; they talk only
//! through the simulated network.
//!
//! ## Architecture Modules
//! - **`protocol`**: identifiers, message kinds and the snapshot replicated between managers.
//! - **`network`**: per-actor request/response/snapshot queues with randomized delivery delay.
//! - **`manager`**: the central manager. Owns the page directory and serializes every
//!   read/write request through forwards, invalidations and ownership transfer.
//! - **`node`**: the client/cache side. Serves reads from its cache and answers the
//!   manager's forwards and invalidations.
//! - **`failover`**: crash/restart of a manager replica and node redirection.
//! - **`cluster`**: assembly of the fixed universe, state dumps, coherence checks and
//!   the benchmark scenarios.
//! - **`config`** / **`error`**: runtime knobs and the crate-wide error type.

pub mod cluster;
pub mod config;
pub mod error;
pub mod failover;
pub mod manager;
pub mod network;
pub mod node;
pub mod protocol;
