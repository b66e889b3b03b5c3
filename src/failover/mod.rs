//! Failover Module
//!
//! Crash simulation for the manager replica pair. There is no election: a kill stops
//! one replica and redirects every node to its peer, and a restarted replica rejoins as
//! a passive OVERTHROWN listener until nodes address it again.
//!
//! ## Core Mechanisms
//! - **Kill**: final state dump, receive loop stops, queued traffic is kept.
//! - **Redirect**: each node's `ManagerRoute` takes the peer-death transition.
//! - **Restart**: traffic queued while down is discarded, snapshots are applied.

pub mod controller;

pub use controller::FailoverController;

#[cfg(test)]
mod tests;
