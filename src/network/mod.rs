//! Message Substrate
//!
//! An in-process stand-in for the network. Every actor registers a mailbox with three
//! point-to-point queues (requests, responses, snapshots); senders only ever hold the
//! shared `Network` registry, never a reference to another actor's state.
//!
//! Delivery injects a random delay per message (jitter), so ordering across queues is
//! unconstrained while each queue stays FIFO once a message is enqueued.

pub mod transport;

pub use transport::{Inbox, Network};

#[cfg(test)]
mod tests;
