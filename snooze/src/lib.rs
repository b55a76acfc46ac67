//! Snooze is the coordination layer of a hierarchical cluster manager. A broker at a well-known
//! mailbox bootstraps the hierarchy, group coordinators manage node agents and run placement
//! scheduling over them, and a group leader sits on top. Failures are detected through
//! heartbeats, and the broker elects a new leader among the coordinators when the old one goes
//! quiet.
//!
//! Every process is an actor on a [`Node`](crate::core::Node). The [`testkit`] module has what
//! is needed to run a whole cluster in one process.

pub mod cluster;
pub mod core;
pub mod scheduling;
pub mod testkit;
extern crate snooze_macros;

pub use snooze_macros::SnoozeInterface;
