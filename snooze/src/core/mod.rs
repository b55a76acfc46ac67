//! The message substrate every [`snooze`](crate) process runs on: named mailboxes, actors, a
//! registry that routes envelopes, and a shared monotonic clock.
//!
//! ### Mailboxes and Envelopes
//! Processes find each other by [`Mailbox`] name alone. A wire message implements [`Envelope`],
//! which names its destination. Sending encodes the envelope with CBOR and hands it to the
//! [`Node`]'s registry, which decodes it and passes it to whatever receiver is currently bound to
//! that name. An envelope for an unbound name is dropped, which is how a dead process looks to
//! the rest of the cluster.
//!
//! ### Sending
//! There are three ways to send:
//!
//! - [`Node::send`]: fire-and-forget.
//! - [`Node::send_unreliable`]: fire-and-forget, subject to the node's
//!   [`FailureConfigMap`](crate::testkit::FailureConfigMap).
//! - [`Node::send_reliable`]: resolves once a live receiver took the envelope, or fails with a
//!   [`TransportError`].
//!
//! ### Receiving
//! Actors receive on the names they were spawned with. An actor implementing [`TimeoutActor`] has
//! its receive bounded by a timeout and gets a [`timeout`](TimeoutActor::timeout) callback when
//! nothing arrives. Request/reply exchanges that happen outside an actor's inbox bind a
//! [`MailboxRecvr`] with [`Node::mailbox`] and wait on it with
//! [`recv_timeout`](MailboxRecvr::recv_timeout).
//!
//! ```ignore
//! let node = Node::<SnoozeMsg>::new(NodeConfig::default())?;
//! let coordinator = node.spawn_timeout(
//!   actor,
//!   gm_inbox("node-1"),
//!   vec![gm_inbox("node-1").sub(NEW_LC)],
//!   Duration::from_millis(50),
//! );
//! ```
//!
//! ### Periodic Activities
//! [`PeriodicActivity`] schedules a local message one period after the previous run started, by
//! subtracting the recorded run time from the next wait.

use crate::testkit::LogLevel;

mod actor;
mod actor_ref;
mod actor_tasks;
mod errors;
mod mailbox;
mod node;
mod periodic;
mod registry;

pub const LOG_LEVEL: LogLevel = LogLevel::Warn;

#[rustfmt::skip]
pub(in crate::core) use {
  actor::local_actor_msg_convert,
  actor_tasks::register,
  actor_tasks::run_single,
  actor_tasks::run_single_timeout,
  registry::Recvr,
  registry::Registry,
  registry::RegistryMsg,
};

#[rustfmt::skip]
pub use {
  actor::Actor,
  actor::ActorContext,
  actor::ActorSignal,
  actor::LocalActorMsg,
  actor::TimeoutActor,
  actor_ref::LocalRef,
  errors::RecvError,
  errors::TransportError,
  mailbox::Envelope,
  mailbox::Mailbox,
  node::MailboxRecvr,
  node::Node,
  node::NodeConfig,
  periodic::PeriodicActivity,
};
