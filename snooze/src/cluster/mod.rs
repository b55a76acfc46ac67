//! The three-tier hierarchy: a rendezvous [`Broker`], a [`GroupLeader`], [`GroupCoordinator`]s
//! and the [`LocalController`] agents they manage.
//!
//! ### Membership
//! The broker's inbox, [`MULTICAST`], is the only address anyone needs to know up front. Every
//! other inbox is derived from a host name ([`gl_inbox`], [`gm_inbox`], [`lc_inbox`]) plus a
//! fixed suffix. Coordinators join the broker, and learn of the leader from the leader heartbeats
//! the broker relays to them. Agents join the broker, ask the leader for a coordinator, join that
//! coordinator, and then tell the broker the join is complete.
//!
//! ### Failure Detection
//! Failure detection is soft. Every table of peers is a [`PeerTable`] stamped with each peer's
//! last heartbeat, and a peer is dead once its heartbeat is older than
//! [`heartbeat_timeout`](SnoozeConfig::heartbeat_timeout). Dead records are swept; nobody is
//! told.
//!
//! ### Elections
//! When the leader's heartbeats stop, a coordinator that notices asks the broker for an election
//! (the broker also checks on its own). The broker promotes the first coordinator that answers,
//! trying them in the order they joined, or creates a leader from nothing when there are none.
//! Elections are best effort. Two leaders can coexist briefly, and a lost election leaves the
//! cluster leaderless until the next trigger.
//!
//! ### Scheduling
//! Each coordinator runs its [`Scheduler`](crate::scheduling::Scheduler) over the hosts of its
//! agents, either every period or as soon as a host is overloaded. Cycles are single-flight per
//! coordinator.

use crate::testkit::{FailureMode, LogLevel};

mod agent;
mod broker;
mod charge;
mod config;
mod coordinator;
mod events;
mod leader;
mod messages;
mod naming;
mod records;

pub const FAILURE_MODE: FailureMode = FailureMode::Message;
pub const LOG_LEVEL: LogLevel = LogLevel::Info;

#[rustfmt::skip]
pub use {
  agent::AgentMsg,
  agent::LocalController,
  broker::Broker,
  broker::BrokerMsg,
  charge::AgentCharge,
  charge::ChargeSummary,
  config::ConfigError,
  config::SchedulingMode,
  config::SnoozeConfig,
  coordinator::CoordinatorCmd,
  coordinator::CoordinatorMsg,
  coordinator::GroupCoordinator,
  events::SnoozeEvent,
  leader::GroupLeader,
  leader::LeaderMsg,
  messages::Beat,
  messages::Joiner,
  messages::MsgKind,
  messages::RelayedBeat,
  messages::SnoozeMsg,
  naming::gl_election,
  naming::gl_inbox,
  naming::gm_inbox,
  naming::lc_inbox,
  naming::multicast,
  naming::GL_ELEC,
  naming::GL_ELECTION,
  naming::GM_PERIODIC,
  naming::MULTICAST,
  naming::NEW_GM,
  naming::NEW_LC,
  naming::RELAY_GM_BEATS,
  records::PeerRecord,
  records::PeerTable,
  records::Upsert,
};
