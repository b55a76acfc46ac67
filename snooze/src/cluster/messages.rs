use crate::cluster::{AgentCharge, ChargeSummary};
use crate::core::{Envelope, Mailbox};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every message exchanged between brokers, leaders, coordinators and agents.
///
/// `origin` is the sending process's host. `reply_box` is set when the receiver is expected to
/// answer somewhere other than the origin's usual inbox.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnoozeMsg {
  pub origin: String,
  pub dest: Mailbox,
  pub reply_box: Option<Mailbox>,
  pub kind: MsgKind,
}
impl SnoozeMsg {
  pub fn new(origin: &str, dest: Mailbox, kind: MsgKind) -> SnoozeMsg {
    SnoozeMsg {
      origin: origin.to_string(),
      dest: dest,
      reply_box: None,
      kind: kind,
    }
  }

  pub fn reply_to(mut self, reply_box: Mailbox) -> SnoozeMsg {
    self.reply_box = Some(reply_box);
    self
  }
}
impl Envelope for SnoozeMsg {
  fn destination(&self) -> &Mailbox {
    &self.dest
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MsgKind {
  JoinRequest(Joiner),
  /// Names the coordinator the agent is, or is about to be, attached to.
  JoinAck { coordinator: String },
  HeartbeatUp(Beat),
  HeartbeatDownRelayed(RelayedBeat),
  ElectionRequest,
  ElectionStopAck,
  LeaderTerminate { leader: String },
  CoordinatorTerminate,
  TestFail,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Joiner {
  Coordinator,
  Agent,
  /// The agent finished joining `coordinator`.
  AgentJoined { coordinator: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Beat {
  Leader,
  Coordinator,
  Charge(AgentCharge),
  Summary(ChargeSummary),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RelayedBeat {
  Leader { leader: String, at: Duration },
  Coordinator { coordinator: String, at: Duration },
}
