use crate::cluster::{
  gl_inbox, gm_inbox, lc_inbox, multicast, AgentCharge, Beat, Joiner, MsgKind, RelayedBeat,
  SnoozeConfig, SnoozeMsg, FAILURE_MODE, LOG_LEVEL, NEW_LC,
};
use crate::core::{Actor, ActorContext, LocalRef, Mailbox, Node};
use crate::scheduling::Infrastructure;
use crate::{debug, info, send_select, trace, SnoozeInterface};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use AgentMsg::*;

#[derive(SnoozeInterface)]
pub enum AgentMsg {
  #[snooze]
  Remote(SnoozeMsg),
  Tick,
}

#[derive(Clone, Debug, PartialEq)]
enum State {
  Joining { since: Duration },
  AwaitingLeader { since: Duration },
  AwaitingCoordinator { coordinator: String, since: Duration },
  Attached { coordinator: String, last_beat: Duration },
  Stopped,
}

/// The agent of one managed host.
///
/// Joins in three steps: the broker relays it a leader beat, the leader names a coordinator, and
/// the coordinator acknowledges. It then reports its host's charge to that coordinator and starts
/// over whenever the coordinator leaves or its relayed beats stop.
pub struct LocalController {
  host: String,
  inbox: Mailbox,
  config: SnoozeConfig,
  infra: Arc<dyn Infrastructure>,
  state: State,
}
impl LocalController {
  pub fn new(host: &str, config: SnoozeConfig, infra: Arc<dyn Infrastructure>) -> LocalController {
    LocalController {
      host: host.to_string(),
      inbox: lc_inbox(host),
      config: config,
      infra: infra,
      state: State::Joining {
        since: Duration::from_millis(0),
      },
    }
  }

  pub fn spawn(
    node: &Node<SnoozeMsg>,
    host: &str,
    config: SnoozeConfig,
    infra: Arc<dyn Infrastructure>,
  ) -> LocalRef<AgentMsg> {
    let inbox = lc_inbox(host);
    node.spawn(LocalController::new(host, config, infra), inbox, vec![])
  }

  fn send(&self, ctx: &ActorContext<SnoozeMsg, AgentMsg>, dest: Mailbox, kind: MsgKind) {
    let msg = SnoozeMsg::new(&self.host, dest, kind).reply_to(self.inbox.clone());
    send_select!(FAILURE_MODE, &ctx.node, &msg);
  }

  fn join(&mut self, ctx: &ActorContext<SnoozeMsg, AgentMsg>) {
    trace!(LOG_LEVEL, &ctx.node, format!("{} joining", self.host));
    self.send(ctx, multicast().sub(NEW_LC), MsgKind::JoinRequest(Joiner::Agent));
    self.state = State::Joining {
      since: ctx.node.now(),
    };
  }

  fn charge(&self, now: Duration) -> AgentCharge {
    let view = self.infra.nodes(&[self.host.clone()]).into_iter().next();
    AgentCharge {
      cpu: view.as_ref().map(|v| v.cpu_demand()).unwrap_or(0.0),
      mem: view.as_ref().map(|v| v.mem_demand()).unwrap_or(0),
      at: now,
    }
  }

  fn expired(&self, since: Duration, now: Duration) -> bool {
    now.checked_sub(since).map(|age| age > self.config.heartbeat_timeout).unwrap_or(false)
  }

  fn handle(&mut self, ctx: &ActorContext<SnoozeMsg, AgentMsg>, msg: SnoozeMsg) {
    let now = ctx.node.now();
    match (self.state.clone(), msg.kind) {
      (State::Stopped, _) => (),
      (
        State::Joining { .. },
        MsgKind::HeartbeatDownRelayed(RelayedBeat::Leader { leader, .. }),
      ) => {
        debug!(LOG_LEVEL, &ctx.node, format!("{} asking {} for a coordinator", self.host, leader));
        self.send(ctx, gl_inbox(&leader).sub(NEW_LC), MsgKind::JoinRequest(Joiner::Agent));
        self.state = State::AwaitingLeader { since: now };
      }
      (State::AwaitingLeader { .. }, MsgKind::JoinAck { coordinator }) => {
        let dest = gm_inbox(&coordinator).sub(NEW_LC);
        self.send(ctx, dest, MsgKind::JoinRequest(Joiner::Agent));
        self.state = State::AwaitingCoordinator {
          coordinator: coordinator,
          since: now,
        };
      }
      (State::AwaitingCoordinator { coordinator, .. }, MsgKind::JoinAck { coordinator: acked })
        if coordinator == acked =>
      {
        info!(LOG_LEVEL, &ctx.node, format!("{} attached to {}", self.host, coordinator));
        let done = Joiner::AgentJoined {
          coordinator: coordinator.clone(),
        };
        self.send(ctx, multicast().sub(NEW_LC), MsgKind::JoinRequest(done));
        self.state = State::Attached {
          coordinator: coordinator,
          last_beat: now,
        };
      }
      (
        State::Attached { coordinator, .. },
        MsgKind::HeartbeatDownRelayed(RelayedBeat::Coordinator { coordinator: alive, .. }),
      ) if coordinator == alive => {
        self.state = State::Attached {
          coordinator: coordinator,
          last_beat: now,
        };
      }
      (State::Attached { coordinator, .. }, MsgKind::CoordinatorTerminate)
        if coordinator == msg.origin =>
      {
        info!(LOG_LEVEL, &ctx.node, format!("{} left by {}", self.host, coordinator));
        self.join(ctx);
      }
      (_, MsgKind::TestFail) => {
        self.state = State::Stopped;
        ctx.stop();
      }
      (state, kind) => {
        trace!(LOG_LEVEL, &ctx.node, format!("{} ignoring {:?} in {:?}", self.host, kind, state))
      }
    }
  }

  fn tick(&mut self, ctx: &ActorContext<SnoozeMsg, AgentMsg>) {
    let now = ctx.node.now();
    match self.state.clone() {
      State::Stopped => return,
      State::Joining { since } if self.expired(since, now) => self.join(ctx),
      State::Joining { .. } => (),
      State::AwaitingLeader { since } | State::AwaitingCoordinator { since, .. } => {
        if self.expired(since, now) {
          debug!(LOG_LEVEL, &ctx.node, format!("{} join timed out", self.host));
          self.join(ctx);
        }
      }
      State::Attached {
        coordinator,
        last_beat,
      } => {
        if self.expired(last_beat, now) {
          info!(LOG_LEVEL, &ctx.node, format!("{} lost {}", self.host, coordinator));
          self.join(ctx);
        } else {
          let beat = MsgKind::HeartbeatUp(Beat::Charge(self.charge(now)));
          self.send(ctx, gm_inbox(&coordinator), beat);
        }
      }
    }
    ctx.node.schedule_local_msg(self.config.heartbeat_interval, ctx.local_interface(), Tick);
  }
}
#[async_trait]
impl Actor<SnoozeMsg, AgentMsg> for LocalController {
  async fn pre_start(&mut self, ctx: &ActorContext<SnoozeMsg, AgentMsg>) {
    self.join(ctx);
    ctx.node.schedule_local_msg(self.config.heartbeat_interval, ctx.local_interface(), Tick);
  }

  async fn recv(&mut self, ctx: &ActorContext<SnoozeMsg, AgentMsg>, msg: AgentMsg) {
    match msg {
      Remote(msg) => self.handle(ctx, msg),
      Tick => self.tick(ctx),
    }
  }
}
