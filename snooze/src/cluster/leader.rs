use crate::cluster::{
  gl_inbox, lc_inbox, multicast, Beat, ChargeSummary, Joiner, MsgKind, PeerTable, SnoozeConfig,
  SnoozeEvent, SnoozeMsg, FAILURE_MODE, GM_PERIODIC, LOG_LEVEL, NEW_GM, NEW_LC,
};
use crate::core::{Actor, ActorContext, LocalRef, Node};
use crate::{debug, info, send_select, warn, SnoozeInterface};
use async_trait::async_trait;
use LeaderMsg::*;

#[derive(SnoozeInterface)]
pub enum LeaderMsg {
  #[snooze]
  Remote(SnoozeMsg),
  Tick,
}

/// The top of the hierarchy. Beats to the broker, keeps the latest summary of every coordinator
/// and hands joining agents to the coordinator with the fewest of them.
pub struct GroupLeader {
  host: String,
  config: SnoozeConfig,
  coordinators: PeerTable<ChargeSummary>,
  observer: LocalRef<SnoozeEvent>,
  stopped: bool,
}
impl GroupLeader {
  pub fn new(host: &str, config: SnoozeConfig, observer: LocalRef<SnoozeEvent>) -> GroupLeader {
    GroupLeader {
      host: host.to_string(),
      config: config,
      coordinators: PeerTable::new(),
      observer: observer,
      stopped: false,
    }
  }

  pub fn spawn(
    node: &Node<SnoozeMsg>,
    host: &str,
    config: SnoozeConfig,
    observer: LocalRef<SnoozeEvent>,
  ) -> LocalRef<LeaderMsg> {
    let inbox = gl_inbox(host);
    let aliases = vec![inbox.sub(NEW_GM), inbox.sub(GM_PERIODIC), inbox.sub(NEW_LC)];
    node.spawn(GroupLeader::new(host, config, observer), inbox, aliases)
  }

  fn beat(&self, ctx: &ActorContext<SnoozeMsg, LeaderMsg>) {
    let msg = SnoozeMsg::new(&self.host, multicast(), MsgKind::HeartbeatUp(Beat::Leader));
    send_select!(FAILURE_MODE, &ctx.node, &msg);
  }

  fn stop(&mut self, ctx: &ActorContext<SnoozeMsg, LeaderMsg>) {
    self.stopped = true;
    info!(LOG_LEVEL, &ctx.node, format!("Leader {} stopping", self.host));
    self.observer.send(SnoozeEvent::LeaderStopped {
      leader: self.host.clone(),
    });
    ctx.stop();
  }

  fn assign(&mut self, ctx: &ActorContext<SnoozeMsg, LeaderMsg>, agent: &str) -> Option<String> {
    let chosen = self
      .coordinators
      .iter()
      .min_by_key(|(_, rec)| rec.value.agents)
      .map(|(gm, _)| gm.clone())?;
    if let Some(rec) = self.coordinators.get_mut(&chosen) {
      rec.value.agents += 1;
    }
    debug!(LOG_LEVEL, &ctx.node, format!("Assigning {} to {}", agent, chosen));
    Some(chosen)
  }

  fn handle(&mut self, ctx: &ActorContext<SnoozeMsg, LeaderMsg>, msg: SnoozeMsg) {
    let now = ctx.node.now();
    let SnoozeMsg {
      origin,
      reply_box,
      kind,
      ..
    } = msg;
    match kind {
      MsgKind::JoinRequest(Joiner::Coordinator) => {
        if !self.coordinators.contains(&origin) {
          info!(LOG_LEVEL, &ctx.node, format!("Leader {} got coordinator {}", self.host, origin));
          let summary = ChargeSummary {
            at: now,
            ..ChargeSummary::default()
          };
          self.coordinators.upsert(&origin, summary, now);
        } else {
          self.coordinators.touch(&origin, now);
        }
      }
      MsgKind::HeartbeatUp(Beat::Summary(summary)) => {
        self.coordinators.upsert(&origin, summary, now);
      }
      MsgKind::JoinRequest(Joiner::Agent) => match self.assign(ctx, &origin) {
        Some(gm) => {
          let dest = reply_box.unwrap_or_else(|| lc_inbox(&origin));
          let ack = MsgKind::JoinAck { coordinator: gm };
          send_select!(FAILURE_MODE, &ctx.node, &SnoozeMsg::new(&self.host, dest, ack));
        }
        None => warn!(LOG_LEVEL, &ctx.node, format!("No coordinator for agent {}", origin)),
      },
      MsgKind::LeaderTerminate { leader } if leader == self.host => self.stop(ctx),
      MsgKind::LeaderTerminate { leader } => {
        debug!(LOG_LEVEL, &ctx.node, format!("Ignoring termination of {}", leader))
      }
      MsgKind::TestFail => self.stop(ctx),
      other => {
        warn!(LOG_LEVEL, &ctx.node, format!("Unexpected message from {}: {:?}", origin, other))
      }
    }
  }
}
#[async_trait]
impl Actor<SnoozeMsg, LeaderMsg> for GroupLeader {
  async fn pre_start(&mut self, ctx: &ActorContext<SnoozeMsg, LeaderMsg>) {
    info!(LOG_LEVEL, &ctx.node, format!("Leader started on {}", self.host));
    self.observer.send(SnoozeEvent::LeaderStarted {
      leader: self.host.clone(),
    });
    self.beat(ctx);
    ctx.node.schedule_local_msg(self.config.heartbeat_interval, ctx.local_interface(), Tick);
  }

  async fn recv(&mut self, ctx: &ActorContext<SnoozeMsg, LeaderMsg>, msg: LeaderMsg) {
    if self.stopped {
      return;
    }
    match msg {
      Remote(msg) => self.handle(ctx, msg),
      Tick => {
        self.beat(ctx);
        for (gm, _) in self.coordinators.sweep(ctx.node.now(), self.config.heartbeat_timeout) {
          info!(LOG_LEVEL, &ctx.node, format!("Leader {} lost coordinator {}", self.host, gm));
        }
        ctx.node.schedule_local_msg(self.config.heartbeat_interval, ctx.local_interface(), Tick);
      }
    }
  }
}
