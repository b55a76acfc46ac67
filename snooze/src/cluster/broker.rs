use crate::cluster::{
  gl_election, gl_inbox, gm_inbox, lc_inbox, multicast, Beat, GroupLeader, Joiner, MsgKind,
  PeerTable, RelayedBeat, SnoozeConfig, SnoozeEvent, SnoozeMsg, Upsert, FAILURE_MODE, LOG_LEVEL,
  NEW_GM, NEW_LC, RELAY_GM_BEATS,
};
use crate::core::{Actor, ActorContext, LocalRef, Mailbox, MailboxRecvr, Node, RecvError};
use crate::{debug, error, info, send_select, trace, warn, SnoozeInterface};
use async_trait::async_trait;
use itertools::Itertools;
use std::time::Duration;
use BrokerMsg::*;

#[derive(SnoozeInterface)]
pub enum BrokerMsg {
  #[snooze]
  Remote(SnoozeMsg),
  Tick,
}

#[derive(Clone, Debug, PartialEq)]
enum Association {
  Joining,
  Attached(String),
}

/// The rendezvous point of the hierarchy, bound to [`MULTICAST`](crate::cluster::MULTICAST).
///
/// Keeps track of live coordinators and of agents that are still joining, relays leader beats
/// down to both, relays coordinator beats to the agents attached to them, and runs elections.
pub struct Broker {
  host: String,
  config: SnoozeConfig,
  coordinators: PeerTable<Mailbox>,
  agents: PeerTable<Association>,
  leader: Option<String>,
  leader_ts: Duration,
  /// The leader a failed election could not replace. It is told to stop once one succeeds.
  deposed: Option<String>,
  last_election: Option<Duration>,
  cursor: usize,
  election_box: Option<MailboxRecvr<SnoozeMsg>>,
  observer: LocalRef<SnoozeEvent>,
}
impl Broker {
  pub fn new(host: &str, config: SnoozeConfig, observer: LocalRef<SnoozeEvent>) -> Broker {
    Broker {
      host: host.to_string(),
      config: config,
      coordinators: PeerTable::new(),
      agents: PeerTable::new(),
      leader: None,
      leader_ts: Duration::from_millis(0),
      deposed: None,
      last_election: None,
      cursor: 0,
      election_box: None,
      observer: observer,
    }
  }

  pub fn spawn(
    node: &Node<SnoozeMsg>,
    host: &str,
    config: SnoozeConfig,
    observer: LocalRef<SnoozeEvent>,
  ) -> LocalRef<BrokerMsg> {
    let aliases = vec![
      multicast().sub(NEW_GM),
      multicast().sub(NEW_LC),
      multicast().sub(RELAY_GM_BEATS),
    ];
    node.spawn(Broker::new(host, config, observer), multicast(), aliases)
  }

  fn leader_dead(&self, now: Duration) -> bool {
    let timeout = self.config.heartbeat_timeout;
    now.checked_sub(self.leader_ts).map(|age| age > timeout).unwrap_or(false)
  }

  fn elected_recently(&self, now: Duration) -> bool {
    let timeout = self.config.heartbeat_timeout;
    self.last_election.and_then(|t| now.checked_sub(t)).map(|age| age <= timeout).unwrap_or(false)
  }

  fn send(&self, ctx: &ActorContext<SnoozeMsg, BrokerMsg>, dest: Mailbox, kind: MsgKind) {
    send_select!(FAILURE_MODE, &ctx.node, &SnoozeMsg::new(&self.host, dest, kind));
  }

  fn relay_leader_beat(&self, ctx: &ActorContext<SnoozeMsg, BrokerMsg>) {
    let leader = match &self.leader {
      Some(l) => l.clone(),
      None => return warn!(LOG_LEVEL, &ctx.node, "No leader to relay beats for"),
    };
    let beat = RelayedBeat::Leader {
      leader: leader,
      at: self.leader_ts,
    };
    for (_, rec) in self.coordinators.iter() {
      self.send(ctx, rec.value.clone(), MsgKind::HeartbeatDownRelayed(beat.clone()));
    }
    for (agent, _) in self.agents.iter().filter(|(_, r)| r.value == Association::Joining) {
      self.send(ctx, lc_inbox(agent), MsgKind::HeartbeatDownRelayed(beat.clone()));
    }
  }

  fn relay_coordinator_beat(&self, ctx: &ActorContext<SnoozeMsg, BrokerMsg>, gm: &str) {
    let at = match self.coordinators.get(gm) {
      Some(rec) => rec.last,
      None => return,
    };
    let beat = RelayedBeat::Coordinator {
      coordinator: gm.to_string(),
      at: at,
    };
    let attached = Association::Attached(gm.to_string());
    for (agent, _) in self.agents.iter().filter(|(_, r)| r.value == attached) {
      self.send(ctx, lc_inbox(agent), MsgKind::HeartbeatDownRelayed(beat.clone()));
    }
  }

  fn register(&mut self, ctx: &ActorContext<SnoozeMsg, BrokerMsg>, gm: &str, reply: Mailbox) {
    let now = ctx.node.now();
    if self.coordinators.upsert(gm, reply, now) == Upsert::Inserted {
      info!(LOG_LEVEL, &ctx.node, format!("Coordinator stored: {}", gm));
      self.observer.send(SnoozeEvent::CoordinatorRegistered {
        coordinator: gm.to_string(),
      });
    }
  }

  fn forget(&mut self, ctx: &ActorContext<SnoozeMsg, BrokerMsg>, gm: &str) {
    if self.coordinators.remove(gm).is_some() {
      self.forgotten(ctx, gm);
    }
  }

  /// `gm` is already out of the coordinator table.
  fn forgotten(&mut self, ctx: &ActorContext<SnoozeMsg, BrokerMsg>, gm: &str) {
    self.observer.send(SnoozeEvent::CoordinatorRemoved {
      coordinator: gm.to_string(),
    });
    let attached = Association::Attached(gm.to_string());
    let orphans = self
      .agents
      .iter()
      .filter(|(_, r)| r.value == attached)
      .map(|(a, _)| a.clone())
      .collect_vec();
    for agent in orphans {
      debug!(LOG_LEVEL, &ctx.node, format!("Dropping association {} -> {}", agent, gm));
      self.agents.remove(&agent);
    }
  }

  async fn handle(&mut self, ctx: &ActorContext<SnoozeMsg, BrokerMsg>, msg: SnoozeMsg) {
    let now = ctx.node.now();
    let SnoozeMsg {
      origin,
      reply_box,
      kind,
      ..
    } = msg;
    match kind {
      MsgKind::HeartbeatUp(Beat::Leader) => {
        match &self.leader {
          None => info!(LOG_LEVEL, &ctx.node, format!("Leader initialized: {}", origin)),
          Some(l) if *l != origin => {
            error!(LOG_LEVEL, &ctx.node, format!("Multiple leaders: {}, {}", l, origin))
          }
          _ => (),
        }
        if self.deposed.as_deref() == Some(origin.as_str()) {
          self.deposed = None;
        }
        self.leader = Some(origin);
        self.leader_ts = now;
        self.relay_leader_beat(ctx);
      }
      MsgKind::HeartbeatUp(Beat::Coordinator) => {
        if self.coordinators.touch(&origin, now) == Upsert::Unknown {
          warn!(LOG_LEVEL, &ctx.node, format!("Beat from unknown coordinator {}", origin));
          let reply = reply_box.unwrap_or_else(|| gm_inbox(&origin));
          self.register(ctx, &origin, reply);
        }
        self.relay_coordinator_beat(ctx, &origin);
      }
      MsgKind::JoinRequest(Joiner::Coordinator) => {
        let reply = reply_box.unwrap_or_else(|| gm_inbox(&origin));
        self.register(ctx, &origin, reply);
      }
      MsgKind::JoinRequest(Joiner::Agent) => {
        trace!(LOG_LEVEL, &ctx.node, format!("Agent joining: {}", origin));
        self.agents.upsert(&origin, Association::Joining, now);
      }
      MsgKind::JoinRequest(Joiner::AgentJoined { coordinator }) => {
        debug!(LOG_LEVEL, &ctx.node, format!("{} joined {}", origin, coordinator));
        self.agents.upsert(&origin, Association::Attached(coordinator), now);
      }
      MsgKind::ElectionRequest => {
        if self.leader.is_none() || self.leader_dead(now) || self.config.elect_on_join {
          self.elect(ctx).await;
        } else if let Some(leader) = self.leader.clone() {
          let dest = reply_box.unwrap_or_else(|| gm_inbox(&origin));
          debug!(LOG_LEVEL, &ctx.node, format!("Leader alive, resending beat to {}", dest));
          let beat = RelayedBeat::Leader {
            leader: leader,
            at: self.leader_ts,
          };
          self.send(ctx, dest, MsgKind::HeartbeatDownRelayed(beat));
        }
      }
      MsgKind::CoordinatorTerminate => {
        info!(LOG_LEVEL, &ctx.node, format!("Coordinator leaving: {}", origin));
        self.forget(ctx, &origin);
      }
      other => {
        warn!(LOG_LEVEL, &ctx.node, format!("Unexpected message from {}: {:?}", origin, other))
      }
    }
  }

  /// Promotes a live coordinator to leader, or creates a leader from nothing if there are none.
  async fn elect(&mut self, ctx: &ActorContext<SnoozeMsg, BrokerMsg>) {
    self.observer.send(SnoozeEvent::ElectionStarted);
    if self.coordinators.is_empty() {
      let host = self.host.clone();
      GroupLeader::spawn(&ctx.node, &host, self.config.clone(), self.observer.clone());
      error!(LOG_LEVEL, &ctx.node, format!("New leader ex nihilo on: {}", host));
      self.install(ctx, host, false);
      return;
    }

    let mut election_box = match self.election_box.take() {
      Some(b) => b,
      None => ctx.node.mailbox(gl_election()).await,
    };
    let dropped = election_box.drain().await;
    if dropped > 0 {
      debug!(LOG_LEVEL, &ctx.node, format!("Dropped {} stale election replies", dropped));
    }

    let tries = self.config.max_election_candidates as usize;
    let mut elected = None;
    for _ in 0..tries {
      let candidate = match self.coordinators.nth_wrapped(self.cursor) {
        Some(c) => c.clone(),
        None => break,
      };
      self.cursor = self.cursor.wrapping_add(1);
      if self.promote(ctx, &mut election_box, &candidate).await {
        elected = Some(candidate);
        break;
      }
    }
    self.election_box = Some(election_box);

    match elected {
      Some(gm) => {
        self.coordinators.remove(&gm);
        self.install(ctx, gm, true);
      }
      None => {
        error!(LOG_LEVEL, &ctx.node, format!("Leader election failed {} times", tries));
        if let Some(dead) = self.leader.take() {
          self.deposed = Some(dead);
        }
        self.last_election = Some(ctx.node.now());
        self.observer.send(SnoozeEvent::ElectionFailed { tried: tries });
      }
    }
  }

  /// Asks `candidate` to become leader, waits for its stop-acknowledgment and confirms it.
  async fn promote(
    &mut self,
    ctx: &ActorContext<SnoozeMsg, BrokerMsg>,
    election_box: &mut MailboxRecvr<SnoozeMsg>,
    candidate: &str,
  ) -> bool {
    let dest = match self.coordinators.get(candidate) {
      Some(rec) => rec.value.clone(),
      None => return false,
    };
    let req = SnoozeMsg::new(&self.host, dest.clone(), MsgKind::ElectionRequest)
      .reply_to(election_box.name().clone());
    if let Err(e) = ctx.node.send_reliable(&req).await {
      warn!(LOG_LEVEL, &ctx.node, format!("Promotion of {} failed: {}", candidate, e));
      return false;
    }
    info!(LOG_LEVEL, &ctx.node, format!("Coordinator notified: {}", candidate));

    let deadline = tokio::time::Instant::now() + self.config.election_reply_timeout;
    loop {
      let left = deadline.saturating_duration_since(tokio::time::Instant::now());
      match election_box.recv_timeout(left).await {
        Ok(m) if m.origin == candidate && m.kind == MsgKind::ElectionStopAck => break,
        Ok(m) => debug!(LOG_LEVEL, &ctx.node, format!("Ignoring election reply {:?}", m)),
        Err(RecvError::Timeout) | Err(RecvError::Closed) => {
          warn!(LOG_LEVEL, &ctx.node, format!("Coordinator promotion failed: {}", candidate));
          return false;
        }
      }
    }

    let confirm = SnoozeMsg::new(&self.host, dest, MsgKind::ElectionStopAck);
    match ctx.node.send_reliable(&confirm).await {
      Ok(()) => true,
      Err(e) => {
        warn!(LOG_LEVEL, &ctx.node, format!("{} acked but is gone: {}", candidate, e));
        false
      }
    }
  }

  fn install(
    &mut self,
    ctx: &ActorContext<SnoozeMsg, BrokerMsg>,
    leader: String,
    promoted: bool,
  ) {
    let old = self.leader.replace(leader.clone()).or_else(|| self.deposed.take());
    self.deposed = None;
    self.leader_ts = ctx.node.now();
    self.last_election = Some(self.leader_ts);
    if let Some(old) = old.filter(|o| *o != leader) {
      let term = MsgKind::LeaderTerminate {
        leader: old.clone(),
      };
      self.send(ctx, gl_inbox(&old), term.clone());
      for (_, rec) in self.coordinators.iter() {
        self.send(ctx, rec.value.clone(), term.clone());
      }
    }
    info!(LOG_LEVEL, &ctx.node, format!("New leader elected: {}", leader));
    self.observer.send(SnoozeEvent::LeaderElected {
      leader: leader,
      promoted: promoted,
    });
  }
}
#[async_trait]
impl Actor<SnoozeMsg, BrokerMsg> for Broker {
  async fn pre_start(&mut self, ctx: &ActorContext<SnoozeMsg, BrokerMsg>) {
    self.leader_ts = ctx.node.now();
    self.election_box = Some(ctx.node.mailbox(gl_election()).await);
    ctx.node.schedule_local_msg(self.config.heartbeat_interval, ctx.local_interface(), Tick);
  }

  async fn recv(&mut self, ctx: &ActorContext<SnoozeMsg, BrokerMsg>, msg: BrokerMsg) {
    match msg {
      Remote(msg) => self.handle(ctx, msg).await,
      Tick => {
        let now = ctx.node.now();
        for (gm, _) in self.coordinators.sweep(now, self.config.heartbeat_timeout) {
          warn!(LOG_LEVEL, &ctx.node, format!("Coordinator timed out: {}", gm));
          self.forgotten(ctx, &gm);
        }
        let timeout = self.config.heartbeat_timeout;
        for (agent, _) in self.agents.sweep_where(now, timeout, |a| *a == Association::Joining) {
          debug!(LOG_LEVEL, &ctx.node, format!("Agent {} stopped joining", agent));
        }
        if self.leader_dead(now) && !self.elected_recently(now) {
          info!(LOG_LEVEL, &ctx.node, "Leader heartbeat timed out, electing");
          self.elect(ctx).await;
        }
        ctx.node.schedule_local_msg(self.config.heartbeat_interval, ctx.local_interface(), Tick);
      }
    }
  }
}
