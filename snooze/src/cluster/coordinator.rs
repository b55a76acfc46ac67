use crate::cluster::{
  gl_inbox, gm_inbox, lc_inbox, multicast, AgentCharge, Beat, ChargeSummary, GroupLeader, Joiner,
  MsgKind, PeerTable, RelayedBeat, SchedulingMode, SnoozeConfig, SnoozeEvent, SnoozeMsg, Upsert,
  FAILURE_MODE, GL_ELEC, GM_PERIODIC, LOG_LEVEL, NEW_GM, NEW_LC, RELAY_GM_BEATS,
};
use crate::core::{ActorContext, LocalRef, Mailbox, Node, PeriodicActivity, TimeoutActor};
use crate::scheduling::{
  run_cycle, ClusterSnapshot, CycleOutcome, CycleReport, Infrastructure, Scheduler,
  SchedulerFactory,
};
use crate::{debug, error, info, send_select, trace, warn, SnoozeInterface};
use async_trait::async_trait;
use itertools::Itertools;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use CoordinatorMsg::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinatorCmd {
  /// Graceful stop.
  Stop,
  /// Crash without telling anyone.
  Fail,
  TriggerCycle,
}

#[derive(SnoozeInterface)]
pub enum CoordinatorMsg {
  #[snooze]
  Remote(SnoozeMsg),
  #[snooze]
  Cmd(CoordinatorCmd),
  ReportTick,
  ScheduleTick,
  CycleDone(CycleReport, Option<Box<dyn Scheduler>>, bool),
}

#[derive(Clone, Debug, PartialEq)]
enum State {
  Joining,
  Attached,
  /// `prev` is restored if the broker never confirms.
  Promoting { prev: Box<State>, old_leader: Option<String>, deadline: Duration },
  Promoted,
  Stopped,
}

/// A mid-tier process managing a set of agents.
///
/// It joins through the broker, attaches to the first leader it hears of, reports averaged agent
/// charges upwards, and runs scheduling cycles over its agents' hosts, never more than one at a
/// time. It may be promoted to leader by the broker.
pub struct GroupCoordinator {
  host: String,
  inbox: Mailbox,
  config: SnoozeConfig,
  state: State,
  leader: Option<String>,
  leader_ts: Duration,
  last_election_request: Option<Duration>,
  agents: PeerTable<AgentCharge>,
  infra: Arc<dyn Infrastructure>,
  factory: SchedulerFactory,
  scheduler: Option<Box<dyn Scheduler>>,
  pending_trigger: bool,
  schedule: PeriodicActivity,
  scheduling_started: bool,
  ack_pool: Option<UnboundedSender<SnoozeMsg>>,
  observer: LocalRef<SnoozeEvent>,
}
impl GroupCoordinator {
  pub fn new(
    host: &str,
    config: SnoozeConfig,
    infra: Arc<dyn Infrastructure>,
    factory: SchedulerFactory,
    observer: LocalRef<SnoozeEvent>,
  ) -> GroupCoordinator {
    let scheduler = factory();
    GroupCoordinator {
      host: host.to_string(),
      inbox: gm_inbox(host),
      schedule: PeriodicActivity::new(config.scheduling_period),
      config: config,
      state: State::Joining,
      leader: None,
      leader_ts: Duration::from_millis(0),
      last_election_request: None,
      agents: PeerTable::new(),
      infra: infra,
      factory: factory,
      scheduler: Some(scheduler),
      pending_trigger: false,
      scheduling_started: false,
      ack_pool: None,
      observer: observer,
    }
  }

  pub fn spawn(
    node: &Node<SnoozeMsg>,
    host: &str,
    config: SnoozeConfig,
    infra: Arc<dyn Infrastructure>,
    factory: SchedulerFactory,
    observer: LocalRef<SnoozeEvent>,
  ) -> LocalRef<CoordinatorMsg> {
    let inbox = gm_inbox(host);
    let aliases = vec![inbox.sub(NEW_LC), inbox.sub(GL_ELEC)];
    let timeout = config.receive_timeout;
    let actor = GroupCoordinator::new(host, config, infra, factory, observer);
    node.spawn_timeout(actor, inbox, aliases, timeout)
  }

  fn leader_dead(&self, now: Duration) -> bool {
    let timeout = self.config.heartbeat_timeout;
    now.checked_sub(self.leader_ts).map(|age| age > timeout).unwrap_or(false)
  }

  fn send(&self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>, msg: SnoozeMsg) {
    send_select!(FAILURE_MODE, &ctx.node, &msg);
  }

  fn join_broker(&self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>) {
    let join = MsgKind::JoinRequest(Joiner::Coordinator);
    let msg = SnoozeMsg::new(&self.host, multicast().sub(NEW_GM), join);
    self.send(ctx, msg.reply_to(self.inbox.clone()));
  }

  fn request_election(&mut self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>) {
    let now = ctx.node.now();
    let recent = self
      .last_election_request
      .and_then(|last| now.checked_sub(last))
      .map(|age| age <= self.config.heartbeat_timeout)
      .unwrap_or(false);
    if recent {
      return;
    }
    self.last_election_request = Some(now);
    let msg = SnoozeMsg::new(&self.host, multicast(), MsgKind::ElectionRequest)
      .reply_to(self.inbox.sub(GL_ELEC));
    self.send(ctx, msg);
  }

  fn start_pool(&mut self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>) {
    let (tx, rx) = unbounded_channel::<SnoozeMsg>();
    let rx = Arc::new(Mutex::new(rx));
    for _ in 0..self.config.agent_pool_size {
      let me = ctx.local_interface::<CoordinatorMsg>();
      ctx.node.rt().spawn(ack_worker(ctx.node.clone(), me, rx.clone()));
    }
    self.ack_pool = Some(tx);
  }

  async fn handle(&mut self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>, msg: SnoozeMsg) {
    let now = ctx.node.now();
    let SnoozeMsg {
      origin,
      reply_box,
      kind,
      ..
    } = msg;
    match kind {
      MsgKind::HeartbeatDownRelayed(RelayedBeat::Leader { leader, .. }) => {
        if matches!(self.state, State::Promoting { .. } | State::Stopped) {
          return;
        }
        self.leader_ts = self.leader_ts.max(now);
        if self.leader.as_deref() != Some(leader.as_str()) {
          info!(LOG_LEVEL, &ctx.node, format!("{} following leader {}", self.host, leader));
          let join = MsgKind::JoinRequest(Joiner::Coordinator);
          let msg = SnoozeMsg::new(&self.host, gl_inbox(&leader).sub(NEW_GM), join)
            .reply_to(self.inbox.clone());
          self.send(ctx, msg);
          self.leader = Some(leader.clone());
        }
        if self.state == State::Joining {
          self.state = State::Attached;
          self.observer.send(SnoozeEvent::CoordinatorAttached {
            coordinator: self.host.clone(),
            leader: leader,
          });
        }
        self.start_scheduling(ctx);
      }
      MsgKind::HeartbeatUp(Beat::Charge(charge)) => {
        if self.agents.refresh(&origin, charge, charge.at) == Upsert::Unknown {
          trace!(LOG_LEVEL, &ctx.node, format!("Charge from unknown agent {}", origin));
        }
      }
      MsgKind::JoinRequest(Joiner::Agent) => {
        if self.state == State::Stopped {
          return;
        }
        let charge = AgentCharge {
          at: now,
          ..AgentCharge::default()
        };
        if self.agents.upsert(&origin, charge, now) == Upsert::Inserted {
          info!(LOG_LEVEL, &ctx.node, format!("{} managing agent {}", self.host, origin));
          self.observer.send(SnoozeEvent::AgentJoined {
            agent: origin.clone(),
            coordinator: self.host.clone(),
          });
        }
        let ack = MsgKind::JoinAck {
          coordinator: self.host.clone(),
        };
        let dest = reply_box.unwrap_or_else(|| lc_inbox(&origin));
        let msg = SnoozeMsg::new(&self.host, dest, ack);
        match &self.ack_pool {
          Some(pool) if pool.send(msg.clone()).is_ok() => (),
          _ => self.send(ctx, msg),
        }
      }
      MsgKind::ElectionRequest => match self.state {
        State::Joining | State::Attached => {
          let dest = match reply_box {
            Some(r) => r,
            None => return warn!(LOG_LEVEL, &ctx.node, "Election request without a reply box"),
          };
          info!(LOG_LEVEL, &ctx.node, format!("{} asked to become leader", self.host));
          let ack = SnoozeMsg::new(&self.host, dest, MsgKind::ElectionStopAck);
          if let Err(e) = ctx.node.send_reliable(&ack).await {
            warn!(LOG_LEVEL, &ctx.node, format!("Could not acknowledge election: {}", e));
            if e.is_host_failure() {
              self.stop(ctx).await;
            }
            return;
          }
          self.state = State::Promoting {
            prev: Box::new(self.state.clone()),
            old_leader: self.leader.clone(),
            deadline: now + self.config.election_reply_timeout * 2,
          };
        }
        _ => {
          let state = format!("{:?}", self.state);
          debug!(LOG_LEVEL, &ctx.node, format!("Ignoring election request in {}", state))
        }
      },
      MsgKind::ElectionStopAck => {
        if let State::Promoting { old_leader, .. } = self.state.clone() {
          self.promote(ctx, old_leader).await;
        } else {
          warn!(LOG_LEVEL, &ctx.node, format!("Late election confirmation from {}", origin));
        }
      }
      MsgKind::LeaderTerminate { leader } => {
        if self.leader.as_deref() == Some(leader.as_str()) {
          self.leader = None;
        }
        self.leader_ts = now;
        info!(LOG_LEVEL, &ctx.node, format!("{} told {} is gone", self.host, leader));
        self.observer.send(SnoozeEvent::LeaderTerminationNotice {
          coordinator: self.host.clone(),
          old_leader: leader,
        });
      }
      MsgKind::CoordinatorTerminate => self.stop(ctx).await,
      MsgKind::TestFail => self.crash(ctx),
      other => {
        warn!(LOG_LEVEL, &ctx.node, format!("Unexpected message from {}: {:?}", origin, other))
      }
    }
  }

  /// The broker confirmed the promotion: retire the old leader and start a new one here.
  async fn promote(
    &mut self,
    ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>,
    old_leader: Option<String>,
  ) {
    if let Some(old) = old_leader.filter(|o| *o != self.host) {
      let term = MsgKind::LeaderTerminate {
        leader: old.clone(),
      };
      self.send(ctx, SnoozeMsg::new(&self.host, gl_inbox(&old), term));
    }
    GroupLeader::spawn(&ctx.node, &self.host, self.config.clone(), self.observer.clone());
    info!(LOG_LEVEL, &ctx.node, format!("{} promoted to leader", self.host));
    self.observer.send(SnoozeEvent::CoordinatorPromoted {
      coordinator: self.host.clone(),
    });
    if self.config.election_stops_coordinator {
      self.stop(ctx).await;
    } else {
      self.state = State::Promoted;
      self.leader = Some(self.host.clone());
      self.leader_ts = ctx.node.now();
      self.join_broker(ctx);
    }
  }

  async fn stop(&mut self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>) {
    if self.state == State::Stopped {
      return;
    }
    self.state = State::Stopped;
    info!(LOG_LEVEL, &ctx.node, format!("{} stopping", self.host));
    let agents = self.agents.keys().map(|a| lc_inbox(a));
    for dest in std::iter::once(multicast()).chain(agents).collect_vec() {
      let msg = SnoozeMsg::new(&self.host, dest, MsgKind::CoordinatorTerminate);
      match ctx.node.send_reliable(&msg).await {
        Ok(()) => (),
        Err(e) if e.is_host_failure() => {
          error!(LOG_LEVEL, &ctx.node, format!("Termination notices abandoned: {}", e));
          break;
        }
        Err(e) => warn!(LOG_LEVEL, &ctx.node, format!("Termination notice not delivered: {}", e)),
      }
    }
    self.ack_pool = None;
    self.observer.send(SnoozeEvent::CoordinatorStopped {
      coordinator: self.host.clone(),
      graceful: true,
    });
    ctx.stop();
  }

  fn crash(&mut self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>) {
    if self.state == State::Stopped {
      return;
    }
    error!(LOG_LEVEL, &ctx.node, format!("{} failing", self.host));
    self.state = State::Stopped;
    self.ack_pool = None;
    self.observer.send(SnoozeEvent::CoordinatorStopped {
      coordinator: self.host.clone(),
      graceful: false,
    });
    ctx.stop();
  }

  /// Runs after every message and every receive timeout.
  fn housekeeping(&mut self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>) {
    let now = ctx.node.now();
    match self.state.clone() {
      State::Promoting { prev, deadline, .. } if now > deadline => {
        warn!(LOG_LEVEL, &ctx.node, format!("{} was not confirmed as leader", self.host));
        self.state = *prev;
        if self.state == State::Joining {
          return;
        }
      }
      State::Joining | State::Stopped => return,
      _ => (),
    }
    for (agent, _) in self.agents.sweep(now, self.config.heartbeat_timeout) {
      info!(LOG_LEVEL, &ctx.node, format!("{} lost agent {}", self.host, agent));
      self.observer.send(SnoozeEvent::AgentRemoved {
        agent: agent,
        coordinator: self.host.clone(),
      });
    }
    if self.state == State::Attached && self.leader_dead(now) {
      if self.last_election_request.map(|t| t < self.leader_ts).unwrap_or(true) {
        self.observer.send(SnoozeEvent::LeaderLost {
          coordinator: self.host.clone(),
        });
      }
      self.request_election(ctx);
    }
  }

  fn report(&mut self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>) {
    match self.state {
      State::Stopped => return,
      State::Joining => self.join_broker(ctx),
      _ => {
        let now = ctx.node.now();
        if let Some(leader) = &self.leader {
          let summary = ChargeSummary::average(self.agents.iter().map(|(_, r)| &r.value), now);
          let dest = gl_inbox(leader).sub(GM_PERIODIC);
          let beat = MsgKind::HeartbeatUp(Beat::Summary(summary));
          let msg = SnoozeMsg::new(&self.host, dest, beat);
          self.send(ctx, msg);
        }
        let beat = MsgKind::HeartbeatUp(Beat::Coordinator);
        let msg = SnoozeMsg::new(&self.host, multicast().sub(RELAY_GM_BEATS), beat)
          .reply_to(self.inbox.clone());
        self.send(ctx, msg);
      }
    }
    ctx.node.schedule_local_msg(self.config.heartbeat_interval, ctx.local_interface(), ReportTick);
  }

  /// Arms the first scheduling tick, once.
  fn start_scheduling(&mut self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>) {
    if self.scheduling_started {
      return;
    }
    self.scheduling_started = true;
    match self.config.scheduling_mode {
      SchedulingMode::Periodic => {
        self.schedule.arm(&ctx.node, ctx.local_interface(), ScheduleTick);
      }
      SchedulingMode::Reactive => {
        let poll = self.config.violation_poll_interval;
        ctx.node.schedule_local_msg(poll, ctx.local_interface(), ScheduleTick);
      }
    }
  }

  fn may_schedule(&self, now: Duration) -> bool {
    matches!(self.state, State::Attached | State::Promoted)
      && self.leader.is_some()
      && !self.leader_dead(now)
  }

  fn managed_hosts(&self) -> Vec<String> {
    self.agents.keys().cloned().collect()
  }

  fn violated(&self) -> bool {
    let (snapshot, _) = ClusterSnapshot::extract(self.infra.nodes(&self.managed_hosts()));
    !snapshot.is_viable()
  }

  fn on_schedule_tick(&mut self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>) {
    if self.state == State::Stopped {
      return;
    }
    let now = ctx.node.now();
    let ready = self.scheduler.is_some() && self.may_schedule(now);
    match self.config.scheduling_mode {
      SchedulingMode::Periodic if ready => self.start_cycle(ctx, true),
      SchedulingMode::Periodic => {
        self.schedule.arm(&ctx.node, ctx.local_interface(), ScheduleTick);
      }
      SchedulingMode::Reactive if ready && self.violated() => {
        debug!(LOG_LEVEL, &ctx.node, format!("{} detected a violation", self.host));
        self.start_cycle(ctx, true);
      }
      SchedulingMode::Reactive => {
        let poll = self.config.violation_poll_interval;
        ctx.node.schedule_local_msg(poll, ctx.local_interface(), ScheduleTick);
      }
    }
  }

  fn trigger(&mut self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>) {
    if self.scheduler.is_none() {
      debug!(LOG_LEVEL, &ctx.node, format!("{} deferring cycle", self.host));
      self.pending_trigger = true;
      self.observer.send(SnoozeEvent::CycleDeferred {
        coordinator: self.host.clone(),
      });
    } else if self.may_schedule(ctx.node.now()) {
      self.start_cycle(ctx, false);
    } else {
      info!(LOG_LEVEL, &ctx.node, format!("{} cannot schedule in {:?}", self.host, self.state));
    }
  }

  /// Hands the scheduler to a blocking task. It comes back with [`CycleDone`], so holding it is
  /// what makes cycles single-flight.
  fn start_cycle(&mut self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>, from_tick: bool) {
    let mut scheduler = match self.scheduler.take() {
      Some(s) => s,
      None => return,
    };
    self.observer.send(SnoozeEvent::CycleStarted {
      coordinator: self.host.clone(),
    });
    let infra = self.infra.clone();
    let hosts = self.managed_hosts();
    let me = ctx.local_interface::<CoordinatorMsg>();
    ctx.node.rt().spawn(async move {
      let start = Instant::now();
      let res = tokio::task::spawn_blocking(move || {
        let report = run_cycle(scheduler.as_mut(), infra.as_ref(), &hosts);
        (report, scheduler)
      })
      .await;
      match res {
        Ok((report, scheduler)) => me.send(CycleDone(report, Some(scheduler), from_tick)),
        Err(e) => {
          let report = CycleReport {
            outcome: CycleOutcome::NoViablePlan,
            duration: start.elapsed(),
            nodes: 0,
            planned: 0,
            applied: 0,
            cost: Duration::from_millis(0),
            off_hosts: vec![],
            failure: Some(e.to_string()),
          };
          me.send(CycleDone(report, None, from_tick))
        }
      }
    });
  }

  fn cycle_done(
    &mut self,
    ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>,
    report: CycleReport,
    scheduler: Option<Box<dyn Scheduler>>,
    from_tick: bool,
  ) {
    self.scheduler = Some(scheduler.unwrap_or_else(|| (self.factory)()));
    for host in report.off_hosts.iter() {
      warn!(LOG_LEVEL, &ctx.node, format!("{} scheduled over {}, which is off", self.host, host));
    }
    let (code, ms) = (report.outcome.code(), report.duration_ms());
    match report.outcome {
      CycleOutcome::NoReconfigurationNeeded => {
        trace!(LOG_LEVEL, &ctx.node, format!("{} cycle: nothing to do in {}ms", self.host, ms))
      }
      CycleOutcome::Applied => {
        let applied = report.applied;
        info!(LOG_LEVEL, &ctx.node, format!("{} applied {} in {}ms", self.host, applied, ms))
      }
      _ => {
        let failure = report.failure.clone().unwrap_or_default();
        warn!(LOG_LEVEL, &ctx.node, format!("{} cycle returned {}: {}", self.host, code, failure))
      }
    }
    let took = report.duration;
    self.observer.send(SnoozeEvent::CycleFinished {
      coordinator: self.host.clone(),
      report: report,
    });
    if self.state == State::Stopped {
      return;
    }
    if from_tick {
      match self.config.scheduling_mode {
        SchedulingMode::Periodic => {
          self.schedule.record(took);
          self.schedule.arm(&ctx.node, ctx.local_interface(), ScheduleTick);
        }
        SchedulingMode::Reactive => {
          let poll = self.config.violation_poll_interval;
          ctx.node.schedule_local_msg(poll, ctx.local_interface(), ScheduleTick);
        }
      }
    }
    if self.pending_trigger {
      self.pending_trigger = false;
      self.trigger(ctx);
    }
  }
}
#[async_trait]
impl TimeoutActor<SnoozeMsg, CoordinatorMsg> for GroupCoordinator {
  async fn pre_start(
    &mut self,
    ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>,
  ) -> Option<Duration> {
    self.leader_ts = ctx.node.now();
    self.start_pool(ctx);
    self.join_broker(ctx);
    if self.config.elect_on_join {
      self.request_election(ctx);
    }
    ctx.node.schedule_local_msg(self.config.heartbeat_interval, ctx.local_interface(), ReportTick);
    None
  }

  async fn recv(
    &mut self,
    ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>,
    msg: CoordinatorMsg,
  ) -> Option<Duration> {
    match msg {
      Remote(msg) => {
        if self.state != State::Stopped {
          self.handle(ctx, msg).await;
        }
      }
      Cmd(CoordinatorCmd::Stop) => self.stop(ctx).await,
      Cmd(CoordinatorCmd::Fail) => self.crash(ctx),
      Cmd(CoordinatorCmd::TriggerCycle) => self.trigger(ctx),
      ReportTick => self.report(ctx),
      ScheduleTick => self.on_schedule_tick(ctx),
      CycleDone(report, scheduler, from_tick) => {
        self.cycle_done(ctx, report, scheduler, from_tick)
      }
    }
    self.housekeeping(ctx);
    None
  }

  async fn timeout(&mut self, ctx: &ActorContext<SnoozeMsg, CoordinatorMsg>) -> Option<Duration> {
    self.housekeeping(ctx);
    None
  }
}

/// Sends queued join acknowledgements, one at a time per worker, until the coordinator goes away.
/// A failure of the local host stops the coordinator.
async fn ack_worker(
  node: Node<SnoozeMsg>,
  coordinator: LocalRef<CoordinatorMsg>,
  rx: Arc<Mutex<UnboundedReceiver<SnoozeMsg>>>,
) {
  loop {
    let msg = rx.lock().await.recv().await;
    let msg = match msg {
      Some(msg) => msg,
      None => break,
    };
    match node.send_reliable(&msg).await {
      Ok(()) => (),
      Err(e) if e.is_host_failure() => {
        error!(LOG_LEVEL, &node, format!("Join acknowledgement failed: {}", e));
        coordinator.send(Cmd(CoordinatorCmd::Stop));
        break;
      }
      Err(e) => warn!(LOG_LEVEL, &node, format!("Join acknowledgement lost: {}", e)),
    }
  }
}
