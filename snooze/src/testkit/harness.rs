use crate::cluster::{
  gl_inbox, gm_inbox, AgentMsg, Broker, BrokerMsg, ConfigError, CoordinatorCmd, CoordinatorMsg,
  GroupCoordinator, GroupLeader, LeaderMsg, LocalController, MsgKind, SnoozeConfig, SnoozeEvent,
  SnoozeMsg,
};
use crate::core::{LocalRef, Node, NodeConfig};
use crate::scheduling::{constraint_scheduler, SchedulerFactory};
use crate::testkit::SimulatedInfrastructure;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError};
use hashbrown::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The host the broker, and any leader it creates from nothing, runs on.
pub const BROKER_HOST: &str = "broker";
const HARNESS: &str = "harness";

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error("could not start node: {0}")]
  Io(#[from] std::io::Error),
}

/// A whole simulated cluster on one [`Node`], with every process it spawned and a channel of the
/// [`SnoozeEvent`]s they emit.
pub struct Harness {
  pub node: Node<SnoozeMsg>,
  pub config: SnoozeConfig,
  pub infra: Arc<SimulatedInfrastructure>,
  events: Receiver<SnoozeEvent>,
  observer: LocalRef<SnoozeEvent>,
  scheduler: SchedulerFactory,
  broker: Option<LocalRef<BrokerMsg>>,
  leaders: HashMap<String, LocalRef<LeaderMsg>>,
  coordinators: HashMap<String, LocalRef<CoordinatorMsg>>,
  agents: HashMap<String, LocalRef<AgentMsg>>,
}
impl Harness {
  pub fn new(config: SnoozeConfig) -> Result<Harness, HarnessError> {
    Harness::with_node_config(config, NodeConfig::default())
  }

  pub fn with_node_config(
    config: SnoozeConfig,
    node_config: NodeConfig,
  ) -> Result<Harness, HarnessError> {
    let config = config.validated()?;
    let node = Node::new(node_config)?;
    let (tx, rx) = unbounded();
    Ok(Harness {
      node: node,
      config: config,
      infra: Arc::new(SimulatedInfrastructure::new()),
      events: rx,
      observer: LocalRef::from_channel(tx),
      scheduler: constraint_scheduler(),
      broker: None,
      leaders: HashMap::new(),
      coordinators: HashMap::new(),
      agents: HashMap::new(),
    })
  }

  /// Coordinators spawned after this call use `factory`.
  pub fn with_scheduler(mut self, factory: SchedulerFactory) -> Harness {
    self.scheduler = factory;
    self
  }

  pub fn spawn_broker(&mut self) {
    let broker = Broker::spawn(&self.node, BROKER_HOST, self.config.clone(), self.observer.clone());
    self.broker = Some(broker);
  }

  pub fn spawn_leader(&mut self, host: &str) {
    let leader = GroupLeader::spawn(&self.node, host, self.config.clone(), self.observer.clone());
    self.leaders.insert(host.to_string(), leader);
  }

  pub fn spawn_coordinator(&mut self, host: &str) {
    let coordinator = GroupCoordinator::spawn(
      &self.node,
      host,
      self.config.clone(),
      self.infra.clone(),
      self.scheduler.clone(),
      self.observer.clone(),
    );
    self.coordinators.insert(host.to_string(), coordinator);
  }

  /// The agent reports on `host` as found in [`infra`](Harness::infra), so add the host there
  /// first.
  pub fn spawn_agent(&mut self, host: &str) {
    let agent = LocalController::spawn(&self.node, host, self.config.clone(), self.infra.clone());
    self.agents.insert(host.to_string(), agent);
  }

  /// Crashes the leader on `host` with a Test-Fail message.
  pub fn fail_leader(&self, host: &str) {
    self.node.send(&SnoozeMsg::new(HARNESS, gl_inbox(host), MsgKind::TestFail));
  }

  /// Crashes the coordinator on `host` with a Test-Fail message.
  pub fn fail_coordinator(&self, host: &str) {
    self.node.send(&SnoozeMsg::new(HARNESS, gm_inbox(host), MsgKind::TestFail));
  }

  pub fn stop_coordinator(&self, host: &str) -> bool {
    self.command(host, CoordinatorCmd::Stop)
  }

  pub fn trigger_cycle(&self, host: &str) -> bool {
    self.command(host, CoordinatorCmd::TriggerCycle)
  }

  fn command(&self, host: &str, cmd: CoordinatorCmd) -> bool {
    self
      .coordinators
      .get(host)
      .map(|c| c.send(CoordinatorMsg::Cmd(cmd)))
      .unwrap_or(false)
  }

  /// Waits up to `timeout` for an event matching `pred`. Events that do not match are dropped.
  pub fn wait_for<F>(&self, timeout: Duration, mut pred: F) -> Option<SnoozeEvent>
  where
    F: FnMut(&SnoozeEvent) -> bool,
  {
    let deadline = Instant::now() + timeout;
    loop {
      let left = deadline.saturating_duration_since(Instant::now());
      match self.events.recv_timeout(left) {
        Ok(event) if pred(&event) => return Some(event),
        Ok(_) => (),
        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
      }
    }
  }

  /// Every event emitted during the next `duration`.
  pub fn collect_for(&self, duration: Duration) -> Vec<SnoozeEvent> {
    let deadline = Instant::now() + duration;
    let mut events = Vec::new();
    loop {
      let left = deadline.saturating_duration_since(Instant::now());
      match self.events.recv_timeout(left) {
        Ok(event) => events.push(event),
        Err(_) => return events,
      }
    }
  }
}
