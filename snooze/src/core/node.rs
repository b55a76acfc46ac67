use crate::core::{
  register, run_single, run_single_timeout, Actor, ActorContext, Envelope, LocalActorMsg,
  LocalRef, Mailbox, RecvError, Recvr, Registry, RegistryMsg, TimeoutActor, TransportError,
  LOG_LEVEL,
};
use crate::testkit::{FailureConfigMap, LogLevel, Logger, LoggerMsg};
use crate::{trace, warn};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Configures a [`Node`].
#[derive(Clone)]
pub struct NodeConfig {
  /// The host every process spawned without an explicit host is considered to run on.
  ///
  /// default: `"localhost"`
  pub host: String,
  /// Worker threads in the [`Node`]'s runtime.
  ///
  /// default: the number of logical CPUs
  pub actor_threads: usize,
  /// Drop probabilities and delays applied by [`Node::send_unreliable`].
  ///
  /// default: read from `SNOOZE_PACKET_DROP`, `SNOOZE_MIN_DELAY` and `SNOOZE_MAX_DELAY`
  pub fail_map: FailureConfigMap,
  /// Messages below this level are not printed.
  ///
  /// default: read from `SNOOZE_LOG_LEVEL`, or `Warn`
  pub log_level: LogLevel,
}
impl Default for NodeConfig {
  fn default() -> Self {
    NodeConfig {
      host: "localhost".to_string(),
      actor_threads: num_cpus::get(),
      fail_map: FailureConfigMap::from_env(),
      log_level: *crate::testkit::env::LOG_LEVEL,
    }
  }
}

struct NodeImpl<U: Envelope> {
  host: String,
  rt: Runtime,
  registry: LocalRef<RegistryMsg<U>>,
  logger: LocalRef<LoggerMsg>,
  start: Instant,
  fail_map: FailureConfigMap,
  ids: AtomicU64,
}

/// A process-wide message substrate: a runtime, a registry of named mailboxes, a logger and a
/// monotonic clock shared by every actor spawned on it.
pub struct Node<U: Envelope> {
  node: Arc<NodeImpl<U>>,
}
impl<U: Envelope> Clone for Node<U> {
  fn clone(&self) -> Self {
    Node {
      node: self.node.clone(),
    }
  }
}
impl<U: Envelope> Node<U> {
  pub fn new(config: NodeConfig) -> std::io::Result<Node<U>> {
    let rt = tokio::runtime::Builder::new_multi_thread()
      .worker_threads(config.actor_threads.max(1))
      .thread_name("snooze-actor")
      .enable_time()
      .build()?;
    let (reg_tx, reg_rx) = unbounded_channel::<LocalActorMsg<RegistryMsg<U>>>();
    let (log_tx, log_rx) = unbounded_channel::<LocalActorMsg<LoggerMsg>>();
    let node = Node {
      node: Arc::new(NodeImpl {
        host: config.host,
        rt: rt,
        registry: ActorContext::<U, RegistryMsg<U>>::create_local(reg_tx.clone()),
        logger: ActorContext::<U, LoggerMsg>::create_local(log_tx.clone()),
        start: Instant::now(),
        fail_map: config.fail_map,
        ids: AtomicU64::new(1),
      }),
    };
    let reg_ctx = ActorContext {
      tx: reg_tx,
      name: Mailbox::from("registry"),
      node: node.clone(),
    };
    node.rt().spawn(run_single(Registry::new(), reg_ctx, reg_rx, 0, vec![]));
    let log_ctx = ActorContext {
      tx: log_tx,
      name: Mailbox::from("logger"),
      node: node.clone(),
    };
    node.rt().spawn(run_single(Logger::new(config.log_level), log_ctx, log_rx, 0, vec![]));
    Ok(node)
  }

  pub fn rt(&self) -> &Runtime {
    &self.node.rt
  }

  pub fn host(&self) -> &str {
    self.node.host.as_str()
  }

  /// Time elapsed since this node was created. Every actor on the node shares this clock.
  pub fn now(&self) -> Duration {
    self.node.start.elapsed()
  }

  pub fn log(&self, msg: LoggerMsg) {
    self.node.logger.send(msg);
  }

  pub(crate) fn registry(&self, msg: RegistryMsg<U>) {
    self.node.registry.send(msg);
  }

  fn next_id(&self) -> u64 {
    self.node.ids.fetch_add(1, Ordering::Relaxed)
  }

  /// Spawns an actor bound to `name` and every alias. Envelopes addressed to any of them are
  /// converted into the actor's message type.
  pub fn spawn<S, A>(&self, actor: A, name: Mailbox, aliases: Vec<Mailbox>) -> LocalRef<S>
  where
    S: From<U> + Send + 'static,
    A: Actor<U, S> + Send + 'static,
  {
    let (tx, rx) = unbounded_channel::<LocalActorMsg<S>>();
    let ctx = ActorContext {
      tx: tx,
      name: name,
      node: self.clone(),
    };
    let bindings = Self::bindings(&ctx, aliases);
    let local = ctx.local_interface::<S>();
    self.rt().spawn(run_single(actor, ctx, rx, self.next_id(), bindings));
    local
  }

  pub fn spawn_timeout<S, A>(
    &self,
    actor: A,
    name: Mailbox,
    aliases: Vec<Mailbox>,
    timeout: Duration,
  ) -> LocalRef<S>
  where
    S: From<U> + Send + 'static,
    A: TimeoutActor<U, S> + Send + 'static,
  {
    let (tx, rx) = unbounded_channel::<LocalActorMsg<S>>();
    let ctx = ActorContext {
      tx: tx,
      name: name,
      node: self.clone(),
    };
    let bindings = Self::bindings(&ctx, aliases);
    let local = ctx.local_interface::<S>();
    self.rt().spawn(run_single_timeout(actor, ctx, rx, self.next_id(), bindings, timeout));
    local
  }

  fn bindings<S>(ctx: &ActorContext<U, S>, aliases: Vec<Mailbox>) -> Vec<(Mailbox, Recvr<U>)>
  where
    S: From<U> + Send + 'static,
  {
    std::iter::once(ctx.name.clone())
      .chain(aliases)
      .map(|name| (name, ctx.remote_recvr()))
      .collect()
  }

  pub fn schedule_local_msg<T: Send + 'static>(
    &self,
    delay: Duration,
    actor: LocalRef<T>,
    msg: T,
  ) -> JoinHandle<bool> {
    self.rt().spawn(async move {
      tokio::time::sleep(delay).await;
      actor.send(msg)
    })
  }

  fn encode(&self, msg: &U) -> Option<Vec<u8>> {
    match serde_cbor::to_vec(msg) {
      Ok(bytes) => Some(bytes),
      Err(e) => {
        warn!(LOG_LEVEL, self, format!("Could not encode {:?}: {}", msg, e));
        None
      }
    }
  }

  /// Fire-and-forget delivery to the envelope's destination.
  pub fn send(&self, msg: &U) {
    if let Some(bytes) = self.encode(msg) {
      self.registry(RegistryMsg::Forward(bytes, None));
    }
  }

  /// Like [`send`](Node::send), but subject to the drop probability and delay configured for the
  /// destination in this node's [`FailureConfigMap`].
  pub fn send_unreliable(&self, msg: &U) {
    let config = *self.node.fail_map.get(msg.destination());
    if config.drop_prob > 0.0 && rand::random::<f64>() < config.drop_prob {
      trace!(LOG_LEVEL, self, format!("Dropped message to {}", msg.destination()));
      return;
    }
    let bytes = match self.encode(msg) {
      Some(bytes) => bytes,
      None => return,
    };
    match config.delay {
      Some((min, max)) if min <= max => {
        let micros =
          rand::thread_rng().gen_range(min.as_micros() as u64..=max.as_micros() as u64);
        let registry = self.node.registry.clone();
        self.rt().spawn(async move {
          tokio::time::sleep(Duration::from_micros(micros)).await;
          registry.send(RegistryMsg::Forward(bytes, None));
        });
      }
      _ => self.registry(RegistryMsg::Forward(bytes, None)),
    }
  }

  /// Resolves once a live receiver has accepted the envelope.
  pub async fn send_reliable(&self, msg: &U) -> Result<(), TransportError> {
    let dest = msg.destination().clone();
    let bytes = serde_cbor::to_vec(msg).map_err(|e| TransportError::Encode(dest.clone(), e))?;
    let (tx, rx) = oneshot::channel();
    if !self.node.registry.send(RegistryMsg::Forward(bytes, Some(tx))) {
      return Err(TransportError::NodeDown);
    }
    match rx.await {
      Ok(true) => Ok(()),
      Ok(false) => Err(TransportError::Unreachable(dest)),
      Err(_) => Err(TransportError::NodeDown),
    }
  }

  /// Binds an ad-hoc receive box, for request/reply exchanges that happen outside an actor's own
  /// inbox. The binding is released when the returned receiver is dropped.
  pub async fn mailbox(&self, name: Mailbox) -> MailboxRecvr<U> {
    let id = self.next_id();
    let (tx, rx) = unbounded_channel::<U>();
    let recvr: Recvr<U> = Box::new(move |msg: U| tx.send(msg).is_ok());
    let bound = register(self, id, vec![(name.clone(), recvr)]).await;
    MailboxRecvr {
      node: self.clone(),
      name: name,
      id: id,
      rx: rx,
      bound: !bound.is_empty(),
    }
  }
}

pub struct MailboxRecvr<U: Envelope> {
  node: Node<U>,
  name: Mailbox,
  id: u64,
  rx: UnboundedReceiver<U>,
  bound: bool,
}
impl<U: Envelope> MailboxRecvr<U> {
  pub fn name(&self) -> &Mailbox {
    &self.name
  }

  pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<U, RecvError> {
    match tokio::time::timeout(timeout, self.rx.recv()).await {
      Ok(Some(msg)) => Ok(msg),
      Ok(None) => Err(RecvError::Closed),
      Err(_) => Err(RecvError::Timeout),
    }
  }

  /// Discards everything already queued and returns how many messages were dropped.
  pub async fn drain(&mut self) -> usize {
    let mut dropped = 0;
    while self.recv_timeout(Duration::from_millis(0)).await.is_ok() {
      dropped += 1;
    }
    dropped
  }
}
impl<U: Envelope> Drop for MailboxRecvr<U> {
  fn drop(&mut self) {
    if self.bound {
      self.node.registry(RegistryMsg::Deregister(self.name.clone(), self.id));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::{Deserialize, Serialize};

  #[derive(Debug, PartialEq, Serialize, Deserialize)]
  struct Ping {
    dest: Mailbox,
    n: u32,
  }
  impl Envelope for Ping {
    fn destination(&self) -> &Mailbox {
      &self.dest
    }
  }

  fn node() -> Node<Ping> {
    let mut config = NodeConfig::default();
    config.actor_threads = 2;
    config.fail_map = FailureConfigMap::default();
    config.log_level = LogLevel::Off;
    Node::new(config).unwrap()
  }

  #[test]
  fn reliable_send_reaches_bound_mailbox() {
    let node = node();
    tokio_test::block_on(async {
      let mut rx = node.mailbox(Mailbox::from("pinger")).await;
      let ping = Ping {
        dest: rx.name().clone(),
        n: 4,
      };
      node.send_reliable(&ping).await.unwrap();
      assert_eq!(rx.recv_timeout(Duration::from_secs(1)).await, Ok(ping));
    });
  }

  #[test]
  fn reliable_send_to_unbound_mailbox_fails() {
    let node = node();
    tokio_test::block_on(async {
      let ping = Ping {
        dest: Mailbox::from("nobody"),
        n: 1,
      };
      match node.send_reliable(&ping).await {
        Err(TransportError::Unreachable(m)) => assert_eq!(m.as_str(), "nobody"),
        other => panic!("unexpected result: {:?}", other),
      }
    });
  }

  #[test]
  fn receive_times_out_on_empty_mailbox() {
    let node = node();
    tokio_test::block_on(async {
      let mut rx = node.mailbox(Mailbox::from("quiet")).await;
      let res = rx.recv_timeout(Duration::from_millis(20)).await;
      assert_eq!(res, Err(RecvError::Timeout));
    });
  }

  #[test]
  fn certain_drop_never_delivers() {
    let mut config = NodeConfig::default();
    config.fail_map = FailureConfigMap::default();
    config.fail_map.cluster_wide.drop_prob = 1.0;
    config.log_level = LogLevel::Off;
    let node = Node::<Ping>::new(config).unwrap();
    tokio_test::block_on(async {
      let mut rx = node.mailbox(Mailbox::from("lossy")).await;
      node.send_unreliable(&Ping {
        dest: Mailbox::from("lossy"),
        n: 2,
      });
      assert_eq!(rx.recv_timeout(Duration::from_millis(50)).await, Err(RecvError::Timeout));
    });
  }
}
