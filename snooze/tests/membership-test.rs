#![allow(unused_imports, dead_code, unused_variables)]
use maplit::hashset;
use snooze::cluster::{
  lc_inbox, multicast, Joiner, MsgKind, RelayedBeat, SnoozeConfig, SnoozeEvent, SnoozeMsg, NEW_LC,
};
use snooze::core::{NodeConfig, RecvError};
use snooze::testkit::{FailureConfigMap, Harness, LogLevel};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use SnoozeEvent::*;

const TIMEOUT: Duration = Duration::from_millis(5_000);

fn harness() -> Harness {
  let mut node_config = NodeConfig::default();
  node_config.actor_threads = 4;
  node_config.fail_map = FailureConfigMap::default();
  node_config.log_level = LogLevel::Warn;
  Harness::with_node_config(SnoozeConfig::default(), node_config).unwrap()
}

fn add_agents(harness: &mut Harness, count: usize) {
  for i in 0..count {
    let host = format!("node-{}", i);
    harness.infra.add_host(&host, 100.0, 4096);
    harness.infra.place(&host, &format!("vm-{}", i), 10.0, 512).unwrap();
    harness.spawn_agent(&host);
  }
}

/// Agent to coordinator, for the next `count` agents that join.
fn wait_joined(harness: &Harness, count: usize) -> HashMap<String, String> {
  let mut joined = HashMap::new();
  while joined.len() < count {
    match harness.wait_for(TIMEOUT, |e| matches!(e, AgentJoined { .. })) {
      Some(AgentJoined { agent, coordinator }) => joined.insert(agent, coordinator),
      other => panic!("only {:?} joined, got {:?}", joined, other),
    };
  }
  joined
}

#[test]
fn agents_join_and_stay() {
  let mut harness = harness();
  harness.spawn_broker();
  harness.spawn_leader("leader-0");
  harness.spawn_coordinator("gm-1");
  add_agents(&mut harness, 3);

  let joined = wait_joined(&harness, 3);
  let agents = joined.keys().cloned().collect::<HashSet<_>>();
  assert_eq!(agents, hashset! {
    "node-0".to_string(),
    "node-1".to_string(),
    "node-2".to_string(),
  });
  assert!(joined.values().all(|gm| gm == "gm-1"));

  let events = harness.collect_for(Duration::from_millis(1_000));
  assert!(!events.iter().any(|e| matches!(e, AgentRemoved { .. })), "events: {:?}", events);
}

#[test]
fn agents_rejoin_after_graceful_stop() {
  let mut harness = harness();
  harness.spawn_broker();
  harness.spawn_leader("leader-0");
  harness.spawn_coordinator("gm-1");
  harness.spawn_coordinator("gm-2");
  let attached = harness.collect_for(Duration::from_millis(500));
  add_agents(&mut harness, 4);
  let joined = wait_joined(&harness, 4);
  let orphans = joined
    .iter()
    .filter(|(_, gm)| *gm == "gm-1")
    .map(|(agent, _)| agent.clone())
    .collect::<HashSet<_>>();

  assert!(harness.stop_coordinator("gm-1"));
  let stopped = harness.wait_for(TIMEOUT, |e| matches!(e, CoordinatorStopped { .. }));
  assert_eq!(
    stopped,
    Some(CoordinatorStopped {
      coordinator: "gm-1".to_string(),
      graceful: true,
    })
  );

  let mut rejoined = HashSet::new();
  while rejoined.len() < orphans.len() {
    match harness.wait_for(TIMEOUT, |e| matches!(e, AgentJoined { .. })) {
      Some(AgentJoined { agent, coordinator }) => {
        assert_eq!(coordinator, "gm-2");
        rejoined.insert(agent);
      }
      other => panic!("only {:?} rejoined, got {:?}", rejoined, other),
    }
  }
  assert_eq!(rejoined, orphans);
}

#[test]
fn crashed_coordinator_is_swept() {
  let mut harness = harness();
  harness.spawn_broker();
  harness.spawn_leader("leader-0");
  harness.spawn_coordinator("gm-1");
  harness.spawn_coordinator("gm-2");
  let mut registered = HashSet::new();
  while registered.len() < 2 {
    match harness.wait_for(TIMEOUT, |e| matches!(e, CoordinatorRegistered { .. })) {
      Some(CoordinatorRegistered { coordinator }) => registered.insert(coordinator),
      other => panic!("only {:?} registered, got {:?}", registered, other),
    };
  }

  harness.fail_coordinator("gm-2");
  let events = harness.collect_for(Duration::from_millis(1_500));
  assert!(events.contains(&CoordinatorStopped {
    coordinator: "gm-2".to_string(),
    graceful: false,
  }));
  assert!(events.contains(&CoordinatorRemoved {
    coordinator: "gm-2".to_string(),
  }));
  assert!(!events.contains(&CoordinatorRemoved {
    coordinator: "gm-1".to_string(),
  }));
}

#[test]
fn abandoned_join_is_forgotten() {
  let mut harness = harness();
  harness.spawn_broker();
  harness.spawn_leader("leader-0");
  assert!(harness.wait_for(TIMEOUT, |e| matches!(e, LeaderStarted { .. })).is_some());

  let config = harness.config.clone();
  let node = harness.node.clone();
  let (first, later) = node.rt().block_on(async {
    let mut inbox = node.mailbox(lc_inbox("ghost")).await;
    let join = MsgKind::JoinRequest(Joiner::Agent);
    node.send(&SnoozeMsg::new("ghost", multicast().sub(NEW_LC), join));
    let first = inbox.recv_timeout(TIMEOUT).await;
    tokio::time::sleep(config.heartbeat_timeout + config.heartbeat_interval * 2).await;
    inbox.drain().await;
    let later = inbox.recv_timeout(config.heartbeat_interval * 3).await;
    (first, later)
  });
  match first.map(|m| m.kind) {
    Ok(MsgKind::HeartbeatDownRelayed(RelayedBeat::Leader { leader, .. })) => {
      assert_eq!(leader, "leader-0")
    }
    other => panic!("joining agent got {:?}", other),
  }
  assert_eq!(later.err(), Some(RecvError::Timeout));
}
