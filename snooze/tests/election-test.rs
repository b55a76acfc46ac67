#![allow(unused_imports, dead_code, unused_variables)]
use snooze::cluster::{
  gm_inbox, multicast, Beat, Joiner, MsgKind, SnoozeConfig, SnoozeEvent, SnoozeMsg, GL_ELEC,
  NEW_GM, RELAY_GM_BEATS,
};
use snooze::core::{Mailbox, MailboxRecvr, NodeConfig};
use snooze::testkit::{FailureConfigMap, Harness, LogLevel, BROKER_HOST};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use SnoozeEvent::*;

const TIMEOUT: Duration = Duration::from_millis(5_000);

fn harness(config: SnoozeConfig) -> Harness {
  let mut node_config = NodeConfig::default();
  node_config.actor_threads = 4;
  node_config.fail_map = FailureConfigMap::default();
  node_config.log_level = LogLevel::Warn;
  Harness::with_node_config(config, node_config).unwrap()
}

fn wait_attached(harness: &Harness, count: usize) -> HashSet<String> {
  let mut attached = HashSet::new();
  while attached.len() < count {
    match harness.wait_for(TIMEOUT, |e| matches!(e, CoordinatorAttached { .. })) {
      Some(CoordinatorAttached { coordinator, .. }) => attached.insert(coordinator),
      other => panic!("only {:?} attached, got {:?}", attached, other),
    };
  }
  attached
}

/// Joins the broker as coordinator `host` and keeps beating, but never answers an election.
fn silent_coordinator(harness: &Harness, host: &str) -> MailboxRecvr<SnoozeMsg> {
  let node = harness.node.clone();
  let inbox = node.rt().block_on(node.mailbox(gm_inbox(host)));
  let join = MsgKind::JoinRequest(Joiner::Coordinator);
  node.send(&SnoozeMsg::new(host, multicast().sub(NEW_GM), join).reply_to(gm_inbox(host)));
  let relay = multicast().sub(RELAY_GM_BEATS);
  let beat =
    SnoozeMsg::new(host, relay, MsgKind::HeartbeatUp(Beat::Coordinator)).reply_to(gm_inbox(host));
  let interval = harness.config.heartbeat_interval;
  let beater = node.clone();
  node.rt().spawn(async move {
    for _ in 0..200 {
      beater.send(&beat);
      tokio::time::sleep(interval).await;
    }
  });
  inbox
}

#[test]
fn leader_failure_promotes_exactly_one_coordinator() {
  let mut harness = harness(SnoozeConfig::default());
  harness.spawn_broker();
  harness.spawn_leader("leader-0");
  for gm in &["gm-1", "gm-2", "gm-3"] {
    harness.spawn_coordinator(gm);
  }
  wait_attached(&harness, 3);

  harness.fail_leader("leader-0");
  let events = harness.collect_for(Duration::from_millis(3_000));

  let promoted = events
    .iter()
    .filter_map(|e| match e {
      CoordinatorPromoted { coordinator } => Some(coordinator.clone()),
      _ => None,
    })
    .collect::<Vec<_>>();
  assert_eq!(promoted.len(), 1, "events: {:?}", events);
  let elected = events
    .iter()
    .filter(|e| matches!(e, LeaderElected { promoted: true, .. }))
    .count();
  assert_eq!(elected, 1);
  assert!(events.contains(&LeaderStarted {
    leader: promoted[0].clone(),
  }));

  let noticed = events
    .iter()
    .filter_map(|e| match e {
      LeaderTerminationNotice {
        coordinator,
        old_leader,
      } if old_leader == "leader-0" => Some(coordinator.clone()),
      _ => None,
    })
    .collect::<HashSet<_>>();
  assert_eq!(noticed.len(), 2);
  assert!(!noticed.contains(&promoted[0]));
}

#[test]
fn empty_cluster_creates_leader_from_nothing() {
  let mut harness = harness(SnoozeConfig::default());
  harness.spawn_broker();
  let events = harness.collect_for(Duration::from_millis(1_500));
  assert!(events.contains(&LeaderElected {
    leader: BROKER_HOST.to_string(),
    promoted: false,
  }));
  assert!(events.contains(&LeaderStarted {
    leader: BROKER_HOST.to_string(),
  }));
  let elections = events.iter().filter(|e| **e == ElectionStarted).count();
  assert_eq!(elections, 1, "events: {:?}", events);
}

#[test]
fn leaderless_coordinator_is_promoted() {
  let mut harness = harness(SnoozeConfig::default());
  harness.spawn_broker();
  harness.spawn_coordinator("gm-1");
  let events = harness.collect_for(Duration::from_millis(2_000));
  assert!(events.contains(&LeaderElected {
    leader: "gm-1".to_string(),
    promoted: true,
  }));
  assert!(events.contains(&CoordinatorPromoted {
    coordinator: "gm-1".to_string(),
  }));
  assert!(events.contains(&CoordinatorStopped {
    coordinator: "gm-1".to_string(),
    graceful: true,
  }));
}

#[test]
fn election_on_join_replaces_live_leader() {
  let mut config = SnoozeConfig::default();
  config.elect_on_join = true;
  let mut harness = harness(config);
  harness.spawn_broker();
  harness.spawn_leader("leader-0");
  let started = harness.wait_for(TIMEOUT, |e| matches!(e, LeaderStarted { .. }));
  assert!(started.is_some());
  std::thread::sleep(Duration::from_millis(300));

  harness.spawn_coordinator("gm-1");
  let events = harness.collect_for(Duration::from_millis(2_000));
  assert!(events.contains(&LeaderElected {
    leader: "gm-1".to_string(),
    promoted: true,
  }));
  assert!(events.contains(&LeaderStopped {
    leader: "leader-0".to_string(),
  }));
}

#[test]
fn surviving_leader_is_not_replaced() {
  let mut harness = harness(SnoozeConfig::default());
  harness.spawn_broker();
  harness.spawn_leader("leader-0");
  harness.spawn_coordinator("gm-1");
  harness.spawn_coordinator("gm-2");
  wait_attached(&harness, 2);
  let events = harness.collect_for(Duration::from_millis(1_500));
  assert!(!events.contains(&ElectionStarted), "events: {:?}", events);
}

#[test]
fn exhausted_election_leaves_cluster_leaderless() {
  let mut config = SnoozeConfig::default();
  config.max_election_candidates = 3;
  let mut harness = harness(config.clone());
  harness.spawn_broker();
  harness.spawn_leader("leader-0");
  assert!(harness.wait_for(TIMEOUT, |e| matches!(e, LeaderStarted { .. })).is_some());
  let _silent = silent_coordinator(&harness, "gm-silent");
  let registered = harness.wait_for(TIMEOUT, |e| matches!(e, CoordinatorRegistered { .. }));
  assert!(registered.is_some());

  harness.fail_leader("leader-0");
  assert!(harness.wait_for(TIMEOUT, |e| *e == ElectionStarted).is_some());
  let started = Instant::now();
  let failed = harness.wait_for(TIMEOUT, |e| matches!(e, ElectionFailed { .. }));
  let took = started.elapsed();
  assert_eq!(failed, Some(ElectionFailed { tried: 3 }));
  let bound = config.election_reply_timeout * config.max_election_candidates;
  assert!(took <= bound + Duration::from_millis(200), "took {:?}", took);

  // A coordinator asking again must not hear that leader-0 is alive
  let node = harness.node.clone();
  let reply = node.rt().block_on(async {
    let mut reply = node.mailbox(gm_inbox("gm-silent").sub(GL_ELEC)).await;
    let req = SnoozeMsg::new("gm-silent", multicast(), MsgKind::ElectionRequest)
      .reply_to(reply.name().clone());
    node.send(&req);
    reply.recv_timeout(Duration::from_millis(300)).await
  });
  assert!(reply.is_err(), "dead leader reported alive: {:?}", reply);
  assert!(harness.wait_for(TIMEOUT, |e| *e == ElectionStarted).is_some());
  let failed = harness.wait_for(TIMEOUT, |e| matches!(e, ElectionFailed { .. }));
  assert_eq!(failed, Some(ElectionFailed { tried: 3 }));
}

#[test]
fn unconfirmed_candidate_resumes_joining() {
  let mut config = SnoozeConfig::default();
  config.scheduling_period = Duration::from_millis(200);
  let mut harness = harness(config.clone());
  harness.spawn_coordinator("gm-1");

  let node = harness.node.clone();
  let ack = node.rt().block_on(async {
    let mut reply = node.mailbox(Mailbox::from("unconfirmed-glElection")).await;
    for _ in 0..50 {
      let req = SnoozeMsg::new(BROKER_HOST, gm_inbox("gm-1"), MsgKind::ElectionRequest)
        .reply_to(reply.name().clone());
      node.send(&req);
      if let Ok(msg) = reply.recv_timeout(Duration::from_millis(100)).await {
        return Some(msg.kind);
      }
    }
    None
  });
  assert_eq!(ack, Some(MsgKind::ElectionStopAck));
  std::thread::sleep(config.election_reply_timeout * 3);

  harness.spawn_broker();
  harness.spawn_leader("leader-0");
  let events = harness.collect_for(Duration::from_millis(2_000));
  assert!(
    events.contains(&CoordinatorAttached {
      coordinator: "gm-1".to_string(),
      leader: "leader-0".to_string(),
    }),
    "events: {:?}",
    events
  );
  assert!(events.contains(&CycleStarted {
    coordinator: "gm-1".to_string(),
  }));
  assert!(!events.contains(&LeaderLost {
    coordinator: "gm-1".to_string(),
  }));
}
