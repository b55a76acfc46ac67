use snooze::cluster::{SchedulingMode, SnoozeConfig, SnoozeEvent};
use snooze::testkit::Harness;
use std::env::args;
use std::time::Duration;

// snooze-sim [coordinators] [agents] [seconds] [periodic|reactive]
fn main() {
  let mut args = args().skip(1);
  let coordinators = args.next().and_then(|x| x.parse::<usize>().ok()).unwrap_or(3);
  let agents = args.next().and_then(|x| x.parse::<usize>().ok()).unwrap_or(6);
  let seconds = args.next().and_then(|x| x.parse::<u64>().ok()).unwrap_or(5);
  let mut config = SnoozeConfig::default();
  if args.next().as_deref() == Some("reactive") {
    config.scheduling_mode = SchedulingMode::Reactive;
  }

  let mut harness = Harness::new(config).unwrap();
  for i in 0..agents {
    let host = format!("node-{}", i);
    harness.infra.add_host(&host, 100.0, 8192);
    let cpu = if i == 0 { 70.0 } else { 20.0 };
    harness.infra.place(&host, &format!("vm-{}-a", i), cpu, 2048).unwrap();
    harness.infra.place(&host, &format!("vm-{}-b", i), 40.0, 1024).unwrap();
  }

  harness.spawn_broker();
  harness.spawn_leader("leader-0");
  for i in 0..coordinators {
    harness.spawn_coordinator(&format!("gm-{}", i));
  }
  for i in 0..agents {
    harness.spawn_agent(&format!("node-{}", i));
  }

  let half = Duration::from_millis(seconds * 500);
  for event in harness.collect_for(half) {
    print_event(&event);
  }
  println!("-- failing leader-0");
  harness.fail_leader("leader-0");
  for event in harness.collect_for(half) {
    print_event(&event);
  }
  let migrations = harness.infra.migrations().len();
  println!("-- viable: {}, migrations: {}", harness.infra.is_viable(), migrations);
}

fn print_event(event: &SnoozeEvent) {
  match event {
    SnoozeEvent::CycleFinished { coordinator, report } => println!(
      "{}: cycle {} in {}ms, {}/{} migrations",
      coordinator,
      report.outcome.code(),
      report.duration_ms(),
      report.applied,
      report.planned
    ),
    other => println!("{:?}", other),
  }
}
