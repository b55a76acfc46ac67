//! The reconfiguration-scheduler contract and the strategies that satisfy it.
//!
//! A coordinator extracts a [`ClusterSnapshot`] of the hosts it manages and hands it to a
//! [`Scheduler`], which classifies the situation as a [`ComputingState`]:
//!
//! - [`NoReconfigurationNeeded`](ComputingState::NoReconfigurationNeeded) when the solver keeps
//!   every workload where it is;
//! - [`ReconfigurationFailed`](ComputingState::ReconfigurationFailed) when the solver fails or its
//!   plan would not leave every host within capacity;
//! - [`Success`](ComputingState::Success) with a [`ReconfigurationPlan`] otherwise.
//!
//! The scheduler never touches the hosts. Applying a plan is the coordinator's job, through its
//! [`Infrastructure`], and [`run_cycle`] is the one place that does it.
//!
//! Both [`ConstraintSolver`] and [`LocalSearchSolver`] plug into the same [`ModelScheduler`], so
//! callers only ever depend on [`Scheduler`].

mod constraint;
mod heuristic;
mod model;
mod snapshot;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[rustfmt::skip]
pub use {
  constraint::ConstraintSolver,
  heuristic::LocalSearchSolver,
  model::ModelScheduler,
  model::PlacementModel,
  model::Solver,
  model::MIGRATION_MS_PER_MB,
  snapshot::ClusterSnapshot,
  snapshot::Infrastructure,
  snapshot::NodeView,
  snapshot::Workload,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Migration {
  pub workload: String,
  pub from: String,
  pub to: String,
  pub duration: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReconfigurationPlan {
  pub migrations: Vec<Migration>,
  /// Total duration of the migrations, run one after another.
  pub cost: Duration,
  pub applicable: bool,
  /// The snapshot the plan leads to.
  pub result: ClusterSnapshot,
}
impl ReconfigurationPlan {
  pub fn size(&self) -> usize {
    self.migrations.len()
  }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SolverError {
  #[error("no placement satisfies the constraints: {0}")]
  Unsatisfiable(String),
  #[error("plan is not applicable: {0}")]
  NotApplicable(String),
  #[error("solver failed: {0}")]
  Internal(String),
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CommandError {
  #[error("unknown host {0}")]
  UnknownHost(String),
  #[error("unknown workload {0}")]
  UnknownWorkload(String),
  #[error("host {0} is off")]
  HostOff(String),
  #[error("{0} rejected the command")]
  Rejected(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ComputingState {
  Success(ReconfigurationPlan),
  NoReconfigurationNeeded,
  ReconfigurationFailed(SolverError),
}
impl ComputingState {
  pub fn plan(&self) -> Option<&ReconfigurationPlan> {
    match self {
      ComputingState::Success(plan) => Some(plan),
      _ => None,
    }
  }

  /// The plan's cost, or zero when there is no plan.
  pub fn cost(&self) -> Duration {
    self.plan().map(|p| p.cost).unwrap_or_else(|| Duration::from_millis(0))
  }
}

pub trait Scheduler: Send {
  fn name(&self) -> &'static str;
  fn compute_plan(&mut self, snapshot: &ClusterSnapshot) -> ComputingState;
}

/// Builds the scheduler each coordinator owns.
pub type SchedulerFactory = Arc<dyn Fn() -> Box<dyn Scheduler> + Send + Sync>;

pub fn constraint_scheduler() -> SchedulerFactory {
  Arc::new(|| Box::new(ModelScheduler::new(ConstraintSolver)) as Box<dyn Scheduler>)
}

pub fn local_search_scheduler(seed: u64) -> SchedulerFactory {
  Arc::new(move || {
    Box::new(ModelScheduler::new(LocalSearchSolver::new(seed))) as Box<dyn Scheduler>
  })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleOutcome {
  NoReconfigurationNeeded,
  Applied,
  NoViablePlan,
  /// A plan was found, but a migration failed partway through applying it.
  Aborted,
}
impl CycleOutcome {
  pub fn code(&self) -> i32 {
    match self {
      CycleOutcome::NoReconfigurationNeeded | CycleOutcome::Applied => 0,
      CycleOutcome::NoViablePlan => -1,
      CycleOutcome::Aborted => -2,
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
  pub outcome: CycleOutcome,
  /// Wall time spent computing and applying.
  pub duration: Duration,
  pub nodes: usize,
  pub planned: usize,
  pub applied: usize,
  pub cost: Duration,
  pub off_hosts: Vec<String>,
  pub failure: Option<String>,
}
impl CycleReport {
  pub fn duration_ms(&self) -> u64 {
    self.duration.as_millis() as u64
  }
}

/// One scheduling cycle over `hosts`: extract, compute, then apply migrations in plan order. The
/// first migration that fails aborts the rest.
pub fn run_cycle(
  scheduler: &mut dyn Scheduler,
  infra: &dyn Infrastructure,
  hosts: &[String],
) -> CycleReport {
  let start = Instant::now();
  let (snapshot, off_hosts) = ClusterSnapshot::extract(infra.nodes(hosts));
  let mut report = CycleReport {
    outcome: CycleOutcome::NoReconfigurationNeeded,
    duration: Duration::from_millis(0),
    nodes: snapshot.len(),
    planned: 0,
    applied: 0,
    cost: Duration::from_millis(0),
    off_hosts: off_hosts,
    failure: None,
  };
  match scheduler.compute_plan(&snapshot) {
    ComputingState::NoReconfigurationNeeded => (),
    ComputingState::ReconfigurationFailed(e) => {
      report.outcome = CycleOutcome::NoViablePlan;
      report.failure = Some(e.to_string());
    }
    ComputingState::Success(plan) => {
      report.planned = plan.size();
      report.cost = plan.cost;
      report.outcome = CycleOutcome::Applied;
      for m in plan.migrations.iter() {
        if let Err(e) = infra.execute(m) {
          report.outcome = CycleOutcome::Aborted;
          report.failure = Some(format!("migrating {} to {}: {}", m.workload, m.to, e));
          break;
        }
        report.applied += 1;
      }
    }
  }
  report.duration = start.elapsed();
  report
}

#[cfg(test)]
mod tests {
  use super::*;

  fn node(host: &str, cap: f64, loads: &[(&str, f64, u32)]) -> NodeView {
    NodeView {
      host: host.to_string(),
      on: true,
      cpu_capacity: cap,
      mem_capacity: 8192,
      workloads: loads
        .iter()
        .map(|(id, cpu, mem)| Workload {
          id: id.to_string(),
          cpu: *cpu,
          mem: *mem,
        })
        .collect(),
    }
  }

  fn overloaded() -> ClusterSnapshot {
    ClusterSnapshot::extract(vec![
      node("node-1", 100.0, &[("vm-1", 60.0, 1024), ("vm-2", 30.0, 512), ("vm-3", 30.0, 256)]),
      node("node-2", 100.0, &[("vm-4", 20.0, 512)]),
      node("node-3", 100.0, &[]),
    ])
    .0
  }

  struct Failing;
  impl Solver for Failing {
    fn name(&self) -> &'static str {
      "failing"
    }
    fn solve(&mut self, _: &PlacementModel) -> Result<Vec<usize>, SolverError> {
      Err(SolverError::Internal("boom".to_string()))
    }
  }

  struct Scatter;
  impl Solver for Scatter {
    fn name(&self) -> &'static str {
      "scatter"
    }
    fn solve(&mut self, model: &PlacementModel) -> Result<Vec<usize>, SolverError> {
      Ok(model.placement.iter().map(|_| 0).collect())
    }
  }

  fn strategies() -> Vec<Box<dyn Scheduler>> {
    vec![(constraint_scheduler())(), (local_search_scheduler(3))()]
  }

  #[test]
  fn empty_snapshot_needs_nothing() {
    for mut s in strategies() {
      let state = s.compute_plan(&ClusterSnapshot::default());
      assert_eq!(state, ComputingState::NoReconfigurationNeeded, "{}", s.name());
      assert_eq!(state.cost(), Duration::from_millis(0));
    }
  }

  #[test]
  fn viable_snapshot_needs_nothing() {
    let snap = ClusterSnapshot::extract(vec![node("node-1", 100.0, &[("vm-1", 50.0, 512)])]).0;
    for mut s in strategies() {
      assert_eq!(s.compute_plan(&snap), ComputingState::NoReconfigurationNeeded);
    }
  }

  #[test]
  fn solver_failure_exposes_no_plan() {
    let mut s = ModelScheduler::new(Failing);
    let state = s.compute_plan(&overloaded());
    assert!(matches!(state, ComputingState::ReconfigurationFailed(SolverError::Internal(_))));
    assert!(state.plan().is_none());
  }

  #[test]
  fn inapplicable_plans_are_failures() {
    let snap = ClusterSnapshot::extract(vec![
      node("node-1", 100.0, &[("vm-1", 60.0, 512)]),
      node("node-2", 100.0, &[("vm-2", 60.0, 512)]),
    ])
    .0;
    let mut s = ModelScheduler::new(Scatter);
    assert!(matches!(
      s.compute_plan(&snap),
      ComputingState::ReconfigurationFailed(SolverError::NotApplicable(_))
    ));
  }

  #[test]
  fn strategies_repair_overload_and_are_idempotent() {
    let snap = overloaded();
    for mut s in strategies() {
      let plan = match s.compute_plan(&snap) {
        ComputingState::Success(plan) => plan,
        other => panic!("{} gave {:?}", s.name(), other),
      };
      assert!(plan.applicable);
      assert!(plan.result.is_viable());
      assert_eq!(plan.size(), plan.migrations.len());
      assert!(plan.size() >= 1);
      assert_eq!(plan.cost, plan.migrations.iter().map(|m| m.duration).sum::<Duration>());
      assert_eq!(s.compute_plan(&plan.result), ComputingState::NoReconfigurationNeeded);
    }
  }

  #[test]
  fn unsatisfiable_overload_is_reported() {
    let snap = ClusterSnapshot::extract(vec![node("node-1", 100.0, &[("vm-1", 150.0, 512)])]).0;
    for mut s in strategies() {
      let state = s.compute_plan(&snap);
      assert!(matches!(state, ComputingState::ReconfigurationFailed(_)), "{}", s.name());
    }
  }

  #[test]
  fn outcome_codes() {
    assert_eq!(CycleOutcome::Applied.code(), 0);
    assert_eq!(CycleOutcome::NoReconfigurationNeeded.code(), 0);
    assert_eq!(CycleOutcome::NoViablePlan.code(), -1);
    assert_eq!(CycleOutcome::Aborted.code(), -2);
  }
}
