use crate::scheduling::{
  ClusterSnapshot, ComputingState, Migration, ReconfigurationPlan, Scheduler, SolverError,
  Workload,
};
use std::time::{Duration, Instant};

/// Milliseconds it takes to migrate one MB of workload memory.
pub const MIGRATION_MS_PER_MB: u64 = 1;

/// The solver's flat view of a snapshot: hosts and workloads by index, and where each workload
/// currently sits.
#[derive(Clone, Debug)]
pub struct PlacementModel {
  pub hosts: Vec<String>,
  pub cpu_capacity: Vec<f64>,
  pub mem_capacity: Vec<u32>,
  pub workloads: Vec<Workload>,
  pub placement: Vec<usize>,
}
impl PlacementModel {
  pub fn build(snapshot: &ClusterSnapshot) -> PlacementModel {
    let mut model = PlacementModel {
      hosts: Vec::with_capacity(snapshot.len()),
      cpu_capacity: Vec::with_capacity(snapshot.len()),
      mem_capacity: Vec::with_capacity(snapshot.len()),
      workloads: Vec::new(),
      placement: Vec::new(),
    };
    for node in snapshot.nodes().filter(|n| n.on) {
      let idx = model.hosts.len();
      model.hosts.push(node.host.clone());
      model.cpu_capacity.push(node.cpu_capacity);
      model.mem_capacity.push(node.mem_capacity);
      for w in node.workloads.iter() {
        model.workloads.push(w.clone());
        model.placement.push(idx);
      }
    }
    model
  }

  /// CPU and memory demand per host under `placement`.
  pub fn loads(&self, placement: &[usize]) -> (Vec<f64>, Vec<u32>) {
    let mut cpu = vec![0.0; self.hosts.len()];
    let mut mem = vec![0; self.hosts.len()];
    for (w, &h) in self.workloads.iter().zip(placement) {
      cpu[h] += w.cpu;
      mem[h] += w.mem;
    }
    (cpu, mem)
  }

  pub fn fits(&self, host: usize, cpu: f64, mem: u32) -> bool {
    cpu <= self.cpu_capacity[host] && mem <= self.mem_capacity[host]
  }

  pub fn is_viable(&self, placement: &[usize]) -> bool {
    let (cpu, mem) = self.loads(placement);
    (0..self.hosts.len()).all(|h| self.fits(h, cpu[h], mem[h]))
  }

  /// The migrations that turn the current placement into `placement`.
  pub fn diff(&self, placement: &[usize]) -> Vec<Migration> {
    self
      .workloads
      .iter()
      .zip(self.placement.iter().zip(placement))
      .filter(|(_, (from, to))| from != to)
      .map(|(w, (&from, &to))| Migration {
        workload: w.id.clone(),
        from: self.hosts[from].clone(),
        to: self.hosts[to].clone(),
        duration: Duration::from_millis(w.mem as u64 * MIGRATION_MS_PER_MB),
      })
      .collect()
  }
}

/// A placement search over a [`PlacementModel`]. Returns the host index of every workload.
pub trait Solver: Send {
  fn name(&self) -> &'static str;
  fn solve(&mut self, model: &PlacementModel) -> Result<Vec<usize>, SolverError>;
}

/// Runs build, solve and classification around any [`Solver`].
pub struct ModelScheduler<S: Solver> {
  solver: S,
  last_solve: Duration,
}
impl<S: Solver> ModelScheduler<S> {
  pub fn new(solver: S) -> ModelScheduler<S> {
    ModelScheduler {
      solver: solver,
      last_solve: Duration::from_millis(0),
    }
  }

  /// Wall time the solver took on the last snapshot.
  pub fn last_solve(&self) -> Duration {
    self.last_solve
  }
}
impl<S: Solver> Scheduler for ModelScheduler<S> {
  fn name(&self) -> &'static str {
    self.solver.name()
  }

  fn compute_plan(&mut self, snapshot: &ClusterSnapshot) -> ComputingState {
    let model = PlacementModel::build(snapshot);
    let start = Instant::now();
    let solved = self.solver.solve(&model);
    self.last_solve = start.elapsed();
    let placement = match solved {
      Ok(p) if p.len() == model.workloads.len() => p,
      Ok(p) => {
        let (placed, total) = (p.len(), model.workloads.len());
        let msg = format!("{} placed {} of {} workloads", self.name(), placed, total);
        return ComputingState::ReconfigurationFailed(SolverError::Internal(msg));
      }
      Err(e) => return ComputingState::ReconfigurationFailed(e),
    };
    let migrations = model.diff(&placement);
    if migrations.is_empty() {
      return ComputingState::NoReconfigurationNeeded;
    }
    let result = match snapshot.apply_all(&migrations) {
      Ok(result) => result,
      Err(e) => return ComputingState::ReconfigurationFailed(e),
    };
    let applicable = result.is_viable();
    if !applicable {
      let violations = result.violations().join(", ");
      return ComputingState::ReconfigurationFailed(SolverError::NotApplicable(violations));
    }
    ComputingState::Success(ReconfigurationPlan {
      cost: migrations.iter().map(|m| m.duration).sum(),
      migrations: migrations,
      applicable: applicable,
      result: result,
    })
  }
}
