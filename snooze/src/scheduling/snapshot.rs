use crate::scheduling::{CommandError, Migration, SolverError};
use im::OrdMap;
use serde::{Deserialize, Serialize};

/// A placed unit of work, such as a VM, with its resource demand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Workload {
  pub id: String,
  pub cpu: f64,
  pub mem: u32,
}

/// One host as seen at extraction time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
  pub host: String,
  pub on: bool,
  pub cpu_capacity: f64,
  pub mem_capacity: u32,
  pub workloads: Vec<Workload>,
}
impl NodeView {
  pub fn cpu_demand(&self) -> f64 {
    self.workloads.iter().map(|w| w.cpu).sum()
  }

  pub fn mem_demand(&self) -> u32 {
    self.workloads.iter().map(|w| w.mem).sum()
  }

  pub fn is_viable(&self) -> bool {
    self.cpu_demand() <= self.cpu_capacity && self.mem_demand() <= self.mem_capacity
  }
}

/// An immutable, point-in-time view of a set of powered-on hosts. Applying a migration produces
/// a new snapshot and leaves this one untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterSnapshot {
  nodes: OrdMap<String, NodeView>,
}
impl ClusterSnapshot {
  /// Builds a snapshot from `views`. Hosts that are off are not included; their names are
  /// returned so the caller can report them.
  pub fn extract<I>(views: I) -> (ClusterSnapshot, Vec<String>)
  where
    I: IntoIterator<Item = NodeView>,
  {
    let mut nodes = OrdMap::new();
    let mut off = Vec::new();
    for view in views {
      if view.on {
        nodes.insert(view.host.clone(), view);
      } else {
        off.push(view.host);
      }
    }
    (ClusterSnapshot { nodes: nodes }, off)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn get(&self, host: &str) -> Option<&NodeView> {
    self.nodes.get(host)
  }

  pub fn nodes(&self) -> impl Iterator<Item = &NodeView> {
    self.nodes.values()
  }

  pub fn is_viable(&self) -> bool {
    self.nodes.values().all(NodeView::is_viable)
  }

  pub fn violations(&self) -> Vec<&str> {
    self.nodes.values().filter(|n| !n.is_viable()).map(|n| n.host.as_str()).collect()
  }

  pub fn host_of(&self, workload: &str) -> Option<&str> {
    self
      .nodes
      .values()
      .find(|n| n.workloads.iter().any(|w| w.id == workload))
      .map(|n| n.host.as_str())
  }

  pub fn apply(&self, migration: &Migration) -> Result<ClusterSnapshot, SolverError> {
    let not_applicable = || SolverError::NotApplicable(migration.workload.clone());
    let mut from = self.nodes.get(&migration.from).cloned().ok_or_else(not_applicable)?;
    let mut to = self.nodes.get(&migration.to).cloned().ok_or_else(not_applicable)?;
    let pos = from
      .workloads
      .iter()
      .position(|w| w.id == migration.workload)
      .ok_or_else(not_applicable)?;
    to.workloads.push(from.workloads.remove(pos));
    let nodes = self.nodes.update(from.host.clone(), from).update(to.host.clone(), to);
    Ok(ClusterSnapshot { nodes: nodes })
  }

  pub fn apply_all(&self, migrations: &[Migration]) -> Result<ClusterSnapshot, SolverError> {
    migrations.iter().try_fold(self.clone(), |snap, m| snap.apply(m))
  }
}

/// The hosts and workloads a coordinator manages, and the means to act on them.
pub trait Infrastructure: Send + Sync {
  /// Current views of `hosts`. Unknown hosts are left out.
  fn nodes(&self, hosts: &[String]) -> Vec<NodeView>;

  /// Carries out one migration. Returns once the migration completed or failed.
  fn execute(&self, migration: &Migration) -> Result<(), CommandError>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn view(host: &str, on: bool, loads: &[(&str, f64)]) -> NodeView {
    NodeView {
      host: host.to_string(),
      on: on,
      cpu_capacity: 100.0,
      mem_capacity: 4096,
      workloads: loads
        .iter()
        .map(|(id, cpu)| Workload {
          id: id.to_string(),
          cpu: *cpu,
          mem: 512,
        })
        .collect(),
    }
  }

  #[test]
  fn off_hosts_are_reported_not_extracted() {
    let (snap, off) = ClusterSnapshot::extract(vec![
      view("node-1", true, &[("vm-1", 50.0)]),
      view("node-2", false, &[]),
    ]);
    assert_eq!(snap.len(), 1);
    assert_eq!(off, vec!["node-2".to_string()]);
  }

  #[test]
  fn applying_leaves_the_original_untouched() {
    let (snap, _) = ClusterSnapshot::extract(vec![
      view("node-1", true, &[("vm-1", 80.0), ("vm-2", 40.0)]),
      view("node-2", true, &[]),
    ]);
    assert_eq!(snap.violations(), vec!["node-1"]);
    let mig = Migration {
      workload: "vm-2".to_string(),
      from: "node-1".to_string(),
      to: "node-2".to_string(),
      duration: Duration::from_millis(512),
    };
    let next = snap.apply(&mig).unwrap();
    assert!(next.is_viable());
    assert_eq!(next.host_of("vm-2"), Some("node-2"));
    assert_eq!(snap.host_of("vm-2"), Some("node-1"));
  }
}
