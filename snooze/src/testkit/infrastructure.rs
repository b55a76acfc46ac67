use crate::scheduling::{CommandError, Infrastructure, Migration, NodeView, Workload};
use hashbrown::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Hosts {
  views: HashMap<String, NodeView>,
  rejecting: HashSet<String>,
  executed: Vec<Migration>,
}

/// An in-memory set of hosts and the workloads placed on them.
///
/// Migrations take effect immediately. A workload marked with
/// [`set_rejecting`](SimulatedInfrastructure::set_rejecting) makes every migration of it fail,
/// which is how tests get a cycle aborted partway.
#[derive(Default)]
pub struct SimulatedInfrastructure {
  hosts: RwLock<Hosts>,
}
impl SimulatedInfrastructure {
  pub fn new() -> SimulatedInfrastructure {
    SimulatedInfrastructure::default()
  }

  fn read(&self) -> RwLockReadGuard<'_, Hosts> {
    self.hosts.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write(&self) -> RwLockWriteGuard<'_, Hosts> {
    self.hosts.write().unwrap_or_else(|e| e.into_inner())
  }

  /// Adds a powered-on host with no workloads, replacing any host of the same name.
  pub fn add_host(&self, host: &str, cpu_capacity: f64, mem_capacity: u32) {
    let view = NodeView {
      host: host.to_string(),
      on: true,
      cpu_capacity: cpu_capacity,
      mem_capacity: mem_capacity,
      workloads: vec![],
    };
    self.write().views.insert(host.to_string(), view);
  }

  pub fn place(&self, host: &str, id: &str, cpu: f64, mem: u32) -> Result<(), CommandError> {
    let mut hosts = self.write();
    if hosts.views.values().any(|v| v.workloads.iter().any(|w| w.id == id)) {
      return Err(CommandError::Rejected(id.to_string()));
    }
    let unknown = || CommandError::UnknownHost(host.to_string());
    let view = hosts.views.get_mut(host).ok_or_else(unknown)?;
    view.workloads.push(Workload {
      id: id.to_string(),
      cpu: cpu,
      mem: mem,
    });
    Ok(())
  }

  /// Changes a workload's demand where it runs.
  pub fn set_load(&self, id: &str, cpu: f64, mem: u32) -> Result<(), CommandError> {
    let mut hosts = self.write();
    let workload = hosts
      .views
      .values_mut()
      .flat_map(|v| v.workloads.iter_mut())
      .find(|w| w.id == id)
      .ok_or_else(|| CommandError::UnknownWorkload(id.to_string()))?;
    workload.cpu = cpu;
    workload.mem = mem;
    Ok(())
  }

  pub fn turn_on(&self, host: &str) -> Result<(), CommandError> {
    self.set_power(host, true)
  }

  pub fn turn_off(&self, host: &str) -> Result<(), CommandError> {
    self.set_power(host, false)
  }

  fn set_power(&self, host: &str, on: bool) -> Result<(), CommandError> {
    let mut hosts = self.write();
    let unknown = || CommandError::UnknownHost(host.to_string());
    let view = hosts.views.get_mut(host).ok_or_else(unknown)?;
    view.on = on;
    Ok(())
  }

  pub fn set_rejecting(&self, id: &str, rejecting: bool) {
    let mut hosts = self.write();
    if rejecting {
      hosts.rejecting.insert(id.to_string());
    } else {
      hosts.rejecting.remove(id);
    }
  }

  /// Whether every powered-on host is within capacity.
  pub fn is_viable(&self) -> bool {
    self.read().views.values().filter(|v| v.on).all(|v| v.is_viable())
  }

  pub fn host_of(&self, id: &str) -> Option<String> {
    self
      .read()
      .views
      .values()
      .find(|v| v.workloads.iter().any(|w| w.id == id))
      .map(|v| v.host.clone())
  }

  /// Every migration carried out so far, in order.
  pub fn migrations(&self) -> Vec<Migration> {
    self.read().executed.clone()
  }
}
impl Infrastructure for SimulatedInfrastructure {
  fn nodes(&self, hosts: &[String]) -> Vec<NodeView> {
    let guard = self.read();
    hosts.iter().filter_map(|h| guard.views.get(h).cloned()).collect()
  }

  fn execute(&self, migration: &Migration) -> Result<(), CommandError> {
    let mut hosts = self.write();
    if hosts.rejecting.contains(&migration.workload) {
      return Err(CommandError::Rejected(migration.workload.clone()));
    }
    match hosts.views.get(&migration.to) {
      None => return Err(CommandError::UnknownHost(migration.to.clone())),
      Some(to) if !to.on => return Err(CommandError::HostOff(migration.to.clone())),
      Some(_) => (),
    }
    let from = hosts
      .views
      .get_mut(&migration.from)
      .ok_or_else(|| CommandError::UnknownHost(migration.from.clone()))?;
    let pos = from
      .workloads
      .iter()
      .position(|w| w.id == migration.workload)
      .ok_or_else(|| CommandError::UnknownWorkload(migration.workload.clone()))?;
    let workload = from.workloads.remove(pos);
    if let Some(to) = hosts.views.get_mut(&migration.to) {
      to.workloads.push(workload);
    }
    hosts.executed.push(migration.clone());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn migration(workload: &str, from: &str, to: &str) -> Migration {
    Migration {
      workload: workload.to_string(),
      from: from.to_string(),
      to: to.to_string(),
      duration: Duration::from_millis(1),
    }
  }

  fn infra() -> SimulatedInfrastructure {
    let infra = SimulatedInfrastructure::new();
    infra.add_host("node-1", 100.0, 4096);
    infra.add_host("node-2", 100.0, 4096);
    infra.place("node-1", "vm-1", 70.0, 1024).unwrap();
    infra.place("node-1", "vm-2", 50.0, 1024).unwrap();
    infra
  }

  #[test]
  fn migration_moves_workload() {
    let infra = infra();
    assert!(!infra.is_viable());
    infra.execute(&migration("vm-2", "node-1", "node-2")).unwrap();
    assert!(infra.is_viable());
    assert_eq!(infra.host_of("vm-2"), Some("node-2".to_string()));
    assert_eq!(infra.migrations().len(), 1);
  }

  #[test]
  fn rejected_and_off_targets_leave_placement_alone() {
    let infra = infra();
    infra.set_rejecting("vm-1", true);
    let res = infra.execute(&migration("vm-1", "node-1", "node-2"));
    assert_eq!(res, Err(CommandError::Rejected("vm-1".to_string())));
    infra.turn_off("node-2").unwrap();
    let res = infra.execute(&migration("vm-2", "node-1", "node-2"));
    assert_eq!(res, Err(CommandError::HostOff("node-2".to_string())));
    assert_eq!(infra.host_of("vm-2"), Some("node-1".to_string()));
    assert!(infra.migrations().is_empty());
  }

  #[test]
  fn off_hosts_are_reported_but_not_counted() {
    let infra = infra();
    infra.turn_off("node-1").unwrap();
    assert!(infra.is_viable());
    let views = infra.nodes(&["node-1".to_string(), "node-9".to_string()]);
    assert_eq!(views.len(), 1);
    assert!(!views[0].on);
  }
}
