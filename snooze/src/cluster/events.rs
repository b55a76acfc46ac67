use crate::scheduling::CycleReport;

/// Notifications sent to an observer as the hierarchy changes. Nothing in the protocol depends on
/// them; they exist so simulations and tests can follow along without reaching into any
/// process's state.
#[derive(Clone, Debug, PartialEq)]
pub enum SnoozeEvent {
  CoordinatorRegistered { coordinator: String },
  CoordinatorRemoved { coordinator: String },
  CoordinatorAttached { coordinator: String, leader: String },
  LeaderLost { coordinator: String },
  ElectionStarted,
  LeaderElected { leader: String, promoted: bool },
  ElectionFailed { tried: usize },
  LeaderTerminationNotice { coordinator: String, old_leader: String },
  CoordinatorPromoted { coordinator: String },
  LeaderStarted { leader: String },
  LeaderStopped { leader: String },
  AgentJoined { agent: String, coordinator: String },
  AgentRemoved { agent: String, coordinator: String },
  CycleStarted { coordinator: String },
  CycleDeferred { coordinator: String },
  CycleFinished { coordinator: String, report: CycleReport },
  CoordinatorStopped { coordinator: String, graceful: bool },
}
