use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulingMode {
  /// A cycle starts every [`scheduling_period`](SnoozeConfig::scheduling_period).
  Periodic,
  /// Managed hosts are polled every
  /// [`violation_poll_interval`](SnoozeConfig::violation_poll_interval), and a cycle starts as
  /// soon as one of them is overloaded.
  Reactive,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("invalid configuration: {0}")]
  Invalid(#[from] ValidationErrors),
}

/// Policy constants shared by every broker, leader, coordinator and agent in a cluster.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_timing"))]
pub struct SnoozeConfig {
  /// How often leaders, coordinators and agents send heartbeats.
  ///
  /// default: `100 milliseconds`
  pub heartbeat_interval: Duration,
  /// The age past which a peer whose heartbeats stopped is considered dead. Must be at least twice
  /// the [`heartbeat_interval`](#structfield.heartbeat_interval).
  ///
  /// default: `350 milliseconds`
  pub heartbeat_timeout: Duration,
  /// The bound on a coordinator's blocking receive. Dead peers are swept at least this often.
  ///
  /// default: `50 milliseconds`
  pub receive_timeout: Duration,
  /// How long the broker waits for each election candidate to acknowledge.
  ///
  /// default: `100 milliseconds`
  pub election_reply_timeout: Duration,
  /// The number of candidates tried per election before giving up until the next trigger.
  ///
  /// default: `10`
  #[validate(range(min = 1))]
  pub max_election_candidates: u32,
  /// The interval between periodic scheduling cycles.
  ///
  /// default: `1 second`
  pub scheduling_period: Duration,
  /// default: `SchedulingMode::Periodic`
  pub scheduling_mode: SchedulingMode,
  /// How often managed hosts are checked for violations in reactive mode.
  ///
  /// default: `70 milliseconds`
  pub violation_poll_interval: Duration,
  /// The number of workers a coordinator uses to acknowledge joining agents.
  ///
  /// default: `4`
  #[validate(range(min = 1))]
  pub agent_pool_size: u32,
  /// Whether a coordinator asks for an election as soon as it joins, even if a leader is alive.
  ///
  /// default: `false`
  pub elect_on_join: bool,
  /// Whether a coordinator promoted to leader stops being a coordinator.
  ///
  /// default: `true`
  pub election_stops_coordinator: bool,
}
impl Default for SnoozeConfig {
  fn default() -> Self {
    SnoozeConfig {
      heartbeat_interval: Duration::from_millis(100),
      heartbeat_timeout: Duration::from_millis(350),
      receive_timeout: Duration::from_millis(50),
      election_reply_timeout: Duration::from_millis(100),
      max_election_candidates: 10,
      scheduling_period: Duration::from_secs(1),
      scheduling_mode: SchedulingMode::Periodic,
      violation_poll_interval: Duration::from_millis(70),
      agent_pool_size: 4,
      elect_on_join: false,
      election_stops_coordinator: true,
    }
  }
}
impl SnoozeConfig {
  pub fn validated(self) -> Result<SnoozeConfig, ConfigError> {
    self.validate()?;
    Ok(self)
  }
}

fn validate_timing(config: &SnoozeConfig) -> Result<(), ValidationError> {
  if config.heartbeat_timeout < config.heartbeat_interval * 2 {
    return Err(ValidationError::new("heartbeat_timeout_margin"));
  }
  if config.heartbeat_interval == Duration::from_millis(0) {
    return Err(ValidationError::new("heartbeat_interval_zero"));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    assert!(SnoozeConfig::default().validated().is_ok());
  }

  #[test]
  fn timeout_needs_margin_over_interval() {
    let mut config = SnoozeConfig::default();
    config.heartbeat_timeout = Duration::from_millis(150);
    assert!(config.validated().is_err());
  }

  #[test]
  fn at_least_one_candidate() {
    let mut config = SnoozeConfig::default();
    config.max_election_candidates = 0;
    assert!(matches!(config.validated(), Err(ConfigError::Invalid(_))));
  }
}
