use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What an agent last reported about its host: total CPU demand and memory demand in MB.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentCharge {
  pub cpu: f64,
  pub mem: u32,
  pub at: Duration,
}

/// A coordinator's averaged view of its agents, sent up to the leader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargeSummary {
  pub cpu: f64,
  pub mem: f64,
  pub agents: usize,
  pub at: Duration,
}
impl ChargeSummary {
  pub fn average<'a, I>(charges: I, at: Duration) -> ChargeSummary
  where
    I: IntoIterator<Item = &'a AgentCharge>,
  {
    let (cpu, mem, agents) = charges
      .into_iter()
      .fold((0.0, 0.0, 0usize), |(c, m, n), x| (c + x.cpu, m + x.mem as f64, n + 1));
    if agents == 0 {
      return ChargeSummary {
        at: at,
        ..ChargeSummary::default()
      };
    }
    ChargeSummary {
      cpu: cpu / agents as f64,
      mem: mem / agents as f64,
      agents: agents,
      at: at,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn summary_averages_charges() {
    let at = Duration::from_millis(5);
    let charges = vec![
      AgentCharge {
        cpu: 40.0,
        mem: 1024,
        at: at,
      },
      AgentCharge {
        cpu: 80.0,
        mem: 3072,
        at: at,
      },
    ];
    let sum = ChargeSummary::average(charges.iter(), at);
    assert_eq!(sum.agents, 2);
    assert_eq!(sum.cpu, 60.0);
    assert_eq!(sum.mem, 2048.0);
  }

  #[test]
  fn empty_summary_is_zero() {
    let sum = ChargeSummary::average(std::iter::empty(), Duration::from_secs(1));
    assert_eq!(sum.agents, 0);
    assert_eq!(sum.cpu, 0.0);
  }
}
