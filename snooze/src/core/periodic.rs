use crate::core::{Envelope, LocalRef, Node};
use std::time::Duration;
use tokio::task::JoinHandle;

/// A fixed-period activity whose runs take time of their own.
///
/// The time a run took is recorded with [`record`](PeriodicActivity::record) and subtracted from
/// the next wait, so that consecutive runs start one period apart rather than one period plus the
/// run time. A run longer than the period makes the next one start immediately.
#[derive(Clone, Debug)]
pub struct PeriodicActivity {
  period: Duration,
  carried: Duration,
}
impl PeriodicActivity {
  pub fn new(period: Duration) -> PeriodicActivity {
    PeriodicActivity {
      period: period,
      carried: Duration::from_millis(0),
    }
  }

  pub fn period(&self) -> Duration {
    self.period
  }

  pub fn record(&mut self, took: Duration) {
    self.carried = took;
  }

  pub fn next_delay(&self) -> Duration {
    self.period.checked_sub(self.carried).unwrap_or_else(|| Duration::from_millis(0))
  }

  /// Schedules `msg` to `target` after [`next_delay`](PeriodicActivity::next_delay) and clears
  /// the recorded run time.
  pub fn arm<U: Envelope, T: Send + 'static>(
    &mut self,
    node: &Node<U>,
    target: LocalRef<T>,
    msg: T,
  ) -> JoinHandle<bool> {
    let delay = self.next_delay();
    self.carried = Duration::from_millis(0);
    node.schedule_local_msg(delay, target, msg)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn run_time_is_folded_into_next_wait() {
    let mut act = PeriodicActivity::new(Duration::from_millis(1000));
    assert_eq!(act.next_delay(), Duration::from_millis(1000));
    act.record(Duration::from_millis(300));
    assert_eq!(act.next_delay(), Duration::from_millis(700));
  }

  #[test]
  fn overlong_runs_do_not_underflow() {
    let mut act = PeriodicActivity::new(Duration::from_millis(100));
    act.record(Duration::from_millis(250));
    assert_eq!(act.next_delay(), Duration::from_millis(0));
  }
}
