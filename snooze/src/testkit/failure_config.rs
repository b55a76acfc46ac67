use crate::core::Mailbox;
use crate::testkit::env;
use im::HashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chooses between [`Node::send`](crate::core::Node::send) and
/// [`Node::send_unreliable`](crate::core::Node::send_unreliable) in [`send_select`].
///
/// [`send_select`]: crate::send_select
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FailureMode {
  Message,
  None,
}

#[derive(Default, Serialize, Deserialize, Clone, Copy, Debug)]
pub struct FailureConfig {
  pub drop_prob: f64,
  pub delay: Option<(Duration, Duration)>,
}

/// Failure settings for unreliable sends, with overrides for individual destinations.
#[derive(Clone, Default, Serialize, Deserialize, Debug)]
pub struct FailureConfigMap {
  pub cluster_wide: FailureConfig,
  pub mailbox_wide: HashMap<Mailbox, FailureConfig>,
}
impl FailureConfigMap {
  pub fn from_env() -> Self {
    FailureConfigMap {
      cluster_wide: FailureConfig {
        drop_prob: *env::PACKET_DROP,
        delay: *env::DELAY,
      },
      mailbox_wide: HashMap::new(),
    }
  }

  pub fn get(&self, mailbox: &Mailbox) -> &FailureConfig {
    self.mailbox_wide.get(mailbox).unwrap_or(&self.cluster_wide)
  }
}

#[macro_export]
macro_rules! send_select {
  ($mode:expr, $node:expr, $msg:expr) => {
    match $mode {
      $crate::testkit::FailureMode::None => $node.send($msg),
      $crate::testkit::FailureMode::Message => $node.send_unreliable($msg),
    }
  };
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn overrides_take_precedence() {
    let mut map = FailureConfigMap::default();
    map.cluster_wide.drop_prob = 0.1;
    map.mailbox_wide.insert(
      Mailbox::from("multicast"),
      FailureConfig {
        drop_prob: 0.5,
        delay: None,
      },
    );
    assert_eq!(map.get(&Mailbox::from("multicast")).drop_prob, 0.5);
    assert_eq!(map.get(&Mailbox::from("node-1-gmInbox")).drop_prob, 0.1);
  }
}
