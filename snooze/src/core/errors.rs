use crate::core::Mailbox;

/// Failures surfaced by [`Node::send_reliable`](crate::core::Node::send_reliable).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
  #[error("no live receiver is bound to {0}")]
  Unreachable(Mailbox),
  #[error("the local node is shutting down")]
  NodeDown,
  #[error("could not encode message for {0}: {1}")]
  Encode(Mailbox, #[source] serde_cbor::Error),
}
impl TransportError {
  /// Whether the local host itself failed, as opposed to the destination being gone.
  pub fn is_host_failure(&self) -> bool {
    matches!(self, TransportError::NodeDown)
  }
}

/// Failures surfaced by [`MailboxRecvr::recv_timeout`](crate::core::MailboxRecvr::recv_timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecvError {
  #[error("receive timed out")]
  Timeout,
  #[error("mailbox closed")]
  Closed,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_a_local_failure_is_a_host_failure() {
    assert!(TransportError::NodeDown.is_host_failure());
    assert!(!TransportError::Unreachable(Mailbox::from("gm-1-gmInbox")).is_host_failure());
  }
}
