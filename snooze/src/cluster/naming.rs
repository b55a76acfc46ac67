use crate::core::Mailbox;

/// The Broker's well-known inbox.
pub const MULTICAST: &str = "multicast";
/// Where election candidates acknowledge a promotion request.
pub const GL_ELECTION: &str = "glElection";

pub const NEW_GM: &str = "-newGM";
pub const NEW_LC: &str = "-newLC";
pub const GL_ELEC: &str = "-glElec";
pub const GM_PERIODIC: &str = "-gmPeriodic";
pub const RELAY_GM_BEATS: &str = "-relayGMBeats";

pub fn multicast() -> Mailbox {
  Mailbox::from(MULTICAST)
}

pub fn gl_election() -> Mailbox {
  Mailbox::from(GL_ELECTION)
}

pub fn gl_inbox(host: &str) -> Mailbox {
  Mailbox::new(format!("{}-glInbox", host))
}

pub fn gm_inbox(host: &str) -> Mailbox {
  Mailbox::new(format!("{}-gmInbox", host))
}

pub fn lc_inbox(host: &str) -> Mailbox {
  Mailbox::new(format!("{}-lcInbox", host))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn inboxes_are_distinct_per_role() {
    let host = "node-7";
    let boxes = vec![gl_inbox(host), gm_inbox(host), lc_inbox(host), multicast(), gl_election()];
    for (i, a) in boxes.iter().enumerate() {
      for b in boxes.iter().skip(i + 1) {
        assert_ne!(a, b);
      }
    }
    assert_eq!(gm_inbox(host).sub(NEW_LC).as_str(), "node-7-gmInbox-newLC");
    assert_eq!(gl_inbox(host).sub(GM_PERIODIC).as_str(), "node-7-glInbox-gmPeriodic");
  }
}
