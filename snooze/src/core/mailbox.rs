use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

/// The name under which a receiver is bound in a [`Node`](crate::core::Node)'s registry.
///
/// Mailboxes are plain strings so that every role can derive the inbox of any other role from a
/// host name alone. Sub-boxes are formed by appending a fixed suffix with [`Mailbox::sub`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct Mailbox(String);
impl Mailbox {
  pub fn new<S: Into<String>>(name: S) -> Mailbox {
    Mailbox(name.into())
  }

  pub fn as_str(&self) -> &str {
    self.0.as_str()
  }

  pub fn sub(&self, suffix: &str) -> Mailbox {
    Mailbox(format!("{}{}", self.0, suffix))
  }
}
impl Display for Mailbox {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}
impl From<&str> for Mailbox {
  fn from(s: &str) -> Self {
    Mailbox(s.to_string())
  }
}
impl From<String> for Mailbox {
  fn from(s: String) -> Self {
    Mailbox(s)
  }
}

/// A message that can travel between mailboxes. Every envelope knows where it is going.
pub trait Envelope: Serialize + DeserializeOwned + Send + Sync + Debug + 'static {
  fn destination(&self) -> &Mailbox;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sub_boxes_append_suffix() {
    let gl = Mailbox::new("node-3-glInbox");
    assert_eq!(gl.sub("-newGM").as_str(), "node-3-glInbox-newGM");
    let relay = Mailbox::from("multicast").sub("-relayGMBeats");
    assert_eq!(relay.to_string(), "multicast-relayGMBeats");
  }
}
