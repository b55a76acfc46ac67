use crate::core::{Actor, ActorContext, Envelope, Mailbox, LOG_LEVEL};
use crate::{debug, trace, warn};
use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::oneshot::Sender;

pub type Recvr<U> = Box<dyn Fn(U) -> bool + Send>;

pub enum RegistryMsg<U> {
  /// Encoded envelope, and an optional acknowledgement of whether a live receiver took it.
  Forward(Vec<u8>, Option<Sender<bool>>),
  Register(Mailbox, u64, Recvr<U>, Sender<()>),
  Deregister(Mailbox, u64),
}

/// Routes encoded envelopes to whichever receiver is currently bound to their destination.
pub struct Registry<U: Envelope> {
  register: HashMap<Mailbox, (u64, Recvr<U>)>,
}
impl<U: Envelope> Registry<U> {
  pub fn new() -> Registry<U> {
    Registry {
      register: HashMap::new(),
    }
  }

  fn forward(&mut self, ctx: &ActorContext<U, RegistryMsg<U>>, bytes: &[u8]) -> bool {
    let msg = match serde_cbor::from_slice::<U>(bytes) {
      Ok(msg) => msg,
      Err(e) => {
        warn!(LOG_LEVEL, &ctx.node, format!("Dropping malformed message: {}", e));
        return false;
      }
    };
    let dest = msg.destination().clone();
    match self.register.get(&dest) {
      Some((_, recvr)) => {
        if recvr(msg) {
          true
        } else {
          debug!(LOG_LEVEL, &ctx.node, format!("Receiver for {} is gone, removing it", dest));
          self.register.remove(&dest);
          false
        }
      }
      None => {
        trace!(LOG_LEVEL, &ctx.node, format!("Cannot send to {}, not in register", dest));
        false
      }
    }
  }
}
#[async_trait]
impl<U: Envelope> Actor<U, RegistryMsg<U>> for Registry<U> {
  async fn recv(&mut self, ctx: &ActorContext<U, RegistryMsg<U>>, msg: RegistryMsg<U>) {
    match msg {
      RegistryMsg::Forward(bytes, ack) => {
        let delivered = self.forward(ctx, &bytes);
        if let Some(ack) = ack {
          let _ = ack.send(delivered);
        }
      }
      RegistryMsg::Register(name, id, recvr, confirmation) => {
        trace!(LOG_LEVEL, &ctx.node, format!("Adding receiver to registry: {}", name));
        if let Some((old, _)) = self.register.insert(name.clone(), (id, recvr)) {
          if old != id {
            warn!(LOG_LEVEL, &ctx.node, format!("{} was rebound, replacing receiver", name));
          }
        }
        if confirmation.send(()).is_err() {
          debug!(LOG_LEVEL, &ctx.node, format!("No one awaited {}, removing it", name));
          self.register.remove(&name);
        }
      }
      RegistryMsg::Deregister(name, id) => {
        if self.register.get(&name).map(|(x, _)| *x == id).unwrap_or(false) {
          trace!(LOG_LEVEL, &ctx.node, format!("Removing receiver from registry: {}", name));
          self.register.remove(&name);
        }
      }
    }
  }
}
