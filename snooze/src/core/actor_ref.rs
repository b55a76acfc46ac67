use crate::core::{local_actor_msg_convert, ActorSignal, LocalActorMsg};
use crossbeam::channel::Sender;
use std::fmt::Debug;
use std::sync::Arc;

/// A handle for sending messages to an actor in the same process. Sending never blocks; the
/// return value says whether the receiving end is still alive.
pub struct LocalRef<T> {
  pub(crate) func: Arc<dyn Fn(LocalActorMsg<T>) -> bool + Send + Sync>,
}
impl<T> Clone for LocalRef<T> {
  fn clone(&self) -> Self {
    LocalRef {
      func: self.func.clone(),
    }
  }
}
impl<T: Send + 'static> LocalRef<T> {
  pub fn send(&self, item: T) -> bool {
    (&self.func)(LocalActorMsg::Msg(item))
  }

  pub fn signal(&self, sig: ActorSignal) -> bool {
    (&self.func)(LocalActorMsg::Signal(sig))
  }

  pub fn transform<I: Send + 'static>(&self) -> LocalRef<I>
  where
    T: From<I>,
  {
    let func = self.func.clone();
    LocalRef {
      func: Arc::new(move |x: LocalActorMsg<I>| func(local_actor_msg_convert(x))),
    }
  }

  pub fn void() -> LocalRef<T> {
    LocalRef {
      func: Arc::new(|_| false),
    }
  }

  /// Feeds a crossbeam channel. Signals are not forwarded.
  pub fn from_channel(tx: Sender<T>) -> LocalRef<T> {
    LocalRef {
      func: Arc::new(move |x: LocalActorMsg<T>| match x {
        LocalActorMsg::Msg(m) => tx.send(m).is_ok(),
        LocalActorMsg::Signal(_) => false,
      }),
    }
  }
}
impl<T> Debug for LocalRef<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LocalRef").field("Specific", &std::any::type_name::<T>()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossbeam::channel::unbounded;

  #[derive(Debug, PartialEq)]
  enum Wrapped {
    Num(u32),
  }
  impl From<u32> for Wrapped {
    fn from(x: u32) -> Self {
      Wrapped::Num(x)
    }
  }

  #[test]
  fn transform_converts_before_sending() {
    let (tx, rx) = unbounded();
    let wrapped = LocalRef::<Wrapped>::from_channel(tx);
    let nums = wrapped.transform::<u32>();
    assert!(nums.send(7));
    assert!(!nums.signal(ActorSignal::Term));
    assert_eq!(rx.try_recv(), Ok(Wrapped::Num(7)));
  }

  #[test]
  fn void_refs_reject_everything() {
    assert!(!LocalRef::<u32>::void().send(1));
  }
}
