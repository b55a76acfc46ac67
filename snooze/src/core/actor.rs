use crate::core::{Envelope, LocalRef, Mailbox, Node, Recvr};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ActorSignal {
  Term,
}

#[derive(Debug)]
pub enum LocalActorMsg<S> {
  Msg(S),
  Signal(ActorSignal),
}

pub(crate) fn local_actor_msg_convert<S: From<I>, I>(msg: LocalActorMsg<I>) -> LocalActorMsg<S> {
  match msg {
    LocalActorMsg::Msg(s) => LocalActorMsg::Msg(S::from(s)),
    LocalActorMsg::Signal(s) => LocalActorMsg::Signal(s),
  }
}

#[async_trait]
pub trait Actor<U: Envelope, S: Send + 'static> {
  async fn pre_start(&mut self, _: &ActorContext<U, S>) {}
  async fn recv(&mut self, ctx: &ActorContext<U, S>, msg: S);
  async fn post_stop(&mut self, _: &ActorContext<U, S>) {}
}

/// An actor whose receive is bounded by a timeout. Every hook may return a new timeout, which
/// replaces the current one.
#[async_trait]
pub trait TimeoutActor<U: Envelope, S: Send + 'static> {
  async fn pre_start(&mut self, _: &ActorContext<U, S>) -> Option<Duration> {
    None
  }
  async fn recv(&mut self, ctx: &ActorContext<U, S>, msg: S) -> Option<Duration>;
  async fn timeout(&mut self, ctx: &ActorContext<U, S>) -> Option<Duration>;
  async fn post_stop(&mut self, _: &ActorContext<U, S>) {}
}

pub struct ActorContext<U: Envelope, S> {
  pub tx: UnboundedSender<LocalActorMsg<S>>,
  pub name: Mailbox,
  pub node: Node<U>,
}
impl<U: Envelope, S: Send + 'static> ActorContext<U, S> {
  pub(in crate::core) fn create_local<T: Send + 'static>(
    sender: UnboundedSender<LocalActorMsg<S>>,
  ) -> LocalRef<T>
  where
    S: From<T>,
  {
    LocalRef {
      func: std::sync::Arc::new(move |x: LocalActorMsg<T>| {
        sender.send(local_actor_msg_convert(x)).is_ok()
      }),
    }
  }

  pub fn local_interface<T: Send + 'static>(&self) -> LocalRef<T>
  where
    S: From<T>,
  {
    Self::create_local::<T>(self.tx.clone())
  }

  /// Asks this actor to stop once it has handled everything queued before the request.
  pub fn stop(&self) {
    let _ = self.tx.send(LocalActorMsg::Signal(ActorSignal::Term));
  }

  pub(in crate::core) fn remote_recvr(&self) -> Recvr<U>
  where
    S: From<U>,
  {
    let sender = self.tx.clone();
    Box::new(move |msg: U| sender.send(LocalActorMsg::Msg(S::from(msg))).is_ok())
  }
}
