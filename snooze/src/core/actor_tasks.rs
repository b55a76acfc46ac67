use crate::core::{
  Actor, ActorContext, ActorSignal, Envelope, LocalActorMsg, Mailbox, Node, Recvr, RegistryMsg,
  TimeoutActor, LOG_LEVEL,
};
use crate::error;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot::channel;

pub(crate) async fn register<U: Envelope>(
  node: &Node<U>,
  id: u64,
  bindings: Vec<(Mailbox, Recvr<U>)>,
) -> Vec<Mailbox> {
  let mut bound = Vec::with_capacity(bindings.len());
  for (name, recvr) in bindings {
    let (tx, rx) = channel::<()>();
    node.registry(RegistryMsg::Register(name.clone(), id, recvr, tx));
    match rx.await {
      Ok(()) => bound.push(name),
      Err(_) => error!(LOG_LEVEL, node, format!("Could not register {}", name)),
    }
  }
  bound
}

pub(crate) fn deregister<U: Envelope>(node: &Node<U>, id: u64, names: Vec<Mailbox>) {
  for name in names {
    node.registry(RegistryMsg::Deregister(name, id));
  }
}

pub(crate) async fn run_single<U, S, A>(
  mut actor: A,
  ctx: ActorContext<U, S>,
  mut rx: UnboundedReceiver<LocalActorMsg<S>>,
  id: u64,
  bindings: Vec<(Mailbox, Recvr<U>)>,
) where
  U: Envelope,
  S: Send + 'static,
  A: Actor<U, S> + Send + 'static,
{
  let names = register(&ctx.node, id, bindings).await;
  actor.pre_start(&ctx).await;
  while let Some(msg) = rx.recv().await {
    match msg {
      LocalActorMsg::Msg(m) => actor.recv(&ctx, m).await,
      LocalActorMsg::Signal(ActorSignal::Term) => break,
    }
  }
  actor.post_stop(&ctx).await;
  deregister(&ctx.node, id, names);
}

pub(crate) async fn run_single_timeout<U, S, A>(
  mut actor: A,
  ctx: ActorContext<U, S>,
  mut rx: UnboundedReceiver<LocalActorMsg<S>>,
  id: u64,
  bindings: Vec<(Mailbox, Recvr<U>)>,
  mut timeout: Duration,
) where
  U: Envelope,
  S: Send + 'static,
  A: TimeoutActor<U, S> + Send + 'static,
{
  let names = register(&ctx.node, id, bindings).await;
  timeout = actor.pre_start(&ctx).await.unwrap_or(timeout);
  loop {
    tokio::select! {
      msg = rx.recv() => {
        match msg {
          Some(LocalActorMsg::Msg(m)) => {
            timeout = actor.recv(&ctx, m).await.unwrap_or(timeout);
          }
          Some(LocalActorMsg::Signal(ActorSignal::Term)) | None => break,
        }
      }
      _ = tokio::time::sleep(timeout) => {
        timeout = actor.timeout(&ctx).await.unwrap_or(timeout);
      }
    }
  }
  actor.post_stop(&ctx).await;
  deregister(&ctx.node, id, names);
}
