use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use std::fmt::Display;
use std::pin::pin;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Messages a subscriber may have queued before it counts as stuck.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

const COMMAND_CAPACITY: usize = 1024;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

enum Command {
    Register(Member),
    Broadcast(String),
    Count(oneshot::Sender<usize>),
}

/// The control loop's view of one subscriber.
struct Member {
    queue: mpsc::Sender<String>,
    token: CancellationToken,
}

/// Fan-out of text messages to every connected subscriber.
///
/// The subscriber set lives inside a single control loop task; handles only
/// talk to it through a command channel. Cloning a hub yields another handle
/// to the same loop.
#[derive(Clone)]
pub struct NotificationHub {
    commands: mpsc::Sender<Command>,
    root: CancellationToken,
}

impl NotificationHub {
    /// Start the control loop. It runs until `root` is cancelled.
    pub fn new(root: CancellationToken) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);
        tokio::spawn(control_loop(rx, root.clone()));
        Self { commands, root }
    }

    /// Attach a connection and serve it until it closes, is evicted, or the
    /// hub shuts down.
    ///
    /// Inbound text is broadcast to every subscriber, the sender included.
    pub async fn accept_connection<S, R, E>(&self, sink: S, stream: R)
    where
        S: Sink<String>,
        S::Error: Display,
        R: Stream<Item = Result<String, E>>,
        E: Display,
    {
        let token = self.root.child_token();
        let (queue, mut outbound) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let member = Member {
            queue,
            token: token.clone(),
        };
        if self.commands.send(Command::Register(member)).await.is_err() {
            tracing::debug!("hub stopped, refusing subscriber");
            return;
        }

        let writer = async {
            let mut sink = pin!(sink);
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => None,
                    msg = outbound.recv() => msg,
                };
                let Some(msg) = next else { break };
                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = sink.send(msg) => {
                        if let Err(e) = sent {
                            tracing::debug!(error = %e, "subscriber write failed");
                            break;
                        }
                    }
                }
            }
            token.cancel();
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
        };

        let reader = async {
            let mut stream = pin!(stream);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = stream.next() => match next {
                        Some(Ok(text)) => self.broadcast(text).await,
                        Some(Err(e)) => {
                            tracing::debug!(error = %e, "subscriber read failed");
                            break;
                        }
                        None => break,
                    }
                }
            }
            token.cancel();
        };

        tokio::join!(writer, reader);
        tracing::debug!("subscriber closed");
    }

    /// Queue `message` for every live subscriber. Dropped if the hub has stopped.
    pub async fn broadcast(&self, message: impl Into<String>) {
        let _ = self
            .commands
            .send(Command::Broadcast(message.into()))
            .await;
    }

    /// Serialize `payload` as JSON and broadcast it.
    pub async fn broadcast_json<T: Serialize>(&self, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(json) => self.broadcast(json).await,
            Err(e) => tracing::error!(error = %e, "failed to serialize broadcast payload"),
        }
    }

    /// Number of live subscribers; zero once the hub has stopped.
    pub async fn subscriber_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Count(reply)).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

async fn control_loop(mut commands: mpsc::Receiver<Command>, root: CancellationToken) {
    let mut members: Vec<Member> = Vec::new();
    loop {
        tokio::select! {
            _ = root.cancelled() => break,
            cmd = commands.recv() => match cmd {
                Some(Command::Register(member)) => {
                    register(&mut members, member);
                    tracing::debug!(subscribers = members.len(), "subscriber registered");
                }
                Some(Command::Broadcast(msg)) => fan_out(&mut members, &msg),
                Some(Command::Count(reply)) => {
                    prune(&mut members);
                    let _ = reply.send(members.len());
                }
                None => break,
            }
        }
    }
    tracing::debug!(subscribers = members.len(), "notification hub stopped");
}

/// Add `member`, first dropping any that left since the last broadcast.
fn register(members: &mut Vec<Member>, member: Member) {
    prune(members);
    members.push(member);
}

/// Forget subscribers that have already gone away.
fn prune(members: &mut Vec<Member>) {
    members.retain(|m| !m.token.is_cancelled() && !m.queue.is_closed());
}

/// Enqueue without waiting. A full queue evicts its subscriber.
fn fan_out(members: &mut Vec<Member>, msg: &str) {
    members.retain(|m| {
        if m.token.is_cancelled() {
            return false;
        }
        match m.queue.try_send(msg.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(capacity = SUBSCRIBER_QUEUE_CAPACITY, "evicting stuck subscriber");
                m.token.cancel();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    });
}
