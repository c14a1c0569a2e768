use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use geochat_core::domain::message::Message;
use geochat_core::domain::user::UserId;
use geochat_db::repositories::ConversationRepository;

use crate::llm::TextStream;

const RELAY_BUFFER: usize = 16;

/// How a relay task ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream finished. `persisted` is false when there was no text to store.
    Completed { persisted: bool },
    /// Upstream failed after the stream started; nothing was stored.
    UpstreamFailed(String),
    /// The receiving body went away; upstream was dropped and nothing was stored.
    ClientDisconnected,
    /// The full answer arrived but could not be appended to the history.
    PersistFailed(String),
}

/// A running relay. `body` carries the deltas; `supervisor` resolves once the
/// relay task has ended and its outcome has been logged. It resolves to
/// `None` if the relay task panicked or was cancelled.
pub struct Relay {
    pub body: ReceiverStream<Bytes>,
    pub supervisor: JoinHandle<Option<RelayOutcome>>,
}

pub fn spawn_relay(
    upstream: TextStream,
    repository: Arc<dyn ConversationRepository>,
    user: UserId,
    correlation_id: String,
) -> Relay {
    let (tx, rx) = mpsc::channel::<Bytes>(RELAY_BUFFER);
    let task = tokio::spawn(relay(upstream, tx, repository, user.clone(), correlation_id.clone()));

    let supervisor = tokio::spawn(async move {
        match task.await {
            Ok(outcome) => {
                log_outcome(&outcome, &user, &correlation_id);
                Some(outcome)
            }
            Err(join_error) if join_error.is_panic() => {
                error!(
                    event_name = "completion.relay.panicked",
                    correlation_id = %correlation_id,
                    user_id = %user,
                    "completion relay task panicked"
                );
                None
            }
            Err(_) => {
                warn!(
                    event_name = "completion.relay.cancelled",
                    correlation_id = %correlation_id,
                    user_id = %user,
                    "completion relay task was cancelled"
                );
                None
            }
        }
    });

    Relay { body: ReceiverStream::new(rx), supervisor }
}

async fn relay(
    mut upstream: TextStream,
    tx: mpsc::Sender<Bytes>,
    repository: Arc<dyn ConversationRepository>,
    user: UserId,
    correlation_id: String,
) -> RelayOutcome {
    let mut answer = String::new();

    loop {
        tokio::select! {
            _ = tx.closed() => return RelayOutcome::ClientDisconnected,
            next = upstream.next() => match next {
                Some(Ok(delta)) => {
                    if delta.is_empty() {
                        continue;
                    }
                    answer.push_str(&delta);
                    if tx.send(Bytes::from(delta)).await.is_err() {
                        return RelayOutcome::ClientDisconnected;
                    }
                }
                Some(Err(error)) => return RelayOutcome::UpstreamFailed(error.to_string()),
                None => break,
            },
        }
    }

    // The answer is stored before the body closes, so a caller that has read
    // to the end sees it in the history.
    if answer.is_empty() {
        return RelayOutcome::Completed { persisted: false };
    }

    let stored = repository.append_messages(&user, vec![Message::assistant(answer)]).await;
    drop(tx);

    match stored {
        Ok(_) => RelayOutcome::Completed { persisted: true },
        Err(error) => {
            warn!(
                event_name = "completion.persist_failed",
                correlation_id = %correlation_id,
                user_id = %user,
                error = %error,
                "streamed answer could not be stored"
            );
            RelayOutcome::PersistFailed(error.to_string())
        }
    }
}

fn log_outcome(outcome: &RelayOutcome, user: &UserId, correlation_id: &str) {
    match outcome {
        RelayOutcome::Completed { persisted } => info!(
            event_name = "completion.relay.completed",
            correlation_id,
            user_id = %user,
            persisted,
            "completion relay finished"
        ),
        RelayOutcome::UpstreamFailed(reason) => warn!(
            event_name = "completion.relay.upstream_failed",
            correlation_id,
            user_id = %user,
            reason = %reason,
            "language model stream failed mid-flight; answer discarded"
        ),
        RelayOutcome::ClientDisconnected => info!(
            event_name = "completion.relay.client_disconnected",
            correlation_id,
            user_id = %user,
            "client disconnected; answer discarded"
        ),
        RelayOutcome::PersistFailed(reason) => warn!(
            event_name = "completion.relay.persist_failed",
            correlation_id,
            user_id = %user,
            reason = %reason,
            "completion relay could not store the answer"
        ),
    }
}
