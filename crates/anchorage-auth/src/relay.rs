use anchorage_stream::{
    CredentialEntry, CredentialStream, PromptKind, PromptReply, PromptRequest, StreamError,
};
use async_trait::async_trait;
use log::debug;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::types::ResidentCredential;

/// Failures of a single prompt round-trip.
///
/// Validation errors are caused by malformed remote input and are never
/// retried; the authenticator engine aborts the attempt on the first one.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    /// The PIN reply carried an empty or absent PIN.
    #[error("pin is required")]
    MissingPin,

    /// Credential selection was invoked with an empty candidate list.
    #[error("attempted to prompt credential selection with no credentials")]
    EmptyCredentials,

    /// The selection index does not address a presented credential.
    #[error("selected credential index {index} is out of range for {len} credentials")]
    InvalidSelection {
        /// Index the remote party replied with.
        index: u64,
        /// Number of credentials presented.
        len: usize,
    },

    /// The reply answers a different prompt kind than the one outstanding.
    #[error("expected a {expected:?} reply, received a {received:?} reply")]
    UnexpectedReply {
        /// Kind of the prompt that was sent.
        expected: PromptKind,
        /// Kind of the reply that arrived.
        received: PromptKind,
    },

    /// A prompt was issued while another one is still outstanding.
    #[error("another prompt is already outstanding on this stream")]
    PromptOutstanding,

    /// A prompt was issued after the relay had already failed.
    #[error("the prompt relay has failed, no further prompts are accepted")]
    RelayFailed,

    /// The governing cancellation token fired while the prompt was pending.
    #[error("prompt cancelled")]
    Cancelled,

    /// Send or receive failed on the underlying stream.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// The single outstanding prompt on a stream, if any.
///
/// A reply is only valid against the matching last-sent prompt kind, and at
/// most one prompt is outstanding per stream at a time. Once `Failed`, the
/// relay rejects all further prompts: the stream may still be carrying a
/// reply to the failed prompt, and answering a stale prompt with a new reply
/// would corrupt the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PromptState {
    Idle,
    AwaitingPinReply,
    AwaitingTouchAck,
    AwaitingCredentialReply,
    Failed,
}

/// Prompt capabilities required by the authenticator-driving engine.
///
/// The engine invokes these in an order and cardinality it alone determines:
/// zero or one of each per login attempt, never concurrently. Implementors
/// other than [`PasswordlessPromptRelay`] are typically scripted test
/// doubles.
#[async_trait]
pub trait LoginPrompt: Send + Sync {
    /// Ask the user for their authenticator PIN.
    async fn prompt_pin(&self) -> Result<String, PromptError>;

    /// Ask the user to tap their security key. Returns immediately with an
    /// acknowledger; the tap itself is detected by the authenticator
    /// hardware.
    async fn prompt_touch(&self) -> Result<TouchAck, PromptError>;

    /// Ask the user to pick one of `candidates`. The returned credential is
    /// one of the offered candidates.
    async fn prompt_credential(
        &self,
        candidates: Vec<ResidentCredential>,
    ) -> Result<ResidentCredential, PromptError>;
}

/// Acknowledgement handle returned by [`LoginPrompt::prompt_touch`].
///
/// The wire protocol has no touch-ack message, so acknowledging is local
/// only.
#[derive(Debug)]
pub struct TouchAck(());

impl TouchAck {
    /// Record that the authenticator detected the user's tap.
    pub fn acknowledge(self) {
        debug!("detected security key tap");
    }
}

/// Relays authenticator prompts to a remote frontend over a
/// [`CredentialStream`].
///
/// Each prompt is one synchronous send/receive pair; nothing is retried or
/// buffered. A human is on the other end of the stream, so transport errors
/// are surfaced as-is for the user to re-initiate rather than papered over
/// with repetition that could answer a stale prompt.
///
/// One relay is constructed per login attempt and discarded with it.
pub struct PasswordlessPromptRelay {
    inner: Mutex<RelayInner>,
    cancel: CancellationToken,
}

struct RelayInner {
    stream: Box<dyn CredentialStream>,
    state: PromptState,
}

impl PasswordlessPromptRelay {
    /// Build a relay over `stream`. Pending receives abort with
    /// [`PromptError::Cancelled`] when `cancel` fires.
    pub fn new(stream: impl CredentialStream + 'static, cancel: CancellationToken) -> Self {
        Self {
            inner: Mutex::new(RelayInner {
                stream: Box::new(stream),
                state: PromptState::Idle,
            }),
            cancel,
        }
    }

    /// Claim the stream for one prompt. Fails loudly on concurrent misuse
    /// instead of queueing behind the outstanding prompt.
    fn begin(&self) -> Result<MutexGuard<'_, RelayInner>, PromptError> {
        if self.cancel.is_cancelled() {
            return Err(PromptError::Cancelled);
        }
        let inner = self
            .inner
            .try_lock()
            .map_err(|_| PromptError::PromptOutstanding)?;
        match inner.state {
            PromptState::Idle => Ok(inner),
            PromptState::Failed => Err(PromptError::RelayFailed),
            _ => Err(PromptError::PromptOutstanding),
        }
    }
}

#[async_trait]
impl LoginPrompt for PasswordlessPromptRelay {
    async fn prompt_pin(&self) -> Result<String, PromptError> {
        let mut inner = self.begin()?;

        let reply = inner
            .round_trip(
                PromptRequest::Pin,
                PromptState::AwaitingPinReply,
                &self.cancel,
            )
            .await?;

        match reply {
            PromptReply::Pin { pin } if !pin.is_empty() => {
                inner.state = PromptState::Idle;
                Ok(pin)
            }
            PromptReply::Pin { .. } => {
                inner.state = PromptState::Failed;
                Err(PromptError::MissingPin)
            }
            other => {
                inner.state = PromptState::Failed;
                Err(PromptError::UnexpectedReply {
                    expected: PromptKind::Pin,
                    received: other.kind(),
                })
            }
        }
    }

    async fn prompt_touch(&self) -> Result<TouchAck, PromptError> {
        let mut inner = self.begin()?;

        // Touch is detected locally by the authenticator hardware; the
        // protocol reads no reply for it.
        inner.state = PromptState::AwaitingTouchAck;
        if let Err(err) = inner.stream.send(PromptRequest::Touch).await {
            inner.state = PromptState::Failed;
            return Err(err.into());
        }
        inner.state = PromptState::Idle;

        Ok(TouchAck(()))
    }

    async fn prompt_credential(
        &self,
        candidates: Vec<ResidentCredential>,
    ) -> Result<ResidentCredential, PromptError> {
        // A silent fallback here could select an arbitrary, wrong credential.
        if candidates.is_empty() {
            return Err(PromptError::EmptyCredentials);
        }

        let mut inner = self.begin()?;

        // Pair every candidate with its wire projection, then sort the pairs
        // by username so the domain and wire orderings are the same ordering
        // by construction. Index i in the reply addresses sorted candidate i.
        let mut ordered: Vec<(ResidentCredential, CredentialEntry)> = candidates
            .into_iter()
            .map(|candidate| {
                let entry = CredentialEntry {
                    username: candidate.username.clone(),
                };
                (candidate, entry)
            })
            .collect();
        ordered.sort_by(|a, b| a.0.username.cmp(&b.0.username));

        let credentials = ordered.iter().map(|(_, entry)| entry.clone()).collect();

        let reply = inner
            .round_trip(
                PromptRequest::Credential { credentials },
                PromptState::AwaitingCredentialReply,
                &self.cancel,
            )
            .await?;

        match reply {
            PromptReply::Credential { index } if (index as usize) < ordered.len() => {
                inner.state = PromptState::Idle;
                let (candidate, _) = ordered.swap_remove(index as usize);
                Ok(candidate)
            }
            PromptReply::Credential { index } => {
                inner.state = PromptState::Failed;
                Err(PromptError::InvalidSelection {
                    index,
                    len: ordered.len(),
                })
            }
            other => {
                inner.state = PromptState::Failed;
                Err(PromptError::UnexpectedReply {
                    expected: PromptKind::Credential,
                    received: other.kind(),
                })
            }
        }
    }
}

impl RelayInner {
    /// Send `request` and block for exactly one reply, racing the
    /// cancellation token. Leaves the state at `awaiting` on success so the
    /// caller finishes validation; any failure here is terminal for the
    /// relay.
    async fn round_trip(
        &mut self,
        request: PromptRequest,
        awaiting: PromptState,
        cancel: &CancellationToken,
    ) -> Result<PromptReply, PromptError> {
        self.state = awaiting;

        if let Err(err) = self.stream.send(request).await {
            self.state = PromptState::Failed;
            return Err(err.into());
        }

        let received = tokio::select! {
            () = cancel.cancelled() => {
                self.state = PromptState::Failed;
                return Err(PromptError::Cancelled);
            }
            received = self.stream.receive() => received,
        };

        match received {
            Ok(reply) => Ok(reply),
            Err(err) => {
                self.state = PromptState::Failed;
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex as StdMutex},
        time::Duration,
    };

    use anchorage_stream::channel_stream;

    use super::*;

    /// Stream double that records sent requests and plays back queued
    /// replies.
    struct ScriptedStream {
        sent: Arc<StdMutex<Vec<PromptRequest>>>,
        replies: VecDeque<Result<PromptReply, StreamError>>,
    }

    impl ScriptedStream {
        fn new(
            replies: Vec<Result<PromptReply, StreamError>>,
        ) -> (Self, Arc<StdMutex<Vec<PromptRequest>>>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            (
                Self {
                    sent: sent.clone(),
                    replies: replies.into(),
                },
                sent,
            )
        }
    }

    #[async_trait]
    impl CredentialStream for ScriptedStream {
        async fn send(&mut self, request: PromptRequest) -> Result<(), StreamError> {
            self.sent.lock().unwrap().push(request);
            Ok(())
        }

        async fn receive(&mut self) -> Result<PromptReply, StreamError> {
            self.replies.pop_front().unwrap_or(Err(StreamError::Closed))
        }
    }

    /// Stream double whose receive never resolves, for cancellation tests.
    struct PendingStream;

    #[async_trait]
    impl CredentialStream for PendingStream {
        async fn send(&mut self, _request: PromptRequest) -> Result<(), StreamError> {
            Ok(())
        }

        async fn receive(&mut self) -> Result<PromptReply, StreamError> {
            std::future::pending().await
        }
    }

    fn relay_with(replies: Vec<Result<PromptReply, StreamError>>) -> (
        PasswordlessPromptRelay,
        Arc<StdMutex<Vec<PromptRequest>>>,
    ) {
        let (stream, sent) = ScriptedStream::new(replies);
        (
            PasswordlessPromptRelay::new(stream, CancellationToken::new()),
            sent,
        )
    }

    fn credential(username: &str) -> ResidentCredential {
        ResidentCredential {
            username: username.to_owned(),
        }
    }

    #[tokio::test]
    async fn pin_round_trip_returns_the_pin() {
        let (relay, sent) = relay_with(vec![Ok(PromptReply::Pin {
            pin: "1234".to_owned(),
        })]);

        let pin = relay.prompt_pin().await.unwrap();

        assert_eq!(pin, "1234");
        assert_eq!(*sent.lock().unwrap(), vec![PromptRequest::Pin]);
    }

    #[tokio::test]
    async fn empty_pin_reply_is_a_validation_error() {
        let (relay, _) = relay_with(vec![Ok(PromptReply::Pin { pin: String::new() })]);

        assert_eq!(relay.prompt_pin().await, Err(PromptError::MissingPin));
    }

    #[tokio::test]
    async fn pin_reply_of_the_wrong_kind_is_rejected() {
        let (relay, _) = relay_with(vec![Ok(PromptReply::Credential { index: 0 })]);

        assert_eq!(
            relay.prompt_pin().await,
            Err(PromptError::UnexpectedReply {
                expected: PromptKind::Pin,
                received: PromptKind::Credential,
            })
        );
    }

    #[tokio::test]
    async fn touch_sends_without_awaiting_a_reply() {
        let (relay, sent) = relay_with(vec![]);

        let ack = relay.prompt_touch().await.unwrap();
        ack.acknowledge();

        assert_eq!(*sent.lock().unwrap(), vec![PromptRequest::Touch]);
    }

    #[tokio::test]
    async fn credentials_are_presented_sorted_by_username() {
        // Reply index 0 addresses the *presented* (sorted) ordering, not the
        // input ordering.
        let (relay, sent) = relay_with(vec![Ok(PromptReply::Credential { index: 0 })]);

        let selected = relay
            .prompt_credential(vec![credential("bob"), credential("alice")])
            .await
            .unwrap();

        assert_eq!(selected, credential("alice"));
        assert_eq!(
            *sent.lock().unwrap(),
            vec![PromptRequest::Credential {
                credentials: vec![
                    CredentialEntry {
                        username: "alice".to_owned()
                    },
                    CredentialEntry {
                        username: "bob".to_owned()
                    },
                ],
            }]
        );
    }

    #[tokio::test]
    async fn out_of_range_selection_is_a_validation_error() {
        for index in [2, 17] {
            let (relay, _) = relay_with(vec![Ok(PromptReply::Credential { index })]);

            let result = relay
                .prompt_credential(vec![credential("bob"), credential("alice")])
                .await;

            assert_eq!(
                result,
                Err(PromptError::InvalidSelection { index, len: 2 })
            );
        }
    }

    #[tokio::test]
    async fn empty_candidates_send_nothing() {
        let (relay, sent) = relay_with(vec![]);

        assert_eq!(
            relay.prompt_credential(Vec::new()).await,
            Err(PromptError::EmptyCredentials)
        );
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_on_receive_is_surfaced_unchanged() {
        let (relay, _) = relay_with(vec![Err(StreamError::Transport("reset".to_owned()))]);

        assert_eq!(
            relay.prompt_pin().await,
            Err(PromptError::Stream(StreamError::Transport(
                "reset".to_owned()
            )))
        );
    }

    #[tokio::test]
    async fn prompts_after_a_failure_are_rejected() {
        let (relay, sent) = relay_with(vec![Ok(PromptReply::Pin { pin: String::new() })]);

        assert_eq!(relay.prompt_pin().await, Err(PromptError::MissingPin));
        assert_eq!(relay.prompt_pin().await, Err(PromptError::RelayFailed));
        // Only the first prompt made it onto the stream.
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_reply() {
        let cancel = CancellationToken::new();
        let relay = PasswordlessPromptRelay::new(PendingStream, cancel.clone());

        let pending = tokio::spawn(async move { relay.prompt_pin().await });
        tokio::task::yield_now().await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("prompt should return promptly after cancellation")
            .unwrap();
        assert_eq!(result, Err(PromptError::Cancelled));
    }

    #[tokio::test]
    async fn prompts_after_cancellation_fail_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (stream, sent) = ScriptedStream::new(vec![]);
        let relay = PasswordlessPromptRelay::new(stream, cancel);

        assert_eq!(relay.prompt_pin().await, Err(PromptError::Cancelled));
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_exchange_over_a_channel_stream() {
        let (core, mut remote) = channel_stream();
        let relay = PasswordlessPromptRelay::new(core, CancellationToken::new());

        let frontend = tokio::spawn(async move {
            assert_eq!(remote.next_request().await.unwrap(), PromptRequest::Pin);
            remote
                .reply(PromptReply::Pin {
                    pin: "9481".to_owned(),
                })
                .await
                .unwrap();

            match remote.next_request().await.unwrap() {
                PromptRequest::Credential { credentials } => {
                    let usernames: Vec<_> =
                        credentials.iter().map(|c| c.username.clone()).collect();
                    assert_eq!(usernames, ["alice", "bob", "carol"]);
                }
                other => panic!("unexpected request: {other:?}"),
            }
            remote.reply(PromptReply::Credential { index: 1 }).await.unwrap();
        });

        assert_eq!(relay.prompt_pin().await.unwrap(), "9481");
        let selected = relay
            .prompt_credential(vec![
                credential("carol"),
                credential("alice"),
                credential("bob"),
            ])
            .await
            .unwrap();
        assert_eq!(selected, credential("bob"));

        frontend.await.unwrap();
    }
}
