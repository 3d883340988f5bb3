use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    message::{PromptReply, PromptRequest},
    stream::{CredentialStream, StreamError},
};

/// Create a connected in-process stream pair.
///
/// The [`ChannelStream`] half is handed to the login core, the
/// [`RemoteStream`] half to whatever is bridging the frontend (tests, a
/// terminal service forwarding a gRPC stream, ...). Dropping either half
/// surfaces as [`StreamError::Closed`] on the other.
pub fn channel_stream() -> (ChannelStream, RemoteStream) {
    // One message per direction is in flight at a time, so a capacity of one
    // is enough; the buffer only exists so send does not rendezvous.
    let (request_tx, request_rx) = mpsc::channel(1);
    let (reply_tx, reply_rx) = mpsc::channel(1);

    (
        ChannelStream {
            requests: request_tx,
            replies: reply_rx,
        },
        RemoteStream {
            requests: request_rx,
            replies: reply_tx,
        },
    )
}

/// The core-side half of an in-process [`CredentialStream`].
pub struct ChannelStream {
    requests: mpsc::Sender<PromptRequest>,
    replies: mpsc::Receiver<PromptReply>,
}

#[async_trait]
impl CredentialStream for ChannelStream {
    async fn send(&mut self, request: PromptRequest) -> Result<(), StreamError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| StreamError::Closed)
    }

    async fn receive(&mut self) -> Result<PromptReply, StreamError> {
        self.replies.recv().await.ok_or(StreamError::Closed)
    }
}

/// The frontend-side half of an in-process [`CredentialStream`] pair.
pub struct RemoteStream {
    requests: mpsc::Receiver<PromptRequest>,
    replies: mpsc::Sender<PromptReply>,
}

impl RemoteStream {
    /// Block until the login core sends the next prompt request.
    pub async fn next_request(&mut self) -> Result<PromptRequest, StreamError> {
        self.requests.recv().await.ok_or(StreamError::Closed)
    }

    /// Send one reply back to the login core.
    pub async fn reply(&mut self, reply: PromptReply) -> Result<(), StreamError> {
        self.replies
            .send(reply)
            .await
            .map_err(|_| StreamError::Closed)
    }
}
