use async_trait::async_trait;
use thiserror::Error;

use crate::message::{PromptReply, PromptRequest};

/// Failure modes of a [`CredentialStream`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The remote side hung up or the underlying transport was torn down.
    #[error("credential stream closed")]
    Closed,

    /// Any other transport-level failure, carrying the transport's own
    /// description.
    #[error("credential stream transport failure: {0}")]
    Transport(String),
}

/// A duplex channel between the login core and a remote frontend, carrying
/// exactly one typed message per direction at a time.
///
/// The protocol has no request/reply correlation ids; callers must not issue
/// a second `send` before the reply to the first (if any) has been received.
/// The prompt relay enforces this ordering, implementations do not need to.
#[async_trait]
pub trait CredentialStream: Send {
    /// Send one prompt request to the remote frontend.
    async fn send(&mut self, request: PromptRequest) -> Result<(), StreamError>;

    /// Block until the remote frontend sends one reply.
    async fn receive(&mut self) -> Result<PromptReply, StreamError>;
}
