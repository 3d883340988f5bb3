#![doc = include_str!("../README.md")]

mod channel;
mod message;
mod stream;

pub use channel::{channel_stream, ChannelStream, RemoteStream};
pub use message::{CredentialEntry, PromptKind, PromptReply, PromptRequest};
pub use stream::{CredentialStream, StreamError};
