#![doc = include_str!("../README.md")]

mod client;
mod cluster;
mod method;
mod relay;
mod types;

pub use client::{ClientError, ClusterClient, ClusterConnection};
pub use cluster::{Cluster, LoginError, LogoutError, SyncError};
pub use method::{AuthMethod, LocalMfaParams, LoginAttempt, SsoParams};
pub use relay::{LoginPrompt, PasswordlessPromptRelay, PromptError, TouchAck};
pub use types::{
    AuthSettings, CredentialMaterial, DatabaseEntry, PingResponse, ProfileStatus,
    ResidentCredential, WebConfig, WebConfigAuthSettings, DEFAULT_KEY_TTL, LOCAL_CONNECTOR,
    PASSWORDLESS_CONNECTOR,
};
