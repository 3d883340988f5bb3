use async_trait::async_trait;
use thiserror::Error;

use crate::{
    method::LoginAttempt,
    relay::PromptError,
    types::{CredentialMaterial, DatabaseEntry, PingResponse, ProfileStatus, WebConfig},
};

/// Failures reported by the transport/session collaborator.
///
/// The kind distinction matters to callers: an authentication rejection is a
/// terminal answer from the cluster, a transport failure is not, and
/// not-found is tolerated in exactly one place (removing local key material
/// during logout).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The cluster rejected the presented credentials (bad password, bad
    /// OTP, SSO denial).
    #[error("authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any network or session-layer failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A passwordless prompt failed (validation, transport or cancellation).
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

impl ClientError {
    /// Whether this error is a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// An open connection to the root cluster.
///
/// Connections handed out by [`ClusterClient::connect_to_root_cluster`] are
/// explicitly closed by the login sequence on every exit path.
#[async_trait]
pub trait ClusterConnection: Send {
    /// Close the connection, releasing its resources.
    async fn close(&mut self) -> Result<(), ClientError>;
}

/// The transport/session client a [`Cluster`](crate::Cluster) coordinates.
///
/// Implementations own all network I/O, certificate exchange and on-disk
/// profile persistence. This crate never performs I/O of its own; it only
/// sequences calls into this trait.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Proxy-level connection to the root cluster.
    type ProxyConn: ClusterConnection;
    /// Auth-service connection to the root cluster.
    type AuthConn: ClusterConnection;

    /// Probe the cluster for its capabilities and auth settings.
    async fn ping(&self) -> Result<PingResponse, ClientError>;

    /// Fetch the cluster's full web configuration.
    async fn get_web_config(&self) -> Result<WebConfig, ClientError>;

    /// Persist the current profile. `overwrite` replaces an existing profile
    /// for the same cluster.
    async fn save_profile(&self, overwrite: bool) -> Result<(), ClientError>;

    /// Load the persisted profile's status from disk.
    async fn profile_status(&self) -> Result<ProfileStatus, ClientError>;

    /// Bind `username` to the local credential store.
    fn update_username(&self, username: &str);

    /// Run the attempt's credential-acquisition method against the cluster
    /// and return the resulting key material.
    ///
    /// For passwordless attempts the implementation hands the attempt's
    /// prompt capabilities to the authenticator-driving engine, which invokes
    /// them in an order and cardinality it alone determines.
    async fn ssh_login(&self, attempt: &LoginAttempt) -> Result<CredentialMaterial, ClientError>;

    /// Open proxy and auth connections to the root cluster using freshly
    /// issued key material.
    async fn connect_to_root_cluster(
        &self,
        key: &CredentialMaterial,
    ) -> Result<(Self::ProxyConn, Self::AuthConn), ClientError>;

    /// Attempt device-trust activation for the new key. An error means the
    /// credential must not be considered valid.
    async fn attempt_device_login(
        &self,
        key: &CredentialMaterial,
        auth_conn: &mut Self::AuthConn,
    ) -> Result<(), ClientError>;

    /// Remove this user's key material from disk and any running agent.
    async fn logout(&self) -> Result<(), ClientError>;

    /// Delete the per-database certificates for `db`.
    async fn delete_db_certs(&self, db: &DatabaseEntry) -> Result<(), ClientError>;

    /// Remove the kubeconfig entry pointing at `server_addr`.
    async fn remove_kubeconfig_entry(&self, server_addr: &str) -> Result<(), ClientError>;

    /// Address kube clusters are reached through, used to locate kubeconfig
    /// entries on logout.
    fn kube_cluster_addr(&self) -> String;
}
