use std::sync::{Mutex, RwLock};
use std::time::Duration;

use anchorage_stream::CredentialStream;
use log::{debug, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    client::{ClientError, ClusterClient, ClusterConnection},
    method::{AuthMethod, LocalMfaParams, LoginAttempt, SsoParams},
    relay::PasswordlessPromptRelay,
    types::{
        PingResponse, ProfileStatus, WebConfigAuthSettings, DEFAULT_KEY_TTL, LOCAL_CONNECTOR,
        PASSWORDLESS_CONNECTOR,
    },
};

/// A failed login attempt, tagged with the stage that failed.
///
/// Failure at any stage up to and including `SaveProfile` leaves no
/// persistent change to the cluster. `ProfileStatus` is the one exception:
/// the profile has already been persisted when the status reload fails, so
/// the credential is logically active even though this error is returned;
/// retrying the login converges.
#[derive(Debug, Error)]
pub enum LoginError {
    /// Refreshing auth preferences from the cluster ping failed before the
    /// attempt started.
    #[error("failed to refresh cluster auth preferences: {0}")]
    Preference(#[source] ClientError),

    /// Credential acquisition failed (rejection, cancelled challenge or
    /// transport failure).
    #[error("credential acquisition failed: {0}")]
    Acquire(#[source] ClientError),

    /// Could not open the root-cluster connection for the new key.
    #[error("failed to connect to the root cluster: {0}")]
    Connect(#[source] ClientError),

    /// Device-trust activation failed; the credential is not considered
    /// valid.
    #[error("device trust activation failed: {0}")]
    DeviceTrust(#[source] ClientError),

    /// Persisting the profile failed.
    #[error("failed to persist profile: {0}")]
    SaveProfile(#[source] ClientError),

    /// The profile was persisted but its status could not be reloaded.
    #[error("failed to reload profile status: {0}")]
    ProfileStatus(#[source] ClientError),
}

/// A failed auth-preference sync, tagged with the failing step.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The capability probe failed.
    #[error("failed to ping cluster: {0}")]
    Ping(#[source] ClientError),

    /// Persisting the lightweight profile failed.
    #[error("failed to persist profile: {0}")]
    SaveProfile(#[source] ClientError),

    /// Fetching the web configuration failed.
    #[error("failed to fetch web config: {0}")]
    WebConfig(#[source] ClientError),
}

/// A failed logout, tagged with the cleanup step that failed.
#[derive(Debug, Error)]
pub enum LogoutError {
    /// Deleting per-database certificates failed.
    #[error("failed to delete database certificates for {name}: {source}")]
    DbCerts {
        /// Database whose certificates could not be removed.
        name: String,
        /// Underlying client failure.
        source: ClientError,
    },

    /// Removing the cluster's kubeconfig entry failed.
    #[error("failed to remove kubeconfig entry: {0}")]
    Kubeconfig(#[source] ClientError),

    /// Removing local key material failed with something other than
    /// not-found.
    #[error("failed to remove key material: {0}")]
    KeyMaterial(#[source] ClientError),
}

/// Per-cluster connection parameters negotiated across attempts.
#[derive(Debug, Default)]
struct ClusterState {
    auth_connector: String,
    key_ttl: Option<Duration>,
    site_name: String,
    username: String,
}

/// One remote cluster the user can log into.
///
/// Owns the chosen auth connector, the negotiated key TTL and the cached
/// profile status. At most one in-flight login attempt may mutate a given
/// cluster at a time (the caller synchronizes attempts); concurrent reads of
/// the cached status are safe.
pub struct Cluster<C> {
    name: String,
    client: C,
    state: Mutex<ClusterState>,
    // Replaced by whole-value swap so readers never observe a half-updated
    // status.
    status: RwLock<ProfileStatus>,
}

impl<C: ClusterClient> Cluster<C> {
    /// Build a cluster handle for `name` coordinated over `client`.
    pub fn new(name: impl Into<String>, client: C) -> Self {
        Self {
            name: name.into(),
            client,
            state: Mutex::new(ClusterState::default()),
            status: RwLock::new(ProfileStatus::default()),
        }
    }

    /// The cluster's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the cached profile status.
    pub fn status(&self) -> ProfileStatus {
        self.status
            .read()
            .expect("RwLock should not be poisoned")
            .clone()
    }

    /// Connector identifier of the most recent login attempt.
    pub fn auth_connector(&self) -> String {
        self.state
            .lock()
            .expect("Mutex is not poisoned")
            .auth_connector
            .clone()
    }

    /// Key time-to-live negotiated for this cluster, if any.
    pub fn key_ttl(&self) -> Option<Duration> {
        self.state.lock().expect("Mutex is not poisoned").key_ttl
    }

    /// Username bound to the cluster handle by the last successful
    /// credential acquisition.
    pub fn connected_username(&self) -> String {
        self.state
            .lock()
            .expect("Mutex is not poisoned")
            .username
            .clone()
    }

    /// Fetch the cluster's auth preferences and refresh the lightweight
    /// profile.
    ///
    /// Safe to call before and independent of any login; no partial state is
    /// cached on failure.
    pub async fn sync_auth_preference(
        &self,
    ) -> Result<(WebConfigAuthSettings, PingResponse), SyncError> {
        let ping = self.client.ping().await.map_err(SyncError::Ping)?;

        match serde_json::to_string(&ping) {
            Ok(payload) => debug!("got ping response: {payload}"),
            Err(err) => debug!("could not marshal ping response to JSON: {err}"),
        }

        self.client
            .save_profile(false)
            .await
            .map_err(SyncError::SaveProfile)?;

        let config = self
            .client
            .get_web_config()
            .await
            .map_err(SyncError::WebConfig)?;

        Ok((config.auth, ping))
    }

    /// Log in with a local username/password and optional one-time code.
    pub async fn login_local(
        &self,
        user: &str,
        password: &str,
        otp_token: Option<&str>,
    ) -> Result<(), LoginError> {
        self.set_connector(LOCAL_CONNECTOR);

        let method = AuthMethod::LocalMfa(LocalMfaParams {
            user: user.to_owned(),
            password: password.to_owned(),
            otp_token: otp_token.map(str::to_owned),
        });

        self.login(LoginAttempt::new(LOCAL_CONNECTOR, method)).await
    }

    /// Log in through an external SSO provider.
    pub async fn login_sso(
        &self,
        provider_type: &str,
        provider_name: &str,
    ) -> Result<(), LoginError> {
        self.set_connector(provider_name);

        // Session parameters (TTL) must reflect the provider before the
        // redirect starts.
        self.update_from_ping()
            .await
            .map_err(LoginError::Preference)?;

        let method = AuthMethod::Sso(SsoParams {
            provider_type: provider_type.to_owned(),
            provider_name: provider_name.to_owned(),
        });

        self.login(LoginAttempt::new(provider_name, method)).await
    }

    /// Log in with a hardware key, relaying prompts to the remote frontend
    /// on `stream`. Pending prompts abort when `cancel` fires.
    pub async fn login_passwordless(
        &self,
        stream: impl CredentialStream + 'static,
        cancel: CancellationToken,
    ) -> Result<(), LoginError> {
        self.set_connector(PASSWORDLESS_CONNECTOR);

        self.update_from_ping()
            .await
            .map_err(LoginError::Preference)?;

        let method = AuthMethod::Passwordless(PasswordlessPromptRelay::new(stream, cancel));

        self.login(LoginAttempt::new(PASSWORDLESS_CONNECTOR, method))
            .await
    }

    /// Remove every credential this cluster issued: per-database certs, the
    /// kubeconfig entry and the local key material.
    ///
    /// Not-found is tolerated only for the key-material step; a missing key
    /// just means there is nothing left to remove.
    pub async fn logout(&self) -> Result<(), LogoutError> {
        let databases = self
            .status
            .read()
            .expect("RwLock should not be poisoned")
            .databases
            .clone();
        for db in &databases {
            self.client
                .delete_db_certs(db)
                .await
                .map_err(|source| LogoutError::DbCerts {
                    name: db.name.clone(),
                    source,
                })?;
        }

        self.client
            .remove_kubeconfig_entry(&self.client.kube_cluster_addr())
            .await
            .map_err(LogoutError::Kubeconfig)?;

        match self.client.logout().await {
            Err(err) if !err.is_not_found() => Err(LogoutError::KeyMaterial(err)),
            _ => Ok(()),
        }
    }

    /// Drive one login attempt end to end. Strictly ordered; every step
    /// short-circuits, and no profile is persisted unless device trust
    /// activated.
    async fn login(&self, attempt: LoginAttempt) -> Result<(), LoginError> {
        // A site override left from a previous attempt must not redirect
        // this one to a stale leaf cluster.
        self.state
            .lock()
            .expect("Mutex is not poisoned")
            .site_name
            .clear();

        let key = self
            .client
            .ssh_login(&attempt)
            .await
            .map_err(LoginError::Acquire)?;

        // Bind the username before anything touches the profile.
        self.client.update_username(&key.username);
        self.state
            .lock()
            .expect("Mutex is not poisoned")
            .username
            .clone_from(&key.username);

        let (mut proxy_conn, mut auth_conn) = self
            .client
            .connect_to_root_cluster(&key)
            .await
            .map_err(LoginError::Connect)?;

        // Device-trust activation over the fresh connection. Both
        // sub-connections are released before this function returns on every
        // path, so run the activation first and close unconditionally after.
        let device_trust = self.client.attempt_device_login(&key, &mut auth_conn).await;

        if let Err(err) = auth_conn.close().await {
            warn!("failed to close root auth connection: {err}");
        }
        if let Err(err) = proxy_conn.close().await {
            warn!("failed to close proxy connection: {err}");
        }

        device_trust.map_err(LoginError::DeviceTrust)?;

        self.client
            .save_profile(true)
            .await
            .map_err(LoginError::SaveProfile)?;

        let status = self
            .client
            .profile_status()
            .await
            .map_err(LoginError::ProfileStatus)?;
        *self.status.write().expect("RwLock should not be poisoned") = status;

        Ok(())
    }

    /// Probe the cluster and fold its advertised session TTL into the
    /// negotiated key TTL: an already-negotiated TTL wins, then the
    /// cluster's default, then [`DEFAULT_KEY_TTL`].
    async fn update_from_ping(&self) -> Result<PingResponse, ClientError> {
        let ping = self.client.ping().await?;

        let mut state = self.state.lock().expect("Mutex is not poisoned");
        state.key_ttl = state
            .key_ttl
            .or(ping.auth.default_session_ttl)
            .or(Some(DEFAULT_KEY_TTL));

        Ok(ping)
    }

    fn set_connector(&self, connector: &str) {
        self.state
            .lock()
            .expect("Mutex is not poisoned")
            .auth_connector = connector.to_owned();
    }
}
