use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connector identifier for local username/password (+OTP) logins.
pub const LOCAL_CONNECTOR: &str = "local";
/// Connector identifier for passwordless hardware-key logins.
pub const PASSWORDLESS_CONNECTOR: &str = "passwordless";

/// Fallback key time-to-live when neither the cluster nor the caller
/// negotiated one.
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// The cryptographic identity produced by a successful authentication.
///
/// Ownership moves to the session/profile layer once a login succeeds; the
/// prompt relay never retains it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialMaterial {
    /// Cluster-side username the credential was issued for.
    pub username: String,
    /// SSH certificate, DER encoded.
    pub ssh_cert: Vec<u8>,
    /// TLS certificate, DER encoded.
    pub tls_cert: Vec<u8>,
}

/// One credential stored on a hardware authenticator, discoverable without a
/// prior username hint. Supplied by the authenticator engine and read-only to
/// the relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResidentCredential {
    /// Username associated with the resident key.
    pub username: String,
}

/// Result of a cluster capability probe.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub cluster_name: String,
    pub server_version: String,
    pub auth: AuthSettings,
}

/// Authentication parameters advertised by the cluster in a ping response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Default TTL the cluster issues session keys with, if it advertises
    /// one.
    pub default_session_ttl: Option<Duration>,
    /// Whether passwordless authentication is allowed.
    pub allow_passwordless: bool,
}

/// Full web configuration fetched from the cluster.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebConfig {
    pub auth: WebConfigAuthSettings,
}

/// The auth subset of the cluster web configuration.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebConfigAuthSettings {
    pub local_auth_enabled: bool,
    pub allow_passwordless: bool,
    pub providers: Vec<String>,
}

/// Locally persisted session state for one cluster, as reported by the
/// profile layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStatus {
    /// Username the profile's credentials were issued for. Empty when logged
    /// out.
    pub username: String,
    /// Databases the user holds per-database certificates for.
    pub databases: Vec<DatabaseEntry>,
    /// Expiry of the profile's credentials, if any are present.
    pub valid_until: Option<DateTime<Utc>>,
}

/// One database the user is connected to through the cluster.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub name: String,
}
