use crate::relay::{LoginPrompt, PasswordlessPromptRelay};

/// Parameters for a local username/password (+ optional OTP) login.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalMfaParams {
    pub user: String,
    pub password: String,
    pub otp_token: Option<String>,
}

/// Parameters for an SSO redirect login.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SsoParams {
    pub provider_type: String,
    pub provider_name: String,
}

/// The credential-acquisition method of one login attempt.
///
/// Each variant is a self-contained value object holding exactly the state
/// its method needs; the passwordless variant owns the prompt relay for the
/// attempt's stream.
pub enum AuthMethod {
    /// Username/password exchange with optional one-time code.
    LocalMfa(LocalMfaParams),
    /// Browser redirect through an external SSO provider.
    Sso(SsoParams),
    /// Hardware-key login, prompting the user through the relay.
    Passwordless(PasswordlessPromptRelay),
}

impl AuthMethod {
    /// The prompt capabilities to hand to the authenticator engine, present
    /// only for passwordless attempts.
    pub fn prompt(&self) -> Option<&dyn LoginPrompt> {
        match self {
            AuthMethod::Passwordless(relay) => Some(relay),
            _ => None,
        }
    }
}

/// One in-flight login attempt. Transient: created per entry-point call and
/// discarded after success or failure, never persisted.
pub struct LoginAttempt {
    /// Connector the attempt authenticates through.
    pub connector: String,
    /// How credentials are acquired.
    pub method: AuthMethod,
}

impl LoginAttempt {
    /// Build an attempt for `connector` using `method`.
    pub fn new(connector: impl Into<String>, method: AuthMethod) -> Self {
        Self {
            connector: connector.into(),
            method,
        }
    }
}
