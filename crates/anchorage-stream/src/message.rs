use serde::{Deserialize, Serialize};

/// Discriminant for the prompt types a remote frontend can be asked to
/// present.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptKind {
    Pin,
    Touch,
    Credential,
}

/// One hardware-resident credential offered to the user for selection.
///
/// Only the username is exposed to the frontend; the credential itself never
/// leaves the authenticator.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub username: String,
}

/// A prompt request sent from the login core to the remote frontend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptRequest {
    /// Ask the user for their authenticator PIN.
    Pin,
    /// Ask the user to tap their security key. No reply is expected.
    Touch,
    /// Ask the user to pick one of the listed credentials. The reply index
    /// refers to this list's ordering.
    Credential { credentials: Vec<CredentialEntry> },
}

impl PromptRequest {
    /// The kind of prompt this request carries.
    pub fn kind(&self) -> PromptKind {
        match self {
            PromptRequest::Pin => PromptKind::Pin,
            PromptRequest::Touch => PromptKind::Touch,
            PromptRequest::Credential { .. } => PromptKind::Credential,
        }
    }
}

/// A reply sent from the remote frontend back to the login core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptReply {
    /// Answer to a [`PromptRequest::Pin`].
    Pin { pin: String },
    /// Answer to a [`PromptRequest::Credential`], selecting the credential at
    /// `index` in the presented list.
    Credential { index: u64 },
}

impl PromptReply {
    /// The prompt kind this reply answers.
    pub fn kind(&self) -> PromptKind {
        match self {
            PromptReply::Pin { .. } => PromptKind::Pin,
            PromptReply::Credential { .. } => PromptKind::Credential,
        }
    }
}
