//! The closed error taxonomy carried across the wire
//!
//! Protocol errors travel as `{ original_type_name, description }` so the
//! receiving side can re-raise the precise kind. The set of deserializable
//! names is closed; unknown names come back as [`PepError::Other`] with the
//! original tag preserved for logging.

use crate::proofs::InvalidProof;
use crate::serialization::SerializeError;
use crate::signature::{SignatureError, SignatureValidityPeriodError};

/// Raised when a ticket's own timestamp falls outside the leeway.
#[derive(Debug, thiserror::Error)]
#[error("ticket validity period exceeded: {0}")]
pub struct SignedTicket2ValidityPeriodError(pub String);

/// All error kinds a protocol peer can return.
#[derive(Debug, thiserror::Error)]
pub enum PepError {
    /// Chain invalid, subject mismatch or tampered bytes. Fatal per request.
    #[error("signature error: {0}")]
    Signature(String),
    /// Stale or future-dated signature; re-sign and retry.
    #[error(transparent)]
    SignatureValidityPeriod(#[from] SignatureValidityPeriodError),
    /// Stale ticket; request a fresh one.
    #[error(transparent)]
    TicketValidityPeriod(#[from] SignedTicket2ValidityPeriodError),
    /// A translation proof failed to verify. Not retryable.
    #[error(transparent)]
    InvalidProof(#[from] InvalidProof),
    /// Policy-level denial. Not retryable without a policy change.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// Malformed bytes, wrong magic or non-canonical group element.
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    /// Connection-level failure; retryable with fresh timestamps.
    #[error("transport error: {0}")]
    Transport(String),
    /// A peer error of a kind this build does not model.
    #[error("{original_type_name}: {description}")]
    Other {
        /// The original error type name, as reported by the peer.
        original_type_name: String,
        /// The human-readable description from the peer.
        description: String,
    },
}

impl PepError {
    /// The stable cross-platform name serialized with this error.
    pub fn original_type_name(&self) -> &str {
        match self {
            PepError::Signature(_) => "SignatureError",
            PepError::SignatureValidityPeriod(_) => "SignatureValidityPeriodError",
            PepError::TicketValidityPeriod(_) => "SignedTicket2ValidityPeriodError",
            PepError::InvalidProof(_) => "InvalidProof",
            PepError::AccessDenied(_) => "AccessDenied",
            PepError::Serialize(_) => "SerializeException",
            PepError::Transport(_) => "TransportError",
            PepError::Other {
                original_type_name, ..
            } => original_type_name,
        }
    }

    /// The human-readable description serialized with this error.
    pub fn description(&self) -> String {
        match self {
            PepError::Signature(d) | PepError::AccessDenied(d) | PepError::Transport(d) => {
                d.clone()
            }
            PepError::SignatureValidityPeriod(e) => e.0.clone(),
            PepError::TicketValidityPeriod(e) => e.0.clone(),
            PepError::InvalidProof(e) => e.0.clone(),
            PepError::Serialize(e) => e.to_string(),
            PepError::Other { description, .. } => description.clone(),
        }
    }

    /// Rebuild the precise kind from its wire form.
    pub fn reconstruct(original_type_name: &str, description: String) -> PepError {
        match original_type_name {
            "SignatureError" => PepError::Signature(description),
            "SignatureValidityPeriodError" => {
                PepError::SignatureValidityPeriod(SignatureValidityPeriodError(description))
            }
            "SignedTicket2ValidityPeriodError" => {
                PepError::TicketValidityPeriod(SignedTicket2ValidityPeriodError(description))
            }
            "InvalidProof" => PepError::InvalidProof(InvalidProof(description)),
            "AccessDenied" => PepError::AccessDenied(description),
            "SerializeException" => PepError::Serialize(SerializeError::Peer(description)),
            "TransportError" => PepError::Transport(description),
            other => PepError::Other {
                original_type_name: other.to_owned(),
                description,
            },
        }
    }

    /// May the caller retry the request unchanged (apart from re-signing)?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PepError::SignatureValidityPeriod(_) | PepError::Transport(_)
        )
    }
}

impl From<SignatureError> for PepError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::ValidityPeriod(inner) => PepError::SignatureValidityPeriod(inner),
            other => PepError::Signature(other.to_string()),
        }
    }
}

impl From<crate::rsk::RskError> for PepError {
    fn from(err: crate::rsk::RskError) -> Self {
        PepError::Other {
            original_type_name: "Error".to_owned(),
            description: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstruction_preserves_the_kind() {
        let original = PepError::SignatureValidityPeriod(SignatureValidityPeriodError(
            "too old".into(),
        ));
        let rebuilt =
            PepError::reconstruct(original.original_type_name(), original.description());
        assert!(matches!(rebuilt, PepError::SignatureValidityPeriod(_)));
        assert!(rebuilt.is_retryable());

        let rebuilt = PepError::reconstruct("InvalidProof", "leg 3".into());
        assert!(matches!(rebuilt, PepError::InvalidProof(_)));
        assert!(!rebuilt.is_retryable());
    }

    #[test]
    fn unknown_kinds_keep_their_tag() {
        let rebuilt = PepError::reconstruct("SomeFutureError", "what".into());
        match &rebuilt {
            PepError::Other {
                original_type_name, ..
            } => assert_eq!(original_type_name, "SomeFutureError"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
