//! Message signatures with certificate chains, timestamps and leeway
//!
//! Every protocol message travels inside a signed envelope. A [`Signature`]
//! binds the serialized message bytes to an X.509-certified sender, a
//! timestamp and a scheme tag. Validation enforces, in this order:
//!
//! 1. the certificate chain terminates at a trusted root;
//! 2. the leaf common name matches the expected subject role, when one is
//!    supplied;
//! 3. the timestamp is within the configured leeway of the verifier's clock
//!    (failures raise the distinguishable [`SignatureValidityPeriodError`] so
//!    callers can re-sign and retry);
//! 4. the log-copy flag matches what the verifier expects;
//! 5. the raw signature verifies over exactly the covered bytes.
//!
//! Scheme V4 covers `data || timestamp || scheme || is_log_copy`; the legacy
//! V3 scheme covered the data bytes only and is still accepted on
//! validation, never produced.

use ed25519_dalek::{Signer, Verifier};

use crate::certificate::{
    CertificateError, X509CertificateChain, X509Identity, X509RootCertificates,
};

/// Default timestamp leeway, seconds.
pub const DEFAULT_TIMESTAMP_LEEWAY_SECONDS: u64 = 60 * 60;

/// Milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The current wall-clock time.
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp_millis())
    }

    /// Milliseconds since the epoch.
    pub fn epoch_millis(&self) -> i64 {
        self.0
    }

    /// `|self - other|` in whole seconds.
    pub fn abs_diff_seconds(&self, other: Timestamp) -> u64 {
        self.0.abs_diff(other.0) / 1000
    }

    /// Shift by a signed number of seconds (test clocks, expiry math).
    pub fn offset_seconds(&self, seconds: i64) -> Timestamp {
        Timestamp(self.0 + seconds * 1000)
    }
}

/// Signature scheme tags. Values are pinned by the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureScheme {
    /// Legacy: signature over the data bytes only.
    V3 = 2,
    /// Current: signature over data, timestamp, scheme and log-copy flag.
    V4 = 3,
}

impl TryFrom<i32> for SignatureScheme {
    type Error = UnknownSignatureScheme;

    fn try_from(value: i32) -> Result<Self, UnknownSignatureScheme> {
        match value {
            2 => Ok(SignatureScheme::V3),
            3 => Ok(SignatureScheme::V4),
            other => Err(UnknownSignatureScheme(other)),
        }
    }
}

/// An unrecognized scheme tag on the wire.
#[derive(Debug, thiserror::Error)]
#[error("unknown signature scheme {0}")]
pub struct UnknownSignatureScheme(pub i32);

/// Raised when a signature's timestamp falls outside the allowed leeway.
/// Distinguishable so clients can re-sign with a fresh timestamp and retry.
#[derive(Debug, thiserror::Error)]
#[error("signature validity period exceeded: {0}")]
pub struct SignatureValidityPeriodError(pub String);

/// Signature validation failures.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The certificate chain failed to validate.
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    /// The leaf common name is not the expected role.
    #[error("certificate subject {actual:?} does not match expected {expected:?}")]
    SubjectMismatch {
        /// The certificate subject that was expected.
        expected: String,
        /// The certificate subject that was actually present.
        actual: String,
    },
    /// Stale or future-dated timestamp.
    #[error(transparent)]
    ValidityPeriod(#[from] SignatureValidityPeriodError),
    /// Log-copy signature where a processing signature was expected, or
    /// vice versa.
    #[error("log-copy flag mismatch (expected {expected})")]
    LogCopyMismatch {
        /// The log-copy flag value that was expected.
        expected: bool,
    },
    /// The signature does not cover these bytes.
    #[error("signature does not verify")]
    Invalid,
    /// The raw signature bytes are not a signature.
    #[error("malformed signature bytes")]
    Malformed,
}

/// The validated sender of a signed message.
#[derive(Clone, Debug)]
pub struct Signatory {
    common_name: String,
    organizational_unit: Option<String>,
}

impl Signatory {
    /// The leaf certificate's common name (the sender's role or user id).
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// The leaf certificate's organizational unit (the user group).
    pub fn organizational_unit(&self) -> Option<&str> {
        self.organizational_unit.as_deref()
    }
}

/// A detached signature with its certificate chain and metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    /// Raw Ed25519 signature bytes.
    pub signature: Vec<u8>,
    /// The signer's chain, leaf first.
    pub certificate_chain: X509CertificateChain,
    /// Scheme tag.
    pub scheme: SignatureScheme,
    /// Signing time.
    pub timestamp: Timestamp,
    /// Marks signatures produced for the audit archive.
    pub is_log_copy: bool,
}

impl Signature {
    /// Sign `data` with the current wall-clock timestamp.
    pub fn create(data: &[u8], identity: &X509Identity, is_log_copy: bool) -> Signature {
        Self::create_at(data, identity, is_log_copy, Timestamp::now())
    }

    /// Sign `data` with an explicit timestamp.
    pub fn create_at(
        data: &[u8],
        identity: &X509Identity,
        is_log_copy: bool,
        timestamp: Timestamp,
    ) -> Signature {
        let scheme = SignatureScheme::V4;
        let payload = covered_bytes(data, scheme, timestamp, is_log_copy);
        let signature = identity.private_key().sign(&payload);
        Signature {
            signature: signature.to_bytes().to_vec(),
            certificate_chain: identity.certificate_chain().clone(),
            scheme,
            timestamp,
            is_log_copy,
        }
    }

    /// Validate this signature over `data` and return the signatory.
    pub fn validate(
        &self,
        data: &[u8],
        root_cas: &X509RootCertificates,
        expected_common_name: Option<&str>,
        timestamp_leeway_seconds: u64,
        expect_log_copy: bool,
        now: Timestamp,
    ) -> Result<Signatory, SignatureError> {
        self.certificate_chain.validate(root_cas, now)?;
        let leaf = self.certificate_chain.leaf()?;
        let common_name = leaf.common_name()?;
        if let Some(expected) = expected_common_name {
            if common_name != expected {
                return Err(SignatureError::SubjectMismatch {
                    expected: expected.to_owned(),
                    actual: common_name,
                });
            }
        }
        if now.abs_diff_seconds(self.timestamp) > timestamp_leeway_seconds {
            return Err(SignatureValidityPeriodError(format!(
                "signature from {:?} is outside the {}s leeway at {:?}",
                self.timestamp, timestamp_leeway_seconds, now
            ))
            .into());
        }
        if self.is_log_copy != expect_log_copy {
            return Err(SignatureError::LogCopyMismatch {
                expected: expect_log_copy,
            });
        }

        let payload = covered_bytes(data, self.scheme, self.timestamp, self.is_log_copy);
        let signature = ed25519_dalek::Signature::from_slice(&self.signature)
            .map_err(|_| SignatureError::Malformed)?;
        let key = leaf.public_key()?;
        key.verify(&payload, &signature)
            .map_err(|_| SignatureError::Invalid)?;
        Ok(Signatory {
            common_name,
            organizational_unit: leaf.organizational_unit(),
        })
    }
}

/// The exact bytes a signature covers under each scheme.
fn covered_bytes(
    data: &[u8],
    scheme: SignatureScheme,
    timestamp: Timestamp,
    is_log_copy: bool,
) -> Vec<u8> {
    match scheme {
        SignatureScheme::V3 => data.to_vec(),
        SignatureScheme::V4 => {
            let mut payload = Vec::with_capacity(data.len() + 10);
            payload.extend_from_slice(data);
            payload.extend_from_slice(&timestamp.epoch_millis().to_be_bytes());
            payload.push(scheme as u8);
            payload.push(u8::from(is_log_copy));
            payload
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestPki;

    #[test]
    fn round_trip_within_leeway() {
        let pki = TestPki::new();
        let identity = pki.issue("AccessManager", None);
        let signature = Signature::create(b"message", &identity, false);
        let signatory = signature
            .validate(
                b"message",
                pki.roots(),
                Some("AccessManager"),
                DEFAULT_TIMESTAMP_LEEWAY_SECONDS,
                false,
                Timestamp::now(),
            )
            .unwrap();
        assert_eq!(signatory.common_name(), "AccessManager");
    }

    #[test]
    fn tampered_data_fails() {
        let pki = TestPki::new();
        let identity = pki.issue("AccessManager", None);
        let signature = Signature::create(b"message", &identity, false);
        assert!(matches!(
            signature.validate(
                b"messagf",
                pki.roots(),
                None,
                DEFAULT_TIMESTAMP_LEEWAY_SECONDS,
                false,
                Timestamp::now(),
            ),
            Err(SignatureError::Invalid)
        ));
    }

    #[test]
    fn subject_mismatch_fails() {
        let pki = TestPki::new();
        let identity = pki.issue("Transcryptor", None);
        let signature = Signature::create(b"message", &identity, false);
        assert!(matches!(
            signature.validate(
                b"message",
                pki.roots(),
                Some("AccessManager"),
                DEFAULT_TIMESTAMP_LEEWAY_SECONDS,
                false,
                Timestamp::now(),
            ),
            Err(SignatureError::SubjectMismatch { .. })
        ));
    }

    #[test]
    fn stale_timestamp_raises_the_validity_error() {
        let pki = TestPki::new();
        let identity = pki.issue("AccessManager", None);
        let signature = Signature::create(b"message", &identity, false);
        let sixty_one_minutes_later = Timestamp::now().offset_seconds(61 * 60);
        assert!(matches!(
            signature.validate(
                b"message",
                pki.roots(),
                None,
                DEFAULT_TIMESTAMP_LEEWAY_SECONDS,
                false,
                sixty_one_minutes_later,
            ),
            Err(SignatureError::ValidityPeriod(_))
        ));
    }

    #[test]
    fn log_copy_flag_must_match() {
        let pki = TestPki::new();
        let identity = pki.issue("AccessManager", None);
        let signature = Signature::create(b"message", &identity, true);
        assert!(matches!(
            signature.validate(
                b"message",
                pki.roots(),
                None,
                DEFAULT_TIMESTAMP_LEEWAY_SECONDS,
                false,
                Timestamp::now(),
            ),
            Err(SignatureError::LogCopyMismatch { .. })
        ));
        signature
            .validate(
                b"message",
                pki.roots(),
                None,
                DEFAULT_TIMESTAMP_LEEWAY_SECONDS,
                true,
                Timestamp::now(),
            )
            .unwrap();
    }
}
