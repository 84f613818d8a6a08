//! Key-component issuance and client-side key assembly (enrollment)
//!
//! Clients never receive a recipient private key from anyone. Each server
//! holding a master-key share answers a signed [`KeyComponentRequest`] with
//! its component `share * factor(recipient)`; the client multiplies the
//! components from all servers and obtains `factor(recipient) *
//! master_private_key`. That is the only moment the decryption key exists, and it
//! happens on the client.
//!
//! The request body is empty: the requester's validated certificate *is* the
//! request, and the recipient name is derived from its subject (the
//! organizational unit for enrolled users, the common name for servers).

use crate::certificate::X509RootCertificates;
use crate::curve::CurveScalar;
use crate::elgamal::ElgamalPrivateKey;
use crate::errors::PepError;
use crate::rsk::RekeyRecipient;
use crate::signature::Timestamp;
use crate::signed::Signed;
use crate::translator::{DataTranslator, PseudonymTranslator};

/// Enrollment scheme tags. Values are pinned by the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnrollmentScheme {
    /// Deprecated: derived keys from the protobuf serialization of the user
    /// certificate, which is not guaranteed stable.
    V1 = 0,
    /// Current: derives keys from the certificate subject.
    V2 = 1,
}

impl EnrollmentScheme {
    /// The scheme new enrollments use.
    pub const CURRENT: EnrollmentScheme = EnrollmentScheme::V2;
}

/// The (empty) request for key components.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct KeyComponentRequest {}

/// A signed key-component request.
pub type SignedKeyComponentRequest = Signed<KeyComponentRequest>;

/// One server's key components for the requesting recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyComponentResponse {
    /// Component of the pseudonym decryption key.
    pub pseudonym_key_component: CurveScalar,
    /// Component of the data decryption key.
    pub encryption_key_component: CurveScalar,
}

impl KeyComponentResponse {
    /// Validate the requester and derive this server's components.
    pub fn handle_request(
        request: &SignedKeyComponentRequest,
        pseudonym_translator: &PseudonymTranslator,
        data_translator: &DataTranslator,
        root_cas: &X509RootCertificates,
        timestamp_leeway_seconds: u64,
        now: Timestamp,
    ) -> Result<KeyComponentResponse, PepError> {
        let certified = request.open(root_cas, None, timestamp_leeway_seconds, now)?;
        let recipient = recipient_of(&certified.signatory);
        Ok(KeyComponentResponse {
            pseudonym_key_component: pseudonym_translator.generate_key_component(&recipient),
            encryption_key_component: data_translator.generate_key_component(&recipient),
        })
    }
}

/// The stable recipient name behind a validated signatory: the user group
/// for enrolled users, the common name for servers.
pub fn recipient_of(signatory: &crate::signature::Signatory) -> RekeyRecipient {
    match signatory.organizational_unit() {
        Some(group) => RekeyRecipient::from_name(group),
        None => RekeyRecipient::from_name(signatory.common_name()),
    }
}

/// Multiply the key components from all servers into the recipient private
/// key.
pub fn assemble_private_key(components: &[CurveScalar]) -> ElgamalPrivateKey {
    components
        .iter()
        .fold(CurveScalar::one(), |acc, component| acc * *component)
}
