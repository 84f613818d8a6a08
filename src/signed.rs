//! The signed-message envelope
//!
//! A [`Signed<T>`] carries the exact serialized bytes of `T` (magic
//! included) plus a [`Signature`] over those bytes. Keeping the bytes rather
//! than the message means signature verification covers what was actually
//! sent, and re-serialization differences can never invalidate a signature.
//!
//! Opening an envelope validates the signature first and only then
//! deserializes; [`Certified<T>`] pairs the message with its validated
//! signatory so handlers can base policy decisions on the sender's certified
//! subject.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::certificate::{X509Identity, X509RootCertificates};
use crate::errors::PepError;
use crate::serialization::{SerializeError, WireSerializable};
use crate::signature::{Signatory, Signature, Timestamp};

/// A deserialized message together with its validated sender.
#[derive(Debug)]
pub struct Certified<T> {
    /// The validated sender.
    pub signatory: Signatory,
    /// The deserialized message.
    pub message: T,
}

/// A serialized message and the signature covering exactly those bytes.
pub struct Signed<T> {
    /// The wire encoding of the message, magic included.
    pub data: Vec<u8>,
    /// The signature over `data`.
    pub signature: Signature,
    _message: PhantomData<fn() -> T>,
}

impl<T> Clone for Signed<T> {
    fn clone(&self) -> Self {
        Signed {
            data: self.data.clone(),
            signature: self.signature.clone(),
            _message: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Signed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signed")
            .field("data_len", &self.data.len())
            .field("signature", &self.signature)
            .finish()
    }
}

impl<T: WireSerializable> Signed<T> {
    /// Serialize and sign `message`.
    pub fn new(message: &T, identity: &X509Identity) -> Self {
        Self::new_at(message, identity, Timestamp::now())
    }

    /// Serialize and sign `message` with an explicit timestamp.
    pub fn new_at(message: &T, identity: &X509Identity, timestamp: Timestamp) -> Self {
        let data = message.to_wire();
        let signature = Signature::create_at(&data, identity, false, timestamp);
        Signed {
            data,
            signature,
            _message: PhantomData,
        }
    }

    /// Reassemble an envelope received from the wire.
    pub fn from_parts(data: Vec<u8>, signature: Signature) -> Self {
        Signed {
            data,
            signature,
            _message: PhantomData,
        }
    }

    /// Validate the signature and deserialize.
    pub fn open(
        &self,
        root_cas: &X509RootCertificates,
        expected_common_name: Option<&str>,
        timestamp_leeway_seconds: u64,
        now: Timestamp,
    ) -> Result<Certified<T>, PepError> {
        let signatory = self.signature.validate(
            &self.data,
            root_cas,
            expected_common_name,
            timestamp_leeway_seconds,
            false,
            now,
        )?;
        let message = T::from_wire(&self.data)?;
        Ok(Certified { signatory, message })
    }

    /// Deserialize without any signature check. For code paths that have
    /// already validated, or that only inspect their own outbound messages.
    pub fn open_without_checking_signature(&self) -> Result<T, SerializeError> {
        T::from_wire(&self.data)
    }
}

/// Holds the signing identity for a client or server and signs outbound
/// messages with it.
#[derive(Clone, Default)]
pub struct MessageSigner {
    signing_identity: Option<Arc<X509Identity>>,
}

impl MessageSigner {
    /// A signer with an identity already attached.
    pub fn new(signing_identity: Arc<X509Identity>) -> Self {
        MessageSigner {
            signing_identity: Some(signing_identity),
        }
    }

    /// Attach or replace the signing identity (set after enrollment).
    pub fn set_signing_identity(&mut self, signing_identity: Arc<X509Identity>) {
        self.signing_identity = Some(signing_identity);
    }

    /// The attached identity, or an error when none is set yet.
    pub fn signing_identity(&self) -> Result<&X509Identity, PepError> {
        self.signing_identity
            .as_deref()
            .ok_or_else(|| PepError::Signature("no signing identity set".into()))
    }

    /// Sign a message.
    pub fn sign<T: WireSerializable>(&self, message: &T) -> Result<Signed<T>, PepError> {
        Ok(Signed::new(message, self.signing_identity()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::DEFAULT_TIMESTAMP_LEEWAY_SECONDS;
    use crate::testutil::TestPki;

    /// A minimal message type for envelope tests.
    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Probe(String);

    impl WireSerializable for Probe {
        fn cross_platform_name() -> String {
            "Probe".into()
        }

        fn encode_body(&self) -> Vec<u8> {
            self.0.as_bytes().to_vec()
        }

        fn decode_body(bytes: &[u8]) -> Result<Self, SerializeError> {
            Ok(Probe(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| SerializeError::Invalid(e.to_string()))?,
            ))
        }
    }

    #[test]
    fn seal_then_open_round_trips() {
        let pki = TestPki::new();
        let identity = pki.issue("AccessManager", None);
        let signed = Signed::new(&Probe("hello".into()), &identity);
        let certified = signed
            .open(
                pki.roots(),
                Some("AccessManager"),
                DEFAULT_TIMESTAMP_LEEWAY_SECONDS,
                Timestamp::now(),
            )
            .unwrap();
        assert_eq!(certified.message, Probe("hello".into()));
        assert_eq!(certified.signatory.common_name(), "AccessManager");
    }

    #[test]
    fn open_past_leeway_raises_validity_period() {
        let pki = TestPki::new();
        let identity = pki.issue("AccessManager", None);
        let signed = Signed::new(&Probe("hello".into()), &identity);
        let result = signed.open(
            pki.roots(),
            None,
            DEFAULT_TIMESTAMP_LEEWAY_SECONDS,
            Timestamp::now().offset_seconds(61 * 60),
        );
        assert!(matches!(
            result,
            Err(PepError::SignatureValidityPeriod(_))
        ));
    }

    #[test]
    fn tampered_body_fails_to_open() {
        let pki = TestPki::new();
        let identity = pki.issue("AccessManager", None);
        let mut signed = Signed::new(&Probe("hello".into()), &identity);
        let last = signed.data.len() - 1;
        signed.data[last] ^= 1;
        assert!(matches!(
            signed.open(
                pki.roots(),
                None,
                DEFAULT_TIMESTAMP_LEEWAY_SECONDS,
                Timestamp::now(),
            ),
            Err(PepError::Signature(_))
        ));
    }

    #[test]
    fn signer_requires_an_identity() {
        let signer = MessageSigner::default();
        assert!(signer.sign(&Probe("hello".into())).is_err());
    }
}
