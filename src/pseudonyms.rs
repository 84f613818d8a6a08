//! Pseudonym forms: local, encrypted-local, polymorphic
//!
//! One newtype per party view. A [`PolymorphicPseudonym`] is an ElGamal
//! encryption of `hash_to_point(subject_id)` under the master public key: it
//! looks different on every issuance but decrypts to the same point. The RSK
//! pipeline turns it into an [`EncryptedLocalPseudonym`] for one recipient,
//! which that recipient decrypts to its [`LocalPseudonym`]. Different
//! recipients see unlinkable local pseudonyms for the same subject.
//!
//! All deserializers reject the neutral element in the pseudonym and
//! public-key positions.

use rand::{CryptoRng, RngCore};

use crate::curve::{CurveError, CurvePoint};
use crate::elgamal::{ElgamalEncryption, ElgamalPrivateKey, ElgamalPublicKey};

/// A recipient-specific pseudonym point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalPseudonym(CurvePoint);

impl LocalPseudonym {
    /// Length of the hex text form.
    pub const TEXT_LENGTH: usize = CurvePoint::PACKED_BYTES * 2;

    /// Sample a random local pseudonym (test data, placeholder subjects).
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        LocalPseudonym(CurvePoint::random(rng))
    }

    /// Parse a packed point; the neutral element is not a pseudonym.
    pub fn from_packed(packed: &[u8]) -> Result<Self, CurveError> {
        Ok(LocalPseudonym(CurvePoint::from_packed_nonzero(packed)?))
    }

    /// Packed encoding.
    pub fn pack(&self) -> [u8; CurvePoint::PACKED_BYTES] {
        self.0.pack()
    }

    /// Hex text form.
    pub fn text(&self) -> String {
        self.0.text()
    }

    /// Parse the hex text form.
    pub fn from_text(text: &str) -> Result<Self, CurveError> {
        Self::from_packed(&hex::decode(text)?)
    }

    /// Encrypt for `pk`.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        pk: &ElgamalPublicKey,
        rng: &mut R,
    ) -> EncryptedLocalPseudonym {
        EncryptedLocalPseudonym(ElgamalEncryption::new(pk, &self.0, rng))
    }

    /// The underlying point.
    pub fn curve_point(&self) -> &CurvePoint {
        &self.0
    }
}

/// Common behaviour of the two encrypted pseudonym forms: the translators
/// accept either a polymorphic or a partially translated pseudonym.
pub trait EncryptedPseudonym {
    /// The underlying, well-formed ElGamal triple.
    fn encryption(&self) -> &ElgamalEncryption;
}

/// An encrypted recipient-specific pseudonym.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncryptedLocalPseudonym(ElgamalEncryption);

impl EncryptedLocalPseudonym {
    /// Length of the hex text form.
    pub const TEXT_LENGTH: usize = ElgamalEncryption::PACKED_BYTES * 2;

    /// Wrap a translated triple.
    pub fn new(encryption: ElgamalEncryption) -> Self {
        EncryptedLocalPseudonym(encryption)
    }

    /// Parse a packed triple (rejects a neutral public-key component).
    pub fn from_packed(packed: &[u8]) -> Result<Self, CurveError> {
        Ok(EncryptedLocalPseudonym(ElgamalEncryption::from_packed(
            packed,
        )?))
    }

    /// Packed encoding.
    pub fn pack(&self) -> [u8; ElgamalEncryption::PACKED_BYTES] {
        self.0.pack()
    }

    /// Hex text form.
    pub fn text(&self) -> String {
        self.0.text()
    }

    /// Parse the hex text form.
    pub fn from_text(text: &str) -> Result<Self, CurveError> {
        Self::from_packed(&hex::decode(text)?)
    }

    /// Decrypt with the recipient private key.
    pub fn decrypt(&self, sk: &ElgamalPrivateKey) -> LocalPseudonym {
        LocalPseudonym(self.0.decrypt(sk))
    }

    /// Fresh randomness, same pseudonym.
    pub fn rerandomize<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Self {
        EncryptedLocalPseudonym(self.0.rerandomize(rng))
    }
}

impl EncryptedPseudonym for EncryptedLocalPseudonym {
    fn encryption(&self) -> &ElgamalEncryption {
        &self.0
    }
}

/// A pseudonym encrypted under the master key, decrypting to
/// `hash_to_point(subject_id)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolymorphicPseudonym(ElgamalEncryption);

impl PolymorphicPseudonym {
    /// Length of the hex text form.
    pub const TEXT_LENGTH: usize = ElgamalEncryption::PACKED_BYTES * 2;

    /// Generate a polymorphic pseudonym for a subject identifier. Randomized:
    /// two calls with the same identifier are unequal but decrypt to the same
    /// point.
    pub fn from_identifier<R: RngCore + CryptoRng>(
        master_pk: &ElgamalPublicKey,
        identifier: &str,
        rng: &mut R,
    ) -> Self {
        let point = CurvePoint::hash(identifier.as_bytes());
        PolymorphicPseudonym(ElgamalEncryption::new(master_pk, &point, rng))
    }

    /// Wrap a triple already known to be polymorphic.
    pub fn new(encryption: ElgamalEncryption) -> Self {
        PolymorphicPseudonym(encryption)
    }

    /// Parse a packed triple (rejects a neutral public-key component).
    pub fn from_packed(packed: &[u8]) -> Result<Self, CurveError> {
        Ok(PolymorphicPseudonym(ElgamalEncryption::from_packed(packed)?))
    }

    /// Packed encoding.
    pub fn pack(&self) -> [u8; ElgamalEncryption::PACKED_BYTES] {
        self.0.pack()
    }

    /// Hex text form.
    pub fn text(&self) -> String {
        self.0.text()
    }

    /// Parse the hex text form.
    pub fn from_text(text: &str) -> Result<Self, CurveError> {
        Self::from_packed(&hex::decode(text)?)
    }
}

impl EncryptedPseudonym for PolymorphicPseudonym {
    fn encryption(&self) -> &ElgamalEncryption {
        &self.0
    }
}
