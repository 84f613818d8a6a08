//! Key domains, per-recipient factor derivation and the RSK translator core
//!
//! Every translating server holds two 64-byte secrets (reshuffle and rekey)
//! per key domain plus a 32-byte master private key share. Per-recipient
//! factors are derived as
//!
//! ```text
//! factor(recipient) = reduce64( HMAC-SHA512( secret, domain_tag || recipient_bytes ) )
//! ```
//!
//! so factors are stable per recipient and known only to the holding server.
//! The pseudonym and data domains are separated by the 1-byte tag; the
//! reshuffle/rekey kinds are separated by which secret keys the HMAC.

use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use sha2::Sha512;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::curve::{CurveError, CurvePoint, CurveScalar};
use crate::egcache::EgCache;
use crate::elgamal::ElgamalEncryption;
use crate::proofs::{RskProof, RskVerifiers};

/// The two key domains. The discriminant is the HMAC domain tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyDomain {
    /// Pseudonym translation keys.
    Pseudonym = 0,
    /// Data (symmetric-key) translation keys.
    Data = 1,
}

/// Errors from the translator core.
#[derive(Debug, thiserror::Error)]
pub enum RskError {
    /// A reshuffle/blinding operation was requested while the corresponding
    /// secret is not configured. Operator or programmer error.
    #[error("reshuffle secret not set for this translator")]
    MissingReshuffleSecret,
}

/// A 64-byte HMAC secret for factor derivation. Never logged; zeroized on
/// drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyFactorSecret([u8; 64]);

impl KeyFactorSecret {
    /// Wrap 64 secret bytes.
    pub fn new(bytes: [u8; 64]) -> Self {
        KeyFactorSecret(bytes)
    }

    pub(crate) fn hmac_key(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for KeyFactorSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyFactorSecret(<secret>)")
    }
}

/// One server's 32-byte share of a domain's master private key.
#[derive(Clone)]
pub struct MasterPrivateKeyShare(CurveScalar);

impl MasterPrivateKeyShare {
    /// Parse a packed share, rejecting non-canonical encodings.
    pub fn from_packed(bytes: &[u8]) -> Result<Self, CurveError> {
        Ok(MasterPrivateKeyShare(CurveScalar::from_packed(bytes)?))
    }

    /// The share as a scalar.
    pub fn curve_scalar(&self) -> &CurveScalar {
        &self.0
    }
}

impl std::fmt::Debug for MasterPrivateKeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterPrivateKeyShare(<secret>)")
    }
}

/// A recipient for rekey-only factor derivation. The payload is the stable
/// recipient name (derived from the certificate subject upstream).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RekeyRecipient {
    /// Stable recipient name bytes.
    pub payload: Vec<u8>,
}

impl RekeyRecipient {
    /// Recipient from a stable name.
    pub fn from_name(name: &str) -> Self {
        RekeyRecipient {
            payload: name.as_bytes().to_vec(),
        }
    }
}

/// A recipient for combined reshuffle + rekey derivation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkRecipient {
    /// Stable recipient name bytes.
    pub payload: Vec<u8>,
}

impl SkRecipient {
    /// Recipient from a stable name.
    pub fn from_name(name: &str) -> Self {
        SkRecipient {
            payload: name.as_bytes().to_vec(),
        }
    }

    /// The rekey-only view of this recipient.
    pub fn rekey(&self) -> RekeyRecipient {
        RekeyRecipient {
            payload: self.payload.clone(),
        }
    }
}

/// The derived factor pair for one recipient.
#[derive(Clone, Copy)]
pub struct KeyFactors {
    /// Pseudonym-scaling factor `s`.
    pub reshuffle: CurveScalar,
    /// Key-translation factor `k`.
    pub rekey: CurveScalar,
}

/// Secrets held by one translator instance.
pub struct RskKeys {
    /// Which key domain these secrets belong to.
    pub domain: KeyDomain,
    /// Reshuffle (pseudonym domain) or blinding (data domain) secret.
    /// Optional: data translators without blinding support omit it.
    pub reshuffle: Option<KeyFactorSecret>,
    /// Rekey factor secret.
    pub rekey: KeyFactorSecret,
}

/// The translator core shared by the pseudonym and data translators.
pub struct RskTranslator {
    keys: RskKeys,
}

impl RskTranslator {
    /// Wrap the key material. Read-only afterwards.
    pub fn new(keys: RskKeys) -> Self {
        RskTranslator { keys }
    }

    /// The key material (secrets stay opaque).
    pub fn keys(&self) -> &RskKeys {
        &self.keys
    }

    /// HMAC-derive a scalar from `secret` for this translator's domain.
    pub(crate) fn derive_factor(&self, secret: &KeyFactorSecret, payload: &[u8]) -> CurveScalar {
        let mut mac = Hmac::<Sha512>::new_from_slice(secret.hmac_key())
            .expect("HMAC accepts any key length");
        mac.update(&[self.keys.domain as u8]);
        mac.update(payload);
        let digest: [u8; 64] = mac.finalize().into_bytes().into();
        CurveScalar::from_64_bytes(&digest)
    }

    /// The rekey factor for `recipient`.
    pub fn generate_key_factor(&self, recipient: &RekeyRecipient) -> CurveScalar {
        self.derive_factor(&self.keys.rekey, &recipient.payload)
    }

    /// Both factors for `recipient`.
    pub fn generate_key_factors(&self, recipient: &SkRecipient) -> Result<KeyFactors, RskError> {
        let reshuffle_secret = self
            .keys
            .reshuffle
            .as_ref()
            .ok_or(RskError::MissingReshuffleSecret)?;
        Ok(KeyFactors {
            reshuffle: self.derive_factor(reshuffle_secret, &recipient.payload),
            rekey: self.derive_factor(&self.keys.rekey, &recipient.payload),
        })
    }

    /// Reshuffle-Rekey with the given factors (cache-accelerated).
    pub fn rsk<R: RngCore + CryptoRng>(
        &self,
        eg: &ElgamalEncryption,
        factors: &KeyFactors,
        rng: &mut R,
    ) -> ElgamalEncryption {
        EgCache::global().rsk(eg, &factors.reshuffle, &factors.rekey, rng)
    }

    /// Rerandomize + rekey with the factor `k` (cache-accelerated).
    pub fn rk<R: RngCore + CryptoRng>(
        &self,
        eg: &ElgamalEncryption,
        k: &CurveScalar,
        rng: &mut R,
    ) -> ElgamalEncryption {
        EgCache::global().rk(eg, k, rng)
    }

    /// Plain ciphertext scaling (blinding); no rerandomization.
    pub fn rs(&self, eg: &ElgamalEncryption, s: &CurveScalar) -> ElgamalEncryption {
        eg.reshuffle(s)
    }

    /// Reshuffle-Rekey with an attached correctness proof.
    pub fn certified_rsk<R: RngCore + CryptoRng>(
        &self,
        eg: &ElgamalEncryption,
        factors: &KeyFactors,
        rng: &mut R,
    ) -> (ElgamalEncryption, RskProof) {
        RskProof::certified_rsk(eg, &factors.reshuffle, &factors.rekey, rng)
    }

    /// Public verifier points for translations to this recipient.
    pub fn compute_rsk_proof_verifiers(
        &self,
        factors: &KeyFactors,
        y: &CurvePoint,
    ) -> RskVerifiers {
        RskVerifiers::compute(&factors.reshuffle, &factors.rekey, y)
    }

    /// One server's contribution to a recipient's private key:
    /// `share * factor(recipient)`.
    pub fn generate_key_component(
        &self,
        factor: &CurveScalar,
        share: &MasterPrivateKeyShare,
    ) -> CurveScalar {
        *share.curve_scalar() * *factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn secret(byte: u8) -> KeyFactorSecret {
        KeyFactorSecret::new([byte; 64])
    }

    fn translator(domain: KeyDomain) -> RskTranslator {
        RskTranslator::new(RskKeys {
            domain,
            reshuffle: Some(secret(1)),
            rekey: secret(2),
        })
    }

    #[test]
    fn factors_are_stable_per_recipient() {
        let t = translator(KeyDomain::Pseudonym);
        let alice = SkRecipient::from_name("Research Assessor");
        let a = t.generate_key_factors(&alice).unwrap();
        let b = t.generate_key_factors(&alice).unwrap();
        assert_eq!(a.rekey, b.rekey);
        assert_eq!(a.reshuffle, b.reshuffle);

        let other = t
            .generate_key_factors(&SkRecipient::from_name("Data Administrator"))
            .unwrap();
        assert_ne!(a.rekey, other.rekey);
        assert_ne!(a.reshuffle, other.reshuffle);
    }

    #[test]
    fn domains_and_kinds_are_separated() {
        let pseudonym = translator(KeyDomain::Pseudonym);
        let data = translator(KeyDomain::Data);
        let recipient = SkRecipient::from_name("Research Assessor");
        let p = pseudonym.generate_key_factors(&recipient).unwrap();
        let d = data.generate_key_factors(&recipient).unwrap();
        assert_ne!(p.rekey, d.rekey);
        // Same payload through different secrets yields different kinds.
        assert_ne!(p.reshuffle, p.rekey);
    }

    #[test]
    fn missing_reshuffle_secret_is_an_error() {
        let t = RskTranslator::new(RskKeys {
            domain: KeyDomain::Data,
            reshuffle: None,
            rekey: secret(2),
        });
        assert!(matches!(
            t.generate_key_factors(&SkRecipient::from_name("x")),
            Err(RskError::MissingReshuffleSecret)
        ));
        // Rekey-only derivation still works.
        let _ = t.generate_key_factor(&RekeyRecipient::from_name("x"));
    }

    #[test]
    fn rsk_translates_like_the_raw_transform() {
        let mut rng = OsRng;
        let t = translator(KeyDomain::Pseudonym);
        let (sk, pk) = ElgamalEncryption::create_key_pair(&mut rng);
        let m = CurvePoint::random(&mut rng);
        let enc = ElgamalEncryption::new(&pk, &m, &mut rng);
        let factors = t
            .generate_key_factors(&SkRecipient::from_name("Research Assessor"))
            .unwrap();
        let out = t.rsk(&enc, &factors, &mut rng);
        assert_eq!(out.decrypt(&(factors.rekey * sk)), m.mult(&factors.reshuffle));
    }

    #[test]
    fn key_component_is_share_times_factor() {
        let mut rng = OsRng;
        let t = translator(KeyDomain::Data);
        let share_scalar = CurveScalar::random(&mut rng);
        let share = MasterPrivateKeyShare::from_packed(&share_scalar.pack()).unwrap();
        let factor = t.generate_key_factor(&RekeyRecipient::from_name("Research Assessor"));
        assert_eq!(t.generate_key_component(&factor, &share), share_scalar * factor);
    }
}
