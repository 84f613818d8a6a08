//! Pseudonym and data translators
//!
//! Each translating server wraps one [`RskTranslator`] per key domain:
//!
//! - [`PseudonymTranslator`] applies Reshuffle-Rekey to encrypted pseudonyms
//!   and can attach a correctness proof per step.
//! - [`DataTranslator`] applies Rekey (never Reshuffle: the plaintext is a
//!   symmetric key and scaling it would destroy it) plus optional blinding,
//!   a ciphertext scaling derived from per-object metadata. The Access
//!   Manager blinds at store time; the Storage Facility unblinds and rekeys
//!   at retrieve time; neither sees the plaintext key.
//!
//! Both translators also issue key components: `share * factor(recipient)`,
//! one multiplicand of the recipient's private key.

use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use sha2::Sha512;

use crate::curve::CurveScalar;
use crate::elgamal::{ElgamalEncryption, ElgamalPublicKey};
use crate::proofs::{InvalidProof, RskProof, RskVerifiers};
use crate::pseudonyms::{EncryptedLocalPseudonym, EncryptedPseudonym};
use crate::rsk::{
    KeyDomain, KeyFactorSecret, MasterPrivateKeyShare, RekeyRecipient, RskError, RskKeys,
    RskTranslator, SkRecipient,
};

/// Key material for a pseudonym translator.
pub struct PseudonymTranslationKeys {
    /// `PseudonymsRekeyLocal`: rekey factor secret.
    pub encryption_key_factor_secret: KeyFactorSecret,
    /// `PseudonymsReshuffleLocal`: reshuffle factor secret.
    pub pseudonymization_key_factor_secret: KeyFactorSecret,
    /// `MasterPrivateKeySharePseudonyms`: this server's master key share.
    pub master_private_encryption_key_share: MasterPrivateKeyShare,
}

/// Key material for a data translator.
pub struct DataTranslationKeys {
    /// `DataRekeyLocal`: rekey factor secret.
    pub encryption_key_factor_secret: KeyFactorSecret,
    /// `DataBlinding`: blinding secret; only the Access Manager and Storage
    /// Facility carry one.
    pub blinding_key_secret: Option<KeyFactorSecret>,
    /// `MasterPrivateKeyShareData`: this server's master key share.
    pub master_private_encryption_key_share: MasterPrivateKeyShare,
}

// ============================================================================
// PseudonymTranslator
// ============================================================================

/// Applies one RSK step to encrypted pseudonyms.
pub struct PseudonymTranslator {
    rsk: RskTranslator,
    master_private_encryption_key_share: MasterPrivateKeyShare,
}

impl PseudonymTranslator {
    /// Build from loaded key material.
    pub fn new(keys: PseudonymTranslationKeys) -> Self {
        PseudonymTranslator {
            rsk: RskTranslator::new(RskKeys {
                domain: KeyDomain::Pseudonym,
                reshuffle: Some(keys.pseudonymization_key_factor_secret),
                rekey: keys.encryption_key_factor_secret,
            }),
            master_private_encryption_key_share: keys.master_private_encryption_key_share,
        }
    }

    /// One translation step without proof.
    pub fn translate_step<R: RngCore + CryptoRng>(
        &self,
        pseudonym: &impl EncryptedPseudonym,
        recipient: &SkRecipient,
        rng: &mut R,
    ) -> Result<EncryptedLocalPseudonym, RskError> {
        let factors = self.rsk.generate_key_factors(recipient)?;
        Ok(EncryptedLocalPseudonym::new(self.rsk.rsk(
            pseudonym.encryption(),
            &factors,
            rng,
        )))
    }

    /// One translation step with a correctness proof.
    pub fn certified_translate_step<R: RngCore + CryptoRng>(
        &self,
        pseudonym: &impl EncryptedPseudonym,
        recipient: &SkRecipient,
        rng: &mut R,
    ) -> Result<(EncryptedLocalPseudonym, RskProof), RskError> {
        let factors = self.rsk.generate_key_factors(recipient)?;
        let (encryption, proof) = self.rsk.certified_rsk(pseudonym.encryption(), &factors, rng);
        Ok((EncryptedLocalPseudonym::new(encryption), proof))
    }

    /// Public verifier points for translations to `recipient`.
    /// `input_public_key` is the public key the incoming ciphertexts target:
    /// the master public key for a first step, the already-rekeyed key for a
    /// later step.
    pub fn compute_translation_proof_verifiers(
        &self,
        recipient: &SkRecipient,
        input_public_key: &ElgamalPublicKey,
    ) -> Result<RskVerifiers, RskError> {
        let factors = self.rsk.generate_key_factors(recipient)?;
        Ok(self
            .rsk
            .compute_rsk_proof_verifiers(&factors, input_public_key))
    }

    /// Check a translation proof produced by another party.
    pub fn check_translation_proof(
        &self,
        pre_translate: &impl EncryptedPseudonym,
        post_translate: &EncryptedLocalPseudonym,
        proof: &RskProof,
        verifiers: &RskVerifiers,
    ) -> Result<(), InvalidProof> {
        proof.verify(
            pre_translate.encryption(),
            post_translate.encryption(),
            verifiers,
        )
    }

    /// This server's pseudonym-key component for `recipient`.
    pub fn generate_key_component(&self, recipient: &RekeyRecipient) -> CurveScalar {
        self.rsk.generate_key_component(
            &self.rsk.generate_key_factor(recipient),
            &self.master_private_encryption_key_share,
        )
    }
}

// ============================================================================
// DataTranslator
// ============================================================================

enum BlindMode {
    Blind,
    Unblind,
}

/// Applies one rekey step (and optional blinding) to encrypted data keys.
pub struct DataTranslator {
    rsk: RskTranslator,
    master_private_encryption_key_share: MasterPrivateKeyShare,
}

impl DataTranslator {
    /// Build from loaded key material.
    pub fn new(keys: DataTranslationKeys) -> Self {
        DataTranslator {
            rsk: RskTranslator::new(RskKeys {
                domain: KeyDomain::Data,
                reshuffle: keys.blinding_key_secret,
                rekey: keys.encryption_key_factor_secret,
            }),
            master_private_encryption_key_share: keys.master_private_encryption_key_share,
        }
    }

    /// Derive the (un)blinding key for one object.
    ///
    /// Legacy behaviour inverted the unblinding key; the current behaviour
    /// inverts the blinding key instead. The per-object `invert_blind_key`
    /// flag selects which; callers read it from object metadata and must not
    /// guess.
    fn generate_blinding_key(
        &self,
        blind_mode: BlindMode,
        blind_add_data: &[u8],
        invert_blind_key: bool,
    ) -> Result<CurveScalar, RskError> {
        let secret = self
            .rsk
            .keys()
            .reshuffle
            .as_ref()
            .ok_or(RskError::MissingReshuffleSecret)?;
        let mut mac = Hmac::<Sha512>::new_from_slice(secret.hmac_key())
            .expect("HMAC accepts any key length");
        mac.update(blind_add_data);
        let digest: [u8; 64] = mac.finalize().into_bytes().into();
        let mut key = CurveScalar::from_64_bytes(&digest);
        if invert_blind_key == matches!(blind_mode, BlindMode::Blind) {
            key = key.invert();
        }
        Ok(key)
    }

    /// Blind an encrypted data key (Access Manager, store path).
    pub fn blind(
        &self,
        unblinded: &ElgamalEncryption,
        blind_add_data: &[u8],
        invert_blind_key: bool,
    ) -> Result<ElgamalEncryption, RskError> {
        let key = self.generate_blinding_key(BlindMode::Blind, blind_add_data, invert_blind_key)?;
        Ok(self.rsk.rs(unblinded, &key))
    }

    /// Unblind an encrypted data key and translate it to `recipient`
    /// (Storage Facility, retrieve path).
    pub fn unblind_and_translate<R: RngCore + CryptoRng>(
        &self,
        blinded: &ElgamalEncryption,
        blind_add_data: &[u8],
        invert_blind_key: bool,
        recipient: &RekeyRecipient,
        rng: &mut R,
    ) -> Result<ElgamalEncryption, RskError> {
        let unblind =
            self.generate_blinding_key(BlindMode::Unblind, blind_add_data, invert_blind_key)?;
        let factors = crate::rsk::KeyFactors {
            reshuffle: unblind,
            rekey: self.rsk.generate_key_factor(recipient),
        };
        Ok(self.rsk.rsk(blinded, &factors, rng))
    }

    /// One translation step without unblinding.
    pub fn translate_step<R: RngCore + CryptoRng>(
        &self,
        encrypted: &ElgamalEncryption,
        recipient: &RekeyRecipient,
        rng: &mut R,
    ) -> ElgamalEncryption {
        self.rsk
            .rk(encrypted, &self.rsk.generate_key_factor(recipient), rng)
    }

    /// This server's data-key component for `recipient`.
    pub fn generate_key_component(&self, recipient: &RekeyRecipient) -> CurveScalar {
        self.rsk.generate_key_component(
            &self.rsk.generate_key_factor(recipient),
            &self.master_private_encryption_key_share,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurvePoint;
    use crate::pseudonyms::PolymorphicPseudonym;
    use rand::rngs::OsRng;

    fn pseudonym_keys() -> PseudonymTranslationKeys {
        let mut rng = OsRng;
        PseudonymTranslationKeys {
            encryption_key_factor_secret: KeyFactorSecret::new([3; 64]),
            pseudonymization_key_factor_secret: KeyFactorSecret::new([4; 64]),
            master_private_encryption_key_share: MasterPrivateKeyShare::from_packed(
                &CurveScalar::random(&mut rng).pack(),
            )
            .unwrap(),
        }
    }

    fn data_keys(with_blinding: bool) -> DataTranslationKeys {
        let mut rng = OsRng;
        DataTranslationKeys {
            encryption_key_factor_secret: KeyFactorSecret::new([5; 64]),
            blinding_key_secret: with_blinding.then(|| KeyFactorSecret::new([6; 64])),
            master_private_encryption_key_share: MasterPrivateKeyShare::from_packed(
                &CurveScalar::random(&mut rng).pack(),
            )
            .unwrap(),
        }
    }

    #[test]
    fn certified_translation_verifies() {
        let mut rng = OsRng;
        let translator = PseudonymTranslator::new(pseudonym_keys());
        let (_, master_pk) = ElgamalEncryption::create_key_pair(&mut rng);
        let recipient = SkRecipient::from_name("Research Assessor");
        let pp = PolymorphicPseudonym::from_identifier(&master_pk, "PEP0001", &mut rng);

        let (translated, proof) = translator
            .certified_translate_step(&pp, &recipient, &mut rng)
            .unwrap();
        let verifiers = translator
            .compute_translation_proof_verifiers(&recipient, &master_pk)
            .unwrap();
        translator
            .check_translation_proof(&pp, &translated, &proof, &verifiers)
            .unwrap();
    }

    #[test]
    fn translation_moves_the_pseudonym_to_the_recipient_key() {
        let mut rng = OsRng;
        let translator = PseudonymTranslator::new(pseudonym_keys());
        let (master_sk, master_pk) = ElgamalEncryption::create_key_pair(&mut rng);
        let recipient = SkRecipient::from_name("Research Assessor");
        let pp = PolymorphicPseudonym::from_identifier(&master_pk, "PEP0001", &mut rng);
        let translated = translator.translate_step(&pp, &recipient, &mut rng).unwrap();

        // The recipient key is factor * master key; the plaintext is the
        // identifier point scaled by the reshuffle factor.
        let factor = translator
            .rsk
            .generate_key_factor(&recipient.rekey());
        let local = translated.decrypt(&(factor * master_sk));
        assert_ne!(*local.curve_point(), CurvePoint::hash(b"PEP0001"));

        // Two different recipients obtain unlinkable pseudonyms.
        let other = SkRecipient::from_name("Data Administrator");
        let translated_other = translator.translate_step(&pp, &other, &mut rng).unwrap();
        let other_factor = translator.rsk.generate_key_factor(&other.rekey());
        let local_other = translated_other.decrypt(&(other_factor * master_sk));
        assert_ne!(local, local_other);
    }

    #[test]
    fn blind_then_unblind_round_trips() {
        let mut rng = OsRng;
        let am = DataTranslator::new(data_keys(true));
        let sf = DataTranslator::new(data_keys(true));
        let (sk, pk) = ElgamalEncryption::create_key_pair(&mut rng);
        let data_key = CurvePoint::random(&mut rng);
        let encrypted = ElgamalEncryption::new(&pk, &data_key, &mut rng);
        let recipient = RekeyRecipient::from_name("Research Assessor");

        for invert_blind_key in [false, true] {
            let blinded = am.blind(&encrypted, b"column=WeightKg", invert_blind_key).unwrap();
            assert_ne!(blinded.decrypt(&sk), data_key);
            let translated = sf
                .unblind_and_translate(
                    &blinded,
                    b"column=WeightKg",
                    invert_blind_key,
                    &recipient,
                    &mut rng,
                )
                .unwrap();
            let factor = sf.rsk.generate_key_factor(&recipient);
            assert_eq!(translated.decrypt(&(factor * sk)), data_key);
        }
    }

    #[test]
    fn blinding_without_secret_is_a_logic_error() {
        let mut rng = OsRng;
        let translator = DataTranslator::new(data_keys(false));
        let (_, pk) = ElgamalEncryption::create_key_pair(&mut rng);
        let encrypted =
            ElgamalEncryption::new(&pk, &CurvePoint::random(&mut rng), &mut rng);
        assert!(matches!(
            translator.blind(&encrypted, b"meta", false),
            Err(RskError::MissingReshuffleSecret)
        ));
        // Plain translation still works without the blinding secret.
        let _ = translator.translate_step(
            &encrypted,
            &RekeyRecipient::from_name("Research Assessor"),
            &mut rng,
        );
    }

    #[test]
    fn key_component_recovers_the_recipient_key() {
        let mut rng = OsRng;
        let translator = DataTranslator::new(data_keys(true));
        let recipient = RekeyRecipient::from_name("Research Assessor");
        let component = translator.generate_key_component(&recipient);
        let factor = translator.rsk.generate_key_factor(&recipient);
        let share = translator.master_private_encryption_key_share.curve_scalar();
        assert_eq!(component, *share * factor);
    }
}
