//! Zero-knowledge proofs for certified translation steps
//!
//! Two proof objects are exchanged by the protocol:
//!
//! - [`ScalarMultProof`]: a Schnorr-style proof of discrete-log equality.
//!   For a public triple `(A, M, N)` it shows knowledge of `x` with
//!   `A = x*G` and `N = x*M`, without revealing `x`.
//! - [`RskProof`]: a composition of six such legs showing that an output
//!   ciphertext is the Reshuffle-Rekey of an input ciphertext with the
//!   factors bound by the announced [`RskVerifiers`].
//!
//! The verifier points for a recipient are `(s*G, k*G, k⁻¹*y)`; they depend
//! only on the recipient's factors and the input public key, so a verifying
//! party computes them once and reuses them for every translation by the same
//! recipient.

use rand::{CryptoRng, RngCore};

use crate::curve::{CurvePoint, CurveScalar};
use crate::elgamal::ElgamalEncryption;
use crate::transcript::{FsLabel, Transcript};

/// Raised when a proof fails to verify. Indicates a malicious or buggy peer;
/// never retried.
#[derive(Debug, thiserror::Error)]
#[error("invalid proof: {0}")]
pub struct InvalidProof(pub String);

// ============================================================================
// ScalarMultProof
// ============================================================================

/// Schnorr-style proof that `N = x*M` for the `x` with `A = x*G`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScalarMultProof {
    /// Commitment `w*G`.
    pub commitment_base: CurvePoint,
    /// Commitment `w*M`.
    pub commitment_mult: CurvePoint,
    /// Response `z = w + challenge * x`.
    pub response: CurveScalar,
}

impl ScalarMultProof {
    /// Size of the packed encoding: two points and one scalar.
    pub const PACKED_BYTES: usize = CurvePoint::PACKED_BYTES * 2 + CurveScalar::PACKED_BYTES;

    /// Prove `n = x*m`, with `a = x*G` as the public anchor for `x`.
    pub fn create<R: RngCore + CryptoRng>(
        a: &CurvePoint,
        m: &CurvePoint,
        n: &CurvePoint,
        x: &CurveScalar,
        rng: &mut R,
    ) -> Self {
        let w = CurveScalar::random(rng);
        let commitment_base = CurvePoint::base_mult(&w);
        let commitment_mult = m.mult(&w);
        let challenge = Self::challenge(a, m, n, &commitment_base, &commitment_mult);
        ScalarMultProof {
            commitment_base,
            commitment_mult,
            response: w + challenge * *x,
        }
    }

    /// Verify against the public triple `(a, m, n)`.
    pub fn verify(
        &self,
        a: &CurvePoint,
        m: &CurvePoint,
        n: &CurvePoint,
    ) -> Result<(), InvalidProof> {
        let challenge = Self::challenge(a, m, n, &self.commitment_base, &self.commitment_mult);
        if CurvePoint::base_mult(&self.response) != self.commitment_base + a.mult(&challenge) {
            return Err(InvalidProof("base-point equation does not hold".into()));
        }
        if m.mult(&self.response) != self.commitment_mult + n.mult(&challenge) {
            return Err(InvalidProof("multiplicand equation does not hold".into()));
        }
        Ok(())
    }

    fn challenge(
        a: &CurvePoint,
        m: &CurvePoint,
        n: &CurvePoint,
        t_base: &CurvePoint,
        t_mult: &CurvePoint,
    ) -> CurveScalar {
        let mut transcript = Transcript::new("scalar_mult_proof");
        transcript.absorb_point(FsLabel::BaseMult, a);
        transcript.absorb_point(FsLabel::Multiplicand, m);
        transcript.absorb_point(FsLabel::Product, n);
        transcript.absorb_point(FsLabel::CommitmentBase, t_base);
        transcript.absorb_point(FsLabel::CommitmentMultiplicand, t_mult);
        transcript.challenge_scalar(FsLabel::Challenge)
    }

    /// Packed encoding: `commitment_base || commitment_mult || response`.
    pub fn pack(&self) -> [u8; Self::PACKED_BYTES] {
        let mut out = [0u8; Self::PACKED_BYTES];
        out[..32].copy_from_slice(&self.commitment_base.pack());
        out[32..64].copy_from_slice(&self.commitment_mult.pack());
        out[64..].copy_from_slice(&self.response.pack());
        out
    }

    /// Parse a packed proof.
    pub fn from_packed(packed: &[u8]) -> Result<Self, crate::curve::CurveError> {
        if packed.len() != Self::PACKED_BYTES {
            return Err(crate::curve::CurveError::InvalidLength {
                expected: Self::PACKED_BYTES,
                actual: packed.len(),
            });
        }
        Ok(ScalarMultProof {
            commitment_base: CurvePoint::from_packed(&packed[..32])?,
            commitment_mult: CurvePoint::from_packed(&packed[32..64])?,
            response: CurveScalar::from_packed(&packed[64..])?,
        })
    }
}

// ============================================================================
// RSK verifiers and proof
// ============================================================================

/// Public anchor points for a recipient's translation factors.
///
/// Reusable for every translation by the same recipient against the same
/// input public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RskVerifiers {
    /// `s * G` for the reshuffle factor `s`.
    pub reshuffle: CurvePoint,
    /// `k * G` for the rekey factor `k`.
    pub rekey: CurvePoint,
    /// `k⁻¹ * y` for the input public key `y`.
    pub rekeyed_y: CurvePoint,
}

impl RskVerifiers {
    /// Size of the packed encoding: three packed points.
    pub const PACKED_BYTES: usize = CurvePoint::PACKED_BYTES * 3;

    /// Compute the verifier triple from the secret factors and the input
    /// public key. Only the party holding the factors can do this; everyone
    /// else receives the triple over an authenticated channel.
    pub fn compute(s: &CurveScalar, k: &CurveScalar, y: &CurvePoint) -> Self {
        RskVerifiers {
            reshuffle: CurvePoint::base_mult(s),
            rekey: CurvePoint::base_mult(k),
            rekeyed_y: y.mult(&k.invert()),
        }
    }

    /// Packed encoding: `reshuffle || rekey || rekeyed_y`.
    pub fn pack(&self) -> [u8; Self::PACKED_BYTES] {
        let mut out = [0u8; Self::PACKED_BYTES];
        out[..32].copy_from_slice(&self.reshuffle.pack());
        out[32..64].copy_from_slice(&self.rekey.pack());
        out[64..].copy_from_slice(&self.rekeyed_y.pack());
        out
    }

    /// Parse a packed triple.
    pub fn from_packed(packed: &[u8]) -> Result<Self, crate::curve::CurveError> {
        if packed.len() != Self::PACKED_BYTES {
            return Err(crate::curve::CurveError::InvalidLength {
                expected: Self::PACKED_BYTES,
                actual: packed.len(),
            });
        }
        Ok(RskVerifiers {
            reshuffle: CurvePoint::from_packed(&packed[..32])?,
            rekey: CurvePoint::from_packed(&packed[32..64])?,
            rekeyed_y: CurvePoint::from_packed(&packed[64..])?,
        })
    }
}

/// Proof that `post = RSK(pre, s, k)` for the `(s, k)` anchored by a
/// [`RskVerifiers`] triple.
///
/// The RSK decomposition `rerandomize(r)` → `reshuffle(s)` → `rekey(k)` is
/// proven leg by leg: the rerandomization commitments `(r*G, r*y)` and the
/// intermediate reshuffled point are carried in the proof, and six
/// [`ScalarMultProof`] legs tie every published point to the same `r`, `s`
/// and `k`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RskProof {
    /// `r * G` for the rerandomizer `r`.
    pub rerandomize_base: CurvePoint,
    /// `r * pre.y`.
    pub rerandomize_key: CurvePoint,
    /// `s * (pre.b + r*G)`, the reshuffled ephemeral component before rekey.
    pub reshuffled_b: CurvePoint,
    /// Same `r` behind both rerandomization points.
    pub rerandomize_proof: ScalarMultProof,
    /// `reshuffled_b` is the reshuffle of the rerandomized `b`.
    pub reshuffle_b_proof: ScalarMultProof,
    /// `post.c` is the reshuffle of the rerandomized `c`.
    pub reshuffle_c_proof: ScalarMultProof,
    /// `post.y = k * pre.y`.
    pub rekey_y_proof: ScalarMultProof,
    /// `reshuffled_b = k * post.b`.
    pub rekey_b_proof: ScalarMultProof,
    /// The announced `rekeyed_y` is `k⁻¹ * pre.y`.
    pub key_inverse_proof: ScalarMultProof,
}

impl RskProof {
    /// Perform a certified RSK step: compute the translated ciphertext and
    /// the proof in one pass (the proof needs the rerandomizer).
    pub fn certified_rsk<R: RngCore + CryptoRng>(
        pre: &ElgamalEncryption,
        s: &CurveScalar,
        k: &CurveScalar,
        rng: &mut R,
    ) -> (ElgamalEncryption, RskProof) {
        let r = CurveScalar::random(rng);
        let rerandomize_base = CurvePoint::base_mult(&r);
        let rerandomize_key = pre.y.mult(&r);
        let b1 = pre.b + rerandomize_base;
        let c1 = pre.c + rerandomize_key;
        let reshuffled_b = b1.mult(s);
        let post = ElgamalEncryption {
            b: reshuffled_b.mult(&k.invert()),
            c: c1.mult(s),
            y: pre.y.mult(k),
        };

        let verifiers = RskVerifiers::compute(s, k, &pre.y);
        let proof = RskProof {
            rerandomize_base,
            rerandomize_key,
            reshuffled_b,
            rerandomize_proof: ScalarMultProof::create(
                &rerandomize_base,
                &pre.y,
                &rerandomize_key,
                &r,
                rng,
            ),
            reshuffle_b_proof: ScalarMultProof::create(&verifiers.reshuffle, &b1, &reshuffled_b, s, rng),
            reshuffle_c_proof: ScalarMultProof::create(&verifiers.reshuffle, &c1, &post.c, s, rng),
            rekey_y_proof: ScalarMultProof::create(&verifiers.rekey, &pre.y, &post.y, k, rng),
            rekey_b_proof: ScalarMultProof::create(&verifiers.rekey, &post.b, &reshuffled_b, k, rng),
            key_inverse_proof: ScalarMultProof::create(
                &verifiers.rekey,
                &verifiers.rekeyed_y,
                &pre.y,
                k,
                rng,
            ),
        };
        (post, proof)
    }

    /// Verify that `post` is the RSK of `pre` under the factors anchored by
    /// `verifiers`.
    pub fn verify(
        &self,
        pre: &ElgamalEncryption,
        post: &ElgamalEncryption,
        verifiers: &RskVerifiers,
    ) -> Result<(), InvalidProof> {
        let b1 = pre.b + self.rerandomize_base;
        let c1 = pre.c + self.rerandomize_key;
        self.rerandomize_proof
            .verify(&self.rerandomize_base, &pre.y, &self.rerandomize_key)
            .map_err(|e| InvalidProof(format!("rerandomization: {e}")))?;
        self.reshuffle_b_proof
            .verify(&verifiers.reshuffle, &b1, &self.reshuffled_b)
            .map_err(|e| InvalidProof(format!("reshuffle of b: {e}")))?;
        self.reshuffle_c_proof
            .verify(&verifiers.reshuffle, &c1, &post.c)
            .map_err(|e| InvalidProof(format!("reshuffle of c: {e}")))?;
        self.rekey_y_proof
            .verify(&verifiers.rekey, &pre.y, &post.y)
            .map_err(|e| InvalidProof(format!("rekey of y: {e}")))?;
        self.rekey_b_proof
            .verify(&verifiers.rekey, &post.b, &self.reshuffled_b)
            .map_err(|e| InvalidProof(format!("rekey of b: {e}")))?;
        self.key_inverse_proof
            .verify(&verifiers.rekey, &verifiers.rekeyed_y, &pre.y)
            .map_err(|e| InvalidProof(format!("key inverse: {e}")))?;
        Ok(())
    }

    /// Size of the packed encoding: three points and six legs.
    pub const PACKED_BYTES: usize =
        CurvePoint::PACKED_BYTES * 3 + ScalarMultProof::PACKED_BYTES * 6;

    /// Packed encoding: the three carried points followed by the six legs.
    pub fn pack(&self) -> [u8; Self::PACKED_BYTES] {
        let mut out = [0u8; Self::PACKED_BYTES];
        out[..32].copy_from_slice(&self.rerandomize_base.pack());
        out[32..64].copy_from_slice(&self.rerandomize_key.pack());
        out[64..96].copy_from_slice(&self.reshuffled_b.pack());
        let legs = [
            &self.rerandomize_proof,
            &self.reshuffle_b_proof,
            &self.reshuffle_c_proof,
            &self.rekey_y_proof,
            &self.rekey_b_proof,
            &self.key_inverse_proof,
        ];
        for (i, leg) in legs.iter().enumerate() {
            let start = 96 + i * ScalarMultProof::PACKED_BYTES;
            out[start..start + ScalarMultProof::PACKED_BYTES].copy_from_slice(&leg.pack());
        }
        out
    }

    /// Parse a packed proof.
    pub fn from_packed(packed: &[u8]) -> Result<Self, crate::curve::CurveError> {
        if packed.len() != Self::PACKED_BYTES {
            return Err(crate::curve::CurveError::InvalidLength {
                expected: Self::PACKED_BYTES,
                actual: packed.len(),
            });
        }
        let leg = |i: usize| {
            let start = 96 + i * ScalarMultProof::PACKED_BYTES;
            ScalarMultProof::from_packed(&packed[start..start + ScalarMultProof::PACKED_BYTES])
        };
        Ok(RskProof {
            rerandomize_base: CurvePoint::from_packed(&packed[..32])?,
            rerandomize_key: CurvePoint::from_packed(&packed[32..64])?,
            reshuffled_b: CurvePoint::from_packed(&packed[64..96])?,
            rerandomize_proof: leg(0)?,
            reshuffle_b_proof: leg(1)?,
            reshuffle_c_proof: leg(2)?,
            rekey_y_proof: leg(3)?,
            rekey_b_proof: leg(4)?,
            key_inverse_proof: leg(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn scalar_mult_proof_round_trip() {
        let mut rng = OsRng;
        for _ in 0..100 {
            let x = CurveScalar::random(&mut rng);
            let a = CurvePoint::base_mult(&x);
            let m = CurvePoint::random(&mut rng);
            let n = m.mult(&x);
            let proof = ScalarMultProof::create(&a, &m, &n, &x, &mut rng);
            proof.verify(&a, &m, &n).unwrap();
        }
    }

    #[test]
    fn scalar_mult_proof_rejects_swapped_arguments() {
        let mut rng = OsRng;
        let x = CurveScalar::random(&mut rng);
        let a = CurvePoint::base_mult(&x);
        let m = CurvePoint::random(&mut rng);
        let n = m.mult(&x);
        let proof = ScalarMultProof::create(&a, &m, &n, &x, &mut rng);
        assert!(proof.verify(&m, &a, &n).is_err());
        assert!(proof.verify(&m, &n, &a).is_err());
    }

    #[test]
    fn scalar_mult_proof_pack_round_trip() {
        let mut rng = OsRng;
        let x = CurveScalar::random(&mut rng);
        let a = CurvePoint::base_mult(&x);
        let m = CurvePoint::random(&mut rng);
        let n = m.mult(&x);
        let proof = ScalarMultProof::create(&a, &m, &n, &x, &mut rng);
        assert_eq!(ScalarMultProof::from_packed(&proof.pack()).unwrap(), proof);
    }

    #[test]
    fn rsk_proof_round_trip() {
        let mut rng = OsRng;
        for _ in 0..20 {
            let pre = ElgamalEncryption::from_components(
                CurvePoint::random(&mut rng),
                CurvePoint::random(&mut rng),
                CurvePoint::random(&mut rng),
            );
            let s = CurveScalar::random(&mut rng);
            let k = CurveScalar::random(&mut rng);
            let (post, proof) = RskProof::certified_rsk(&pre, &s, &k, &mut rng);
            proof
                .verify(&pre, &post, &RskVerifiers::compute(&s, &k, &pre.y))
                .unwrap();
        }
    }

    #[test]
    fn rsk_proof_output_decrypts_correctly() {
        let mut rng = OsRng;
        let (sk, pk) = ElgamalEncryption::create_key_pair(&mut rng);
        let m = CurvePoint::random(&mut rng);
        let enc = ElgamalEncryption::new(&pk, &m, &mut rng);
        let s = CurveScalar::random(&mut rng);
        let k = CurveScalar::random(&mut rng);
        let (post, _) = RskProof::certified_rsk(&enc, &s, &k, &mut rng);
        assert_eq!(post.decrypt(&(k * sk)), m.mult(&s));
    }

    #[test]
    fn rsk_proof_rejects_swapped_ciphertexts_and_wrong_verifiers() {
        let mut rng = OsRng;
        let pre = ElgamalEncryption::from_components(
            CurvePoint::random(&mut rng),
            CurvePoint::random(&mut rng),
            CurvePoint::random(&mut rng),
        );
        let s = CurveScalar::random(&mut rng);
        let k = CurveScalar::random(&mut rng);
        let (post, proof) = RskProof::certified_rsk(&pre, &s, &k, &mut rng);
        let verifiers = RskVerifiers::compute(&s, &k, &pre.y);
        assert!(proof.verify(&post, &pre, &verifiers).is_err());
        let swapped = RskVerifiers::compute(&k, &s, &pre.y);
        assert!(proof.verify(&pre, &post, &swapped).is_err());
    }
}
