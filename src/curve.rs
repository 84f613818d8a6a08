//! Curve algebra: scalars and points over the Ristretto group
//!
//! Thin newtypes around `curve25519-dalek` that pin down the encoding and
//! comparison rules the rest of the crate relies on:
//!
//! - **Packed encodings are 32 bytes** and must be canonical. Every
//!   deserializer here rejects non-canonical input; callers that require a
//!   non-neutral point (public keys, pseudonyms) use [`CurvePoint::from_packed_nonzero`].
//! - **Secret scalars compare in constant time.** `PartialEq` on
//!   [`CurveScalar`] goes through `subtle`; there is deliberately no `Ord`.
//! - **Hash-to-scalar / hash-to-point** take a 64-byte SHA-512 expansion of
//!   the input and reduce it, so neither is invertible.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoBasepointTable, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Errors raised while decoding curve elements from untrusted bytes.
#[derive(Debug, thiserror::Error)]
pub enum CurveError {
    /// Wrong byte length for a packed element.
    #[error("packed curve element must be {expected} bytes (got {actual})")]
    InvalidLength {
        /// The byte length required for this element.
        expected: usize,
        /// The byte length actually provided.
        actual: usize,
    },
    /// The scalar encoding is not fully reduced.
    #[error("non-canonical scalar encoding")]
    NonCanonicalScalar,
    /// The bytes do not decode to a group element.
    #[error("invalid point encoding")]
    InvalidPoint,
    /// The neutral element where a key or pseudonym is required.
    #[error("the neutral element is not allowed here")]
    ZeroPoint,
    /// A hex text form failed to decode.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

// ============================================================================
// CurveScalar
// ============================================================================

/// An element of the Ristretto scalar field. Generally secret.
#[derive(Clone, Copy, Default)]
pub struct CurveScalar(Scalar);

impl CurveScalar {
    /// Size of the packed little-endian encoding.
    pub const PACKED_BYTES: usize = 32;

    /// The zero scalar.
    pub fn zero() -> Self {
        CurveScalar(Scalar::ZERO)
    }

    /// The one scalar.
    pub fn one() -> Self {
        CurveScalar(Scalar::ONE)
    }

    /// Sample a uniformly random scalar.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        CurveScalar(Scalar::random(rng))
    }

    /// Reduce 64 uniform bytes to a scalar.
    pub fn from_64_bytes(bytes: &[u8; 64]) -> Self {
        CurveScalar(Scalar::from_bytes_mod_order_wide(bytes))
    }

    /// Derive a scalar by hashing some data (SHA-512, wide reduction).
    pub fn hash(data: &[u8]) -> Self {
        let digest: [u8; 64] = Sha512::digest(data).into();
        Self::from_64_bytes(&digest)
    }

    /// Parse a packed scalar, rejecting non-canonical encodings.
    pub fn from_packed(packed: &[u8]) -> Result<Self, CurveError> {
        let bytes: [u8; Self::PACKED_BYTES] =
            packed.try_into().map_err(|_| CurveError::InvalidLength {
                expected: Self::PACKED_BYTES,
                actual: packed.len(),
            })?;
        Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes))
            .map(CurveScalar)
            .ok_or(CurveError::NonCanonicalScalar)
    }

    /// Packed little-endian encoding.
    pub fn pack(&self) -> [u8; Self::PACKED_BYTES] {
        self.0.to_bytes()
    }

    /// Hex form of the packed encoding.
    pub fn text(&self) -> String {
        hex::encode(self.pack())
    }

    /// Parse the hex form produced by [`CurveScalar::text`].
    pub fn from_text(text: &str) -> Result<Self, CurveError> {
        Self::from_packed(&hex::decode(text)?)
    }

    /// Multiplicative inverse. The inverse of zero is zero; callers must not
    /// rely on inverting a zero scalar.
    pub fn invert(&self) -> Self {
        CurveScalar(self.0.invert())
    }

    /// `self * self`.
    pub fn square(&self) -> Self {
        CurveScalar(self.0 * self.0)
    }
}

impl PartialEq for CurveScalar {
    fn eq(&self, other: &Self) -> bool {
        // Scalars are usually secret: compare in constant time.
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for CurveScalar {}

impl fmt::Debug for CurveScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the value; scalars are generally secret.
        f.write_str("CurveScalar(<secret>)")
    }
}

impl Zeroize for CurveScalar {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Add for CurveScalar {
    type Output = CurveScalar;
    fn add(self, rhs: CurveScalar) -> CurveScalar {
        CurveScalar(self.0 + rhs.0)
    }
}

impl Sub for CurveScalar {
    type Output = CurveScalar;
    fn sub(self, rhs: CurveScalar) -> CurveScalar {
        CurveScalar(self.0 - rhs.0)
    }
}

impl Mul for CurveScalar {
    type Output = CurveScalar;
    fn mul(self, rhs: CurveScalar) -> CurveScalar {
        CurveScalar(self.0 * rhs.0)
    }
}

impl Neg for CurveScalar {
    type Output = CurveScalar;
    fn neg(self) -> CurveScalar {
        CurveScalar(-self.0)
    }
}

// ============================================================================
// CurvePoint
// ============================================================================

/// A point on the Ristretto curve.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CurvePoint(RistrettoPoint);

impl CurvePoint {
    /// Size of the packed compressed encoding.
    pub const PACKED_BYTES: usize = 32;

    /// The neutral element.
    pub fn zero() -> Self {
        CurvePoint(RistrettoPoint::identity())
    }

    /// The group base point.
    pub fn base() -> Self {
        CurvePoint(RISTRETTO_BASEPOINT_POINT)
    }

    /// `s * G`.
    pub fn base_mult(s: &CurveScalar) -> Self {
        CurvePoint(RistrettoPoint::mul_base(&s.0))
    }

    /// `s * self`.
    pub fn mult(&self, s: &CurveScalar) -> Self {
        CurvePoint(self.0 * s.0)
    }

    /// Derive a point by hashing some data (SHA-512, uniform expansion).
    pub fn hash(data: &[u8]) -> Self {
        let digest: [u8; 64] = Sha512::digest(data).into();
        CurvePoint(RistrettoPoint::from_uniform_bytes(&digest))
    }

    /// Sample a uniformly random point.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 64];
        rng.fill_bytes(&mut bytes);
        CurvePoint(RistrettoPoint::from_uniform_bytes(&bytes))
    }

    /// Parse a packed point, rejecting non-canonical encodings. The neutral
    /// element is accepted; use [`CurvePoint::from_packed_nonzero`] where the
    /// point acts as a public key or pseudonym.
    pub fn from_packed(packed: &[u8]) -> Result<Self, CurveError> {
        let bytes: [u8; Self::PACKED_BYTES] =
            packed.try_into().map_err(|_| CurveError::InvalidLength {
                expected: Self::PACKED_BYTES,
                actual: packed.len(),
            })?;
        CompressedRistretto(bytes)
            .decompress()
            .map(CurvePoint)
            .ok_or(CurveError::InvalidPoint)
    }

    /// Parse a packed point, additionally rejecting the neutral element.
    pub fn from_packed_nonzero(packed: &[u8]) -> Result<Self, CurveError> {
        let point = Self::from_packed(packed)?;
        if point.is_zero() {
            return Err(CurveError::ZeroPoint);
        }
        Ok(point)
    }

    /// Packed compressed encoding.
    pub fn pack(&self) -> [u8; Self::PACKED_BYTES] {
        self.0.compress().to_bytes()
    }

    /// Hex form of the packed encoding.
    pub fn text(&self) -> String {
        hex::encode(self.pack())
    }

    /// Parse the hex form produced by [`CurvePoint::text`].
    pub fn from_text(text: &str) -> Result<Self, CurveError> {
        Self::from_packed(&hex::decode(text)?)
    }

    /// Is this the neutral element?
    pub fn is_zero(&self) -> bool {
        self.0 == RistrettoPoint::identity()
    }

    /// Build a precomputed table for repeated multiplications by this point.
    pub fn scalar_mult_table(&self) -> ScalarMultTable {
        ScalarMultTable(RistrettoBasepointTable::create(&self.0))
    }
}

impl fmt::Debug for CurvePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurvePoint({})", self.text())
    }
}

/// Precomputed radix table for repeated scalar multiplications by one point.
pub struct ScalarMultTable(RistrettoBasepointTable);

impl ScalarMultTable {
    /// `s * P` where `P` is the point the table was built for.
    pub fn mult(&self, s: &CurveScalar) -> CurvePoint {
        CurvePoint(&self.0 * &s.0)
    }
}

impl Add for CurvePoint {
    type Output = CurvePoint;
    fn add(self, rhs: CurvePoint) -> CurvePoint {
        CurvePoint(self.0 + rhs.0)
    }
}

impl Sub for CurvePoint {
    type Output = CurvePoint;
    fn sub(self, rhs: CurvePoint) -> CurvePoint {
        CurvePoint(self.0 - rhs.0)
    }
}

impl Neg for CurvePoint {
    type Output = CurvePoint;
    fn neg(self) -> CurvePoint {
        CurvePoint(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn packed_round_trip() {
        let mut rng = OsRng;
        let s = CurveScalar::random(&mut rng);
        assert_eq!(CurveScalar::from_packed(&s.pack()).unwrap(), s);
        let p = CurvePoint::random(&mut rng);
        assert_eq!(CurvePoint::from_packed(&p.pack()).unwrap(), p);
    }

    #[test]
    fn rejects_bad_lengths() {
        assert!(matches!(
            CurveScalar::from_packed(&[0u8; 31]),
            Err(CurveError::InvalidLength { .. })
        ));
        assert!(matches!(
            CurvePoint::from_packed(&[0u8; 33]),
            Err(CurveError::InvalidLength { .. })
        ));
    }

    #[test]
    fn rejects_non_canonical_scalar() {
        // The group order itself is a non-canonical encoding.
        let ell: [u8; 32] = [
            0xed, 0xd3, 0xf5, 0x5c, 0x1a, 0x63, 0x12, 0x58, 0xd6, 0x9c, 0xf7, 0xa2, 0xde, 0xf9,
            0xde, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x10,
        ];
        assert!(matches!(
            CurveScalar::from_packed(&ell),
            Err(CurveError::NonCanonicalScalar)
        ));
    }

    #[test]
    fn rejects_invalid_point() {
        let mut bytes = [0xffu8; 32];
        assert!(CurvePoint::from_packed(&bytes).is_err());
        bytes = [0u8; 32];
        // All-zero bytes decode to the neutral element, which the nonzero
        // parser must refuse.
        assert!(CurvePoint::from_packed(&bytes).is_ok());
        assert!(matches!(
            CurvePoint::from_packed_nonzero(&bytes),
            Err(CurveError::ZeroPoint)
        ));
    }

    #[test]
    fn scalar_algebra() {
        let mut rng = OsRng;
        let a = CurveScalar::random(&mut rng);
        let b = CurveScalar::random(&mut rng);
        assert_eq!(a + b - b, a);
        assert_eq!(a * a.invert(), CurveScalar::one());
        assert_eq!(a.square(), a * a);
    }

    #[test]
    fn point_algebra() {
        let mut rng = OsRng;
        let s = CurveScalar::random(&mut rng);
        let k = CurveScalar::random(&mut rng);
        let p = CurvePoint::base_mult(&s);
        assert_eq!(p, CurvePoint::base().mult(&s));
        assert_eq!(p.mult(&k), CurvePoint::base_mult(&(s * k)));
        assert_eq!(p - p, CurvePoint::zero());
    }

    #[test]
    fn hash_is_stable_and_spread() {
        assert_eq!(CurvePoint::hash(b"PEP0001"), CurvePoint::hash(b"PEP0001"));
        assert_ne!(CurvePoint::hash(b"PEP0001"), CurvePoint::hash(b"PEP0002"));
        assert_eq!(CurveScalar::hash(b"x"), CurveScalar::hash(b"x"));
        assert_ne!(CurveScalar::hash(b"x"), CurveScalar::hash(b"y"));
    }

    #[test]
    fn table_matches_direct_mult() {
        let mut rng = OsRng;
        let p = CurvePoint::random(&mut rng);
        let table = p.scalar_mult_table();
        for _ in 0..4 {
            let s = CurveScalar::random(&mut rng);
            assert_eq!(table.mult(&s), p.mult(&s));
        }
    }
}
