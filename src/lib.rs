//! Crate root: public surface and protocol-wide invariants
//!
//! This crate is the cryptographic core of a polymorphic pseudonymization
//! system: research data is stored encrypted and pseudonymized such that no
//! single party can link a data subject's identifier to their data. Three
//! cooperating servers each perform one step of every key transformation and
//! prove in zero knowledge that they did so honestly; the client assembles
//! and verifies the result.
//!
//! ## Invariants
//!
//! - **Curve.** All group arithmetic is over the Ristretto group. Packed
//!   encodings are 32 bytes and must be canonical; every deserializer
//!   rejects non-canonical input, and the neutral element is rejected
//!   wherever a point acts as a public key or pseudonym.
//! - **Value semantics.** Ciphertext transforms always produce new values;
//!   there is no shared mutable pseudonym or ciphertext state. Translator
//!   key material is read-only after construction.
//! - **Signed everything.** Every protocol message travels in a signed
//!   envelope carrying an X.509 chain, a timestamp and a scheme tag. The
//!   configured leeway (one hour by default) doubles as the protocol
//!   timeout; stale signatures fail with a distinguishable error so clients
//!   can re-sign and retry.
//! - **Order.** The pseudonym order fixed by the Access Manager is the one
//!   ordering invariant visible across parties; every list output preserves
//!   its input order.
//! - **Errors.** Failures cross the wire as a closed taxonomy with a
//!   preserved type tag, so peers re-raise the precise kind.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Access Manager: policy gate, first translation step, ticket assembly.
pub mod accessmanager;
/// X.509 certificates, chains, root stores and signing identities.
pub mod certificate;
/// Client-side protocol driving and verification.
pub mod client;
/// Configuration loading for key material and identities.
pub mod config;
/// Scalars and points over the Ristretto group.
pub mod curve;
/// Process-wide cache for repeated ElGamal transforms.
pub mod egcache;
/// ElGamal triples and the rerandomize / rekey / reshuffle algebra.
pub mod elgamal;
/// The closed error taxonomy carried across the wire.
pub mod errors;
/// Key-component issuance and client-side key assembly.
pub mod keycomponents;
/// Mod97 check digits for human-typed short pseudonyms.
pub mod mod97;
/// Zero-knowledge proofs for certified translation steps.
pub mod proofs;
/// Pseudonym forms: local, encrypted-local, polymorphic.
pub mod pseudonyms;
/// Key domains, factor derivation and the RSK translator core.
pub mod rsk;
/// Message magics, wire framing and serialization machinery.
pub mod serialization;
/// Message signatures with certificate chains and timestamps.
pub mod signature;
/// The generic signed-message envelope.
pub mod signed;
/// Ticketing messages and their dual-signed envelopes.
pub mod ticketing;
/// Fiat–Shamir transcript for the proof protocols.
pub mod transcript;
/// The Transcryptor: second translation step, countersigning, audit.
pub mod transcryptor;
/// The pseudonym and data translators.
pub mod translator;
/// Protobuf wire bodies and conversions for every protocol message.
pub mod wire;

#[cfg(test)]
mod testutil;

// ============================================================================
// Canonical re-exports
// ============================================================================

pub use crate::curve::{CurvePoint, CurveScalar};
pub use crate::elgamal::{
    ElgamalEncryption, ElgamalPrivateKey, ElgamalPublicKey, ElgamalTranslationKey, EncryptedKey,
};
pub use crate::errors::PepError;
pub use crate::proofs::{InvalidProof, RskProof, RskVerifiers, ScalarMultProof};
pub use crate::pseudonyms::{
    EncryptedLocalPseudonym, EncryptedPseudonym, LocalPseudonym, PolymorphicPseudonym,
};
pub use crate::signature::{Signature, SignatureScheme, SignatureValidityPeriodError, Timestamp};
pub use crate::signed::{Certified, MessageSigner, Signed};
pub use crate::ticketing::{
    LocalPseudonyms, SignedTicket2, SignedTicketRequest2, Ticket2, TicketRequest2,
};
pub use crate::translator::{DataTranslator, PseudonymTranslator};
