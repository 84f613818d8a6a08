//! X.509 certificates, chains and signing identities
//!
//! Certificates are held as DER bytes and parsed on demand with
//! `x509-parser`; nothing in this module keeps borrowed views alive across
//! calls. A [`X509CertificateChain`] is ordered leaf first. Chain validation
//! checks, in order: per-certificate validity windows, pairwise issuer links
//! (name match plus signature), and termination at one of the configured
//! [`X509RootCertificates`].
//!
//! The message-signing identity ([`X509Identity`]) is separate from the TLS
//! identity; both are loaded from PEM files named in the configuration.

use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::{SigningKey, VerifyingKey};
use x509_parser::certificate::X509Certificate as ParsedCertificate;
use x509_parser::prelude::{parse_x509_certificate, ASN1Time, Pem};

use crate::signature::Timestamp;

/// Errors raised while parsing or validating certificates.
#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    /// The DER bytes are not one well-formed certificate.
    #[error("certificate DER does not parse: {0}")]
    Malformed(String),
    /// The PEM wrapper is broken.
    #[error("invalid PEM: {0}")]
    InvalidPem(String),
    /// A chain or bundle without any certificate.
    #[error("certificate chain is empty")]
    EmptyChain,
    /// The subject carries no common name.
    #[error("certificate has no common name")]
    MissingCommonName,
    /// The subject public key is not an Ed25519 key.
    #[error("unsupported public key (expected Ed25519)")]
    UnsupportedPublicKey,
    /// A certificate's validity window is closed.
    #[error("certificate not valid at {0:?}")]
    OutsideValidityPeriod(Timestamp),
    /// Adjacent chain certificates do not link up.
    #[error("certificate {subject:?} is not signed by {issuer:?}")]
    BrokenLink {
        /// The subject of the certificate whose signature could not be verified.
        subject: String,
        /// The issuer that was expected to have signed it.
        issuer: String,
    },
    /// The chain does not reach any configured root.
    #[error("chain does not terminate at a trusted root")]
    UntrustedRoot,
    /// The private-key PEM/DER is malformed.
    #[error("private key does not parse: {0}")]
    MalformedPrivateKey(String),
    /// The private key does not belong to the leaf certificate.
    #[error("private key does not match the leaf certificate")]
    KeyMismatch,
}

/// A single certificate, stored as DER.
#[derive(Clone, PartialEq, Eq)]
pub struct X509Certificate {
    der: Vec<u8>,
}

impl X509Certificate {
    /// Wrap DER bytes, validating that they parse as one certificate.
    pub fn from_der(der: Vec<u8>) -> Result<Self, CertificateError> {
        let (rest, _) =
            parse_x509_certificate(&der).map_err(|e| CertificateError::Malformed(e.to_string()))?;
        if !rest.is_empty() {
            return Err(CertificateError::Malformed(
                "trailing bytes after certificate".into(),
            ));
        }
        Ok(X509Certificate { der })
    }

    /// Parse the first PEM block.
    pub fn from_pem(pem: &str) -> Result<Self, CertificateError> {
        let (_, parsed) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
            .map_err(|e| CertificateError::InvalidPem(e.to_string()))?;
        Self::from_der(parsed.contents)
    }

    /// The DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    fn parsed(&self) -> ParsedCertificate<'_> {
        // Validated in the constructor.
        parse_x509_certificate(&self.der)
            .expect("certificate re-parse cannot fail after construction")
            .1
    }

    /// The subject common name.
    pub fn common_name(&self) -> Result<String, CertificateError> {
        self.parsed()
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_owned)
            .ok_or(CertificateError::MissingCommonName)
    }

    /// The subject organizational unit, if present. Carries the user group
    /// for enrolled users.
    pub fn organizational_unit(&self) -> Option<String> {
        self.parsed()
            .subject()
            .iter_organizational_unit()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_owned)
    }

    /// The Ed25519 public key bound by this certificate.
    pub fn public_key(&self) -> Result<VerifyingKey, CertificateError> {
        let parsed = self.parsed();
        let data = parsed.public_key().subject_public_key.data.as_ref();
        let bytes: [u8; 32] = data
            .try_into()
            .map_err(|_| CertificateError::UnsupportedPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| CertificateError::UnsupportedPublicKey)
    }

    /// Is the validity window open at `at`?
    pub fn is_valid_at(&self, at: Timestamp) -> bool {
        match ASN1Time::from_timestamp(at.epoch_millis() / 1000) {
            Ok(time) => self.parsed().validity().is_valid_at(time),
            Err(_) => false,
        }
    }

    /// Does `issuer` link to this certificate (name match and signature)?
    pub fn is_signed_by(&self, issuer: &X509Certificate) -> bool {
        let subject = self.parsed();
        let issuer_parsed = issuer.parsed();
        if subject.issuer().as_raw() != issuer_parsed.subject().as_raw() {
            return false;
        }
        subject
            .verify_signature(Some(issuer_parsed.public_key()))
            .is_ok()
    }
}

impl std::fmt::Debug for X509Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "X509Certificate({})",
            self.common_name().unwrap_or_else(|_| "<no CN>".into())
        )
    }
}

/// An ordered certificate chain, leaf first.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct X509CertificateChain {
    certificates: Vec<X509Certificate>,
}

impl X509CertificateChain {
    /// Build from leaf-first certificates.
    pub fn new(certificates: Vec<X509Certificate>) -> Self {
        X509CertificateChain { certificates }
    }

    /// Parse a PEM bundle (leaf first).
    pub fn from_pem(pem: &str) -> Result<Self, CertificateError> {
        let mut certificates = Vec::new();
        for block in Pem::iter_from_buffer(pem.as_bytes()) {
            let block = block.map_err(|e| CertificateError::InvalidPem(e.to_string()))?;
            certificates.push(X509Certificate::from_der(block.contents)?);
        }
        if certificates.is_empty() {
            return Err(CertificateError::EmptyChain);
        }
        Ok(X509CertificateChain { certificates })
    }

    /// The leaf certificate.
    pub fn leaf(&self) -> Result<&X509Certificate, CertificateError> {
        self.certificates.first().ok_or(CertificateError::EmptyChain)
    }

    /// All certificates, leaf first.
    pub fn certificates(&self) -> &[X509Certificate] {
        &self.certificates
    }

    /// Validate the chain at time `at` against the trusted `roots`.
    pub fn validate(
        &self,
        roots: &X509RootCertificates,
        at: Timestamp,
    ) -> Result<(), CertificateError> {
        if self.certificates.is_empty() {
            return Err(CertificateError::EmptyChain);
        }
        for cert in &self.certificates {
            if !cert.is_valid_at(at) {
                return Err(CertificateError::OutsideValidityPeriod(at));
            }
        }
        for pair in self.certificates.windows(2) {
            if !pair[0].is_signed_by(&pair[1]) {
                return Err(CertificateError::BrokenLink {
                    subject: pair[0].common_name().unwrap_or_default(),
                    issuer: pair[1].common_name().unwrap_or_default(),
                });
            }
        }
        let last = self
            .certificates
            .last()
            .expect("chain checked non-empty above");
        let anchored = roots.certificates().iter().any(|root| {
            root == last || (root.is_valid_at(at) && last.is_signed_by(root))
        });
        if !anchored {
            return Err(CertificateError::UntrustedRoot);
        }
        Ok(())
    }
}

/// The set of trusted root CA certificates.
#[derive(Clone, Debug, Default)]
pub struct X509RootCertificates {
    roots: Vec<X509Certificate>,
}

impl X509RootCertificates {
    /// Build from root certificates.
    pub fn new(roots: Vec<X509Certificate>) -> Self {
        X509RootCertificates { roots }
    }

    /// Parse a PEM bundle of roots (the `CACertificateFile`).
    pub fn from_pem(pem: &str) -> Result<Self, CertificateError> {
        Ok(X509RootCertificates {
            roots: X509CertificateChain::from_pem(pem)?.certificates().to_vec(),
        })
    }

    /// The trusted roots.
    pub fn certificates(&self) -> &[X509Certificate] {
        &self.roots
    }
}

/// A message-signing identity: certificate chain plus matching private key.
pub struct X509Identity {
    certificate_chain: X509CertificateChain,
    private_key: SigningKey,
}

impl X509Identity {
    /// Build an identity, checking that the private key matches the leaf.
    pub fn new(
        certificate_chain: X509CertificateChain,
        private_key: SigningKey,
    ) -> Result<Self, CertificateError> {
        let leaf_key = certificate_chain.leaf()?.public_key()?;
        if leaf_key != private_key.verifying_key() {
            return Err(CertificateError::KeyMismatch);
        }
        Ok(X509Identity {
            certificate_chain,
            private_key,
        })
    }

    /// Load from PEM contents (`PEPCertificateChain`, `PEPPrivateKey`).
    pub fn from_pem(chain_pem: &str, key_pem: &str) -> Result<Self, CertificateError> {
        let chain = X509CertificateChain::from_pem(chain_pem)?;
        let key = SigningKey::from_pkcs8_pem(key_pem)
            .map_err(|e| CertificateError::MalformedPrivateKey(e.to_string()))?;
        Self::new(chain, key)
    }

    /// The certificate chain attached to every signature.
    pub fn certificate_chain(&self) -> &X509CertificateChain {
        &self.certificate_chain
    }

    /// The signing key.
    pub fn private_key(&self) -> &SigningKey {
        &self.private_key
    }
}

impl std::fmt::Debug for X509Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "X509Identity({:?})", self.certificate_chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestPki;

    #[test]
    fn chain_validates_against_its_root() {
        let pki = TestPki::new();
        let identity = pki.issue("AccessManager", None);
        identity
            .certificate_chain()
            .validate(pki.roots(), Timestamp::now())
            .unwrap();
    }

    #[test]
    fn chain_rejects_a_foreign_root() {
        let pki = TestPki::new();
        let other = TestPki::new();
        let identity = pki.issue("AccessManager", None);
        assert!(matches!(
            identity
                .certificate_chain()
                .validate(other.roots(), Timestamp::now()),
            Err(CertificateError::UntrustedRoot)
        ));
    }

    #[test]
    fn subject_attributes_are_exposed() {
        let pki = TestPki::new();
        let identity = pki.issue("Research Assessor", Some("Research Assessor"));
        let leaf = identity.certificate_chain().leaf().unwrap();
        assert_eq!(leaf.common_name().unwrap(), "Research Assessor");
        assert_eq!(
            leaf.organizational_unit().as_deref(),
            Some("Research Assessor")
        );
    }

    #[test]
    fn mismatched_private_key_is_rejected() {
        let pki = TestPki::new();
        let a = pki.issue("AccessManager", None);
        let b = pki.issue("Transcryptor", None);
        assert!(matches!(
            X509Identity::new(
                a.certificate_chain().clone(),
                b.private_key().clone(),
            ),
            Err(CertificateError::KeyMismatch)
        ));
    }
}
