//! Throwaway PKI for tests: one root CA minting leaf identities on demand.

use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::SigningKey;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, PKCS_ED25519,
};

use crate::certificate::{
    X509Certificate, X509CertificateChain, X509Identity, X509RootCertificates,
};

pub(crate) struct TestPki {
    roots: X509RootCertificates,
    ca_cert: rcgen::Certificate,
    ca_key: KeyPair,
}

impl TestPki {
    pub(crate) fn new() -> Self {
        let ca_key = KeyPair::generate_for(&PKCS_ED25519).expect("generate CA key");
        let mut params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, "PEP Test Root CA");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = params.self_signed(&ca_key).expect("self-sign CA");
        let roots = X509RootCertificates::new(vec![X509Certificate::from_der(
            ca_cert.der().as_ref().to_vec(),
        )
        .expect("CA DER parses")]);
        TestPki {
            roots,
            ca_cert,
            ca_key,
        }
    }

    pub(crate) fn roots(&self) -> &X509RootCertificates {
        &self.roots
    }

    /// Mint a leaf identity. The organizational unit carries the user group
    /// for enrolled users.
    pub(crate) fn issue(&self, common_name: &str, organizational_unit: Option<&str>) -> X509Identity {
        let key = KeyPair::generate_for(&PKCS_ED25519).expect("generate leaf key");
        let mut params = CertificateParams::new(Vec::<String>::new()).expect("leaf params");
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, common_name);
        if let Some(unit) = organizational_unit {
            params
                .distinguished_name
                .push(DnType::OrganizationalUnitName, unit);
        }
        let cert = params
            .signed_by(&key, &self.ca_cert, &self.ca_key)
            .expect("sign leaf");
        let signing_key =
            SigningKey::from_pkcs8_der(&key.serialize_der()).expect("leaf key re-parses");
        let chain = X509CertificateChain::new(vec![X509Certificate::from_der(
            cert.der().as_ref().to_vec(),
        )
        .expect("leaf DER parses")]);
        X509Identity::new(chain, signing_key).expect("key matches certificate")
    }
}
