//! Configuration loading: translation keys, identities, leeway
//!
//! Key material arrives as hex strings under the exact option names the
//! deployment tooling writes. Parsing is strict: wrong-length hex is an
//! operator error and refuses to start the server, it never truncates or
//! pads. File-path options (`CACertificateFile`, identity files) are loaded
//! relative to the current working directory; resolving them against a
//! configuration base directory is the caller's concern.

#![allow(missing_docs)] // Option fields carry their deployment names via serde.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::certificate::{CertificateError, X509Identity, X509RootCertificates};
use crate::rsk::{KeyFactorSecret, MasterPrivateKeyShare};
use crate::signature::DEFAULT_TIMESTAMP_LEEWAY_SECONDS;
use crate::translator::{DataTranslationKeys, PseudonymTranslationKeys};

/// Configuration errors; all fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("option {key} has unexpected length (expected {expected} hex bytes)")]
    UnexpectedKeyLength { key: &'static str, expected: usize },
    #[error("option {key} is not valid hex: {source}")]
    InvalidHex {
        key: &'static str,
        source: hex::FromHexError,
    },
    #[error("option {key} holds an invalid scalar")]
    InvalidScalar { key: &'static str },
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error("configuration does not parse: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The core-relevant configuration options of a translating server.
#[derive(Clone, Debug, Deserialize)]
pub struct CoreConfig {
    #[serde(rename = "PseudonymsRekeyLocal")]
    pub pseudonyms_rekey_local: String,
    #[serde(rename = "PseudonymsReshuffleLocal")]
    pub pseudonyms_reshuffle_local: String,
    #[serde(rename = "MasterPrivateKeySharePseudonyms")]
    pub master_private_key_share_pseudonyms: String,
    #[serde(rename = "DataRekeyLocal")]
    pub data_rekey_local: String,
    #[serde(rename = "DataBlinding", default)]
    pub data_blinding: Option<String>,
    #[serde(rename = "MasterPrivateKeyShareData")]
    pub master_private_key_share_data: String,
    #[serde(rename = "CACertificateFile", default)]
    pub ca_certificate_file: Option<PathBuf>,
    #[serde(rename = "TLSPrivateKey", default)]
    pub tls_private_key: Option<PathBuf>,
    #[serde(rename = "TLSCertificateChain", default)]
    pub tls_certificate_chain: Option<PathBuf>,
    #[serde(rename = "PEPPrivateKey", default)]
    pub pep_private_key: Option<PathBuf>,
    #[serde(rename = "PEPCertificateChain", default)]
    pub pep_certificate_chain: Option<PathBuf>,
    #[serde(rename = "timestampLeeway", default = "default_leeway")]
    pub timestamp_leeway_seconds: u64,
}

fn default_leeway() -> u64 {
    DEFAULT_TIMESTAMP_LEEWAY_SECONDS
}

impl CoreConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

fn parse_key<const N: usize>(hex_str: &str, key: &'static str) -> Result<[u8; N], ConfigError> {
    let bytes = hex::decode(hex_str).map_err(|source| ConfigError::InvalidHex { key, source })?;
    bytes
        .try_into()
        .map_err(|_| ConfigError::UnexpectedKeyLength { key, expected: N })
}

fn parse_share(hex_str: &str, key: &'static str) -> Result<MasterPrivateKeyShare, ConfigError> {
    let bytes: [u8; 32] = parse_key(hex_str, key)?;
    MasterPrivateKeyShare::from_packed(&bytes).map_err(|_| ConfigError::InvalidScalar { key })
}

/// The pseudonym-domain key material of this server.
pub fn parse_pseudonym_translation_keys(
    config: &CoreConfig,
) -> Result<PseudonymTranslationKeys, ConfigError> {
    Ok(PseudonymTranslationKeys {
        encryption_key_factor_secret: KeyFactorSecret::new(parse_key(
            &config.pseudonyms_rekey_local,
            "PseudonymsRekeyLocal",
        )?),
        pseudonymization_key_factor_secret: KeyFactorSecret::new(parse_key(
            &config.pseudonyms_reshuffle_local,
            "PseudonymsReshuffleLocal",
        )?),
        master_private_encryption_key_share: parse_share(
            &config.master_private_key_share_pseudonyms,
            "MasterPrivateKeySharePseudonyms",
        )?,
    })
}

/// The data-domain key material of this server.
pub fn parse_data_translation_keys(
    config: &CoreConfig,
) -> Result<DataTranslationKeys, ConfigError> {
    Ok(DataTranslationKeys {
        encryption_key_factor_secret: KeyFactorSecret::new(parse_key(
            &config.data_rekey_local,
            "DataRekeyLocal",
        )?),
        blinding_key_secret: config
            .data_blinding
            .as_deref()
            .map(|hex_str| Ok::<_, ConfigError>(KeyFactorSecret::new(parse_key(hex_str, "DataBlinding")?)))
            .transpose()?,
        master_private_encryption_key_share: parse_share(
            &config.master_private_key_share_data,
            "MasterPrivateKeyShareData",
        )?,
    })
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })
}

/// Load the trusted root CAs from `CACertificateFile`.
pub fn load_root_certificates(path: &Path) -> Result<X509RootCertificates, ConfigError> {
    Ok(X509RootCertificates::from_pem(&read_file(path)?)?)
}

/// Load the message-signing identity from `PEPCertificateChain` and
/// `PEPPrivateKey`. The TLS identity is separate and not loaded here.
pub fn load_signing_identity(
    chain_path: &Path,
    key_path: &Path,
) -> Result<X509Identity, ConfigError> {
    Ok(X509Identity::from_pem(
        &read_file(chain_path)?,
        &read_file(key_path)?,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json(share: &str) -> String {
        format!(
            r#"{{
                "PseudonymsRekeyLocal": "{rekey}",
                "PseudonymsReshuffleLocal": "{reshuffle}",
                "MasterPrivateKeySharePseudonyms": "{share}",
                "DataRekeyLocal": "{rekey}",
                "MasterPrivateKeyShareData": "{share}",
                "timestampLeeway": 1800
            }}"#,
            rekey = "11".repeat(64),
            reshuffle = "22".repeat(64),
            share = share,
        )
    }

    #[test]
    fn parses_a_complete_configuration() {
        let config = CoreConfig::from_json(&sample_json(&"03".repeat(32))).unwrap();
        assert_eq!(config.timestamp_leeway_seconds, 1800);
        assert!(config.data_blinding.is_none());
        let keys = parse_pseudonym_translation_keys(&config).unwrap();
        let _ = crate::translator::PseudonymTranslator::new(keys);
        let keys = parse_data_translation_keys(&config).unwrap();
        let _ = crate::translator::DataTranslator::new(keys);
    }

    #[test]
    fn leeway_defaults_to_an_hour() {
        let json = format!(
            r#"{{
                "PseudonymsRekeyLocal": "{rekey}",
                "PseudonymsReshuffleLocal": "{rekey}",
                "MasterPrivateKeySharePseudonyms": "{share}",
                "DataRekeyLocal": "{rekey}",
                "MasterPrivateKeyShareData": "{share}"
            }}"#,
            rekey = "11".repeat(64),
            share = "03".repeat(32),
        );
        let config = CoreConfig::from_json(&json).unwrap();
        assert_eq!(config.timestamp_leeway_seconds, 3600);
    }

    #[test]
    fn wrong_length_keys_are_rejected() {
        let mut json = sample_json(&"03".repeat(32));
        json = json.replace(&"11".repeat(64), &"11".repeat(63));
        let config = CoreConfig::from_json(&json).unwrap();
        assert!(matches!(
            parse_pseudonym_translation_keys(&config),
            Err(ConfigError::UnexpectedKeyLength {
                key: "PseudonymsRekeyLocal",
                ..
            })
        ));
    }

    #[test]
    fn non_canonical_shares_are_rejected() {
        let config = CoreConfig::from_json(&sample_json(&"ff".repeat(32))).unwrap();
        assert!(matches!(
            parse_pseudonym_translation_keys(&config),
            Err(ConfigError::InvalidScalar { .. })
        ));
    }
}
