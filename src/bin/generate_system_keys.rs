//! Development generator for a coherent system key set.
//!
//! Emits JSON with fresh factor secrets and consistent per-server master-key
//! shares plus the derived master public keys, suitable for wiring up a
//! local test deployment. This is NOT a key ceremony; production key
//! material is generated and split under operational controls.

use anyhow::Result;
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::json;

use pep_core::curve::{CurvePoint, CurveScalar};

const SERVERS: [&str; 3] = ["AccessManager", "Transcryptor", "StorageFacility"];

fn random_secret_hex(rng: &mut OsRng) -> String {
    let mut bytes = [0u8; 64];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut rng = OsRng;

    // One share per server and domain; the master key is their product.
    let pseudonym_shares: Vec<CurveScalar> =
        SERVERS.iter().map(|_| CurveScalar::random(&mut rng)).collect();
    let data_shares: Vec<CurveScalar> =
        SERVERS.iter().map(|_| CurveScalar::random(&mut rng)).collect();
    let master = |shares: &[CurveScalar]| {
        shares
            .iter()
            .fold(CurveScalar::one(), |acc, share| acc * *share)
    };
    let master_pseudonym_key = master(&pseudonym_shares);
    let master_data_key = master(&data_shares);

    let servers: serde_json::Map<String, serde_json::Value> = SERVERS
        .iter()
        .enumerate()
        .map(|(i, name)| {
            (
                (*name).to_owned(),
                json!({
                    "PseudonymsRekeyLocal": random_secret_hex(&mut rng),
                    "PseudonymsReshuffleLocal": random_secret_hex(&mut rng),
                    "MasterPrivateKeySharePseudonyms": hex::encode(pseudonym_shares[i].pack()),
                    "DataRekeyLocal": random_secret_hex(&mut rng),
                    "DataBlinding": random_secret_hex(&mut rng),
                    "MasterPrivateKeyShareData": hex::encode(data_shares[i].pack()),
                }),
            )
        })
        .collect();

    let output = json!({
        "servers": servers,
        "MasterPublicKeyPseudonyms":
            hex::encode(CurvePoint::base_mult(&master_pseudonym_key).pack()),
        "MasterPublicKeyData": hex::encode(CurvePoint::base_mult(&master_data_key).pack()),
    });

    tracing::info!("generated key set for {} servers", SERVERS.len());
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
