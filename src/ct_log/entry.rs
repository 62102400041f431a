// src/ct_log/entry.rs
use base64::Engine;

use crate::error::Error;
use crate::record::EntryType;

/// Decoded MerkleTreeLeaf plus the issuer chain that accompanied it.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub kind: EntryType,
    /// Leaf timestamp in milliseconds since the epoch.
    pub timestamp: u64,
    /// DER of the end-entity certificate (or full pre-certificate).
    pub leaf_der: Vec<u8>,
    /// DER of each chain certificate, leaf-nearest first.
    pub chain_der: Vec<Vec<u8>>,
}

const X509_ENTRY: u16 = 0;
const PRECERT_ENTRY: u16 = 1;

/// Decode one get-entries element.
///
/// For x509 entries the certificate is embedded in `leaf_input` and
/// `extra_data` holds the chain. For precert entries the full
/// pre-certificate is taken from `extra_data` (more reliable than the TBS in
/// the leaf), followed by the chain.
pub fn parse_entry(leaf_input_b64: &str, extra_data_b64: &str) -> Result<ParsedEntry, Error> {
    let engine = &base64::engine::general_purpose::STANDARD;
    let leaf = engine
        .decode(leaf_input_b64)
        .map_err(|e| Error::LeafParse(format!("leaf_input is not valid base64: {}", e)))?;

    // MerkleTreeLeaf: version(1) leaf_type(1) timestamp(8) entry_type(2) ...
    if leaf.len() < 12 {
        return Err(Error::LeafParse(format!(
            "leaf_input too short: {} bytes",
            leaf.len()
        )));
    }
    let mut timestamp_bytes = [0u8; 8];
    timestamp_bytes.copy_from_slice(&leaf[2..10]);
    let timestamp = u64::from_be_bytes(timestamp_bytes);
    let entry_type = ((leaf[10] as u16) << 8) | (leaf[11] as u16);

    let extra = engine
        .decode(extra_data_b64)
        .map_err(|e| Error::LeafParse(format!("extra_data is not valid base64: {}", e)))?;

    match entry_type {
        X509_ENTRY => {
            if leaf.len() < 15 {
                return Err(Error::LeafParse("x509_entry too short".to_string()));
            }
            let cert_len = be24(&leaf[12..15]);
            let end = std::cmp::min(15 + cert_len, leaf.len());
            let leaf_der = leaf[15..end].to_vec();
            let chain_der = parse_chain(&extra)?;

            Ok(ParsedEntry {
                kind: EntryType::X509Cert,
                timestamp,
                leaf_der,
                chain_der,
            })
        }
        PRECERT_ENTRY => {
            // extra_data: 3-byte length + full pre-certificate DER + chain
            if extra.len() < 3 {
                return Err(Error::LeafParse(
                    "extra_data too short for precert_entry".to_string(),
                ));
            }
            let precert_len = be24(&extra[0..3]);
            if extra.len() < 3 + precert_len {
                return Err(Error::LeafParse(format!(
                    "extra_data truncated: expected {} bytes",
                    3 + precert_len
                )));
            }
            let leaf_der = extra[3..3 + precert_len].to_vec();
            let chain_der = parse_chain(&extra[3 + precert_len..])?;

            Ok(ParsedEntry {
                kind: EntryType::PreCert,
                timestamp,
                leaf_der,
                chain_der,
            })
        }
        other => Err(Error::LeafParse(format!("unknown entry type: {}", other))),
    }
}

/// Chain encoding: 3-byte total length, then a sequence of 3-byte
/// length-prefixed certificates.
fn parse_chain(data: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    if data.len() < 3 {
        return Ok(Vec::new());
    }
    let total = be24(&data[0..3]);
    let mut rest = &data[3..std::cmp::min(3 + total, data.len())];
    let mut chain = Vec::new();
    while rest.len() >= 3 {
        let len = be24(&rest[0..3]);
        if rest.len() < 3 + len {
            return Err(Error::LeafParse("certificate chain is truncated".to_string()));
        }
        chain.push(rest[3..3 + len].to_vec());
        rest = &rest[3 + len..];
    }
    Ok(chain)
}

fn be24(bytes: &[u8]) -> usize {
    ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize)
}
