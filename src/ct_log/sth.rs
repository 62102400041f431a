// src/ct_log/sth.rs
use base64::Engine;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::sign::Verifier;

use super::types::SignedTreeHead;
use crate::error::Error;

// DigitallySigned algorithm identifiers (RFC 5246 section 7.4.1.4.1)
const HASH_SHA256: u8 = 4;
const SIG_RSA: u8 = 1;
const SIG_ECDSA: u8 = 3;

/// Verify an STH signature against the log's DER-encoded public key.
///
/// The signed message is the RFC 6962 TreeHeadSignature structure:
/// version(1) || signature_type(1) || timestamp(8) || tree_size(8) ||
/// sha256_root_hash(32). The signature field on the wire is a TLS
/// DigitallySigned struct: hash alg, signature alg, 2-byte length, then the
/// ASN.1 signature itself.
pub fn verify_sth(sth: &SignedTreeHead, public_key_der: &[u8]) -> Result<(), Error> {
    let engine = &base64::engine::general_purpose::STANDARD;

    let root_hash = engine
        .decode(&sth.sha256_root_hash)
        .map_err(|e| Error::SthSignature(format!("root hash is not valid base64: {}", e)))?;
    if root_hash.len() != 32 {
        return Err(Error::SthSignature(format!(
            "root hash is {} bytes, expected 32",
            root_hash.len()
        )));
    }

    let signed = engine
        .decode(&sth.tree_head_signature)
        .map_err(|e| Error::SthSignature(format!("signature is not valid base64: {}", e)))?;
    if signed.len() < 4 {
        return Err(Error::SthSignature("signature blob too short".to_string()));
    }
    if signed[0] != HASH_SHA256 {
        return Err(Error::SthSignature(format!(
            "unsupported hash algorithm: {}",
            signed[0]
        )));
    }
    if signed[1] != SIG_RSA && signed[1] != SIG_ECDSA {
        return Err(Error::SthSignature(format!(
            "unsupported signature algorithm: {}",
            signed[1]
        )));
    }
    let sig_len = ((signed[2] as usize) << 8) | (signed[3] as usize);
    let signature = &signed[4..];
    if signature.len() != sig_len {
        return Err(Error::SthSignature(format!(
            "signature length mismatch: header says {}, got {}",
            sig_len,
            signature.len()
        )));
    }

    let mut message = Vec::with_capacity(2 + 8 + 8 + 32);
    message.push(0); // version v1
    message.push(1); // signature_type tree_hash
    message.extend_from_slice(&sth.timestamp.to_be_bytes());
    message.extend_from_slice(&sth.tree_size.to_be_bytes());
    message.extend_from_slice(&root_hash);

    let pkey = PKey::public_key_from_der(public_key_der)
        .map_err(|e| Error::SthSignature(format!("could not parse log public key: {}", e)))?;
    let mut verifier = Verifier::new(MessageDigest::sha256(), &pkey)
        .map_err(|e| Error::SthSignature(e.to_string()))?;
    verifier
        .update(&message)
        .map_err(|e| Error::SthSignature(e.to_string()))?;
    match verifier.verify(signature) {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::SthSignature(
            "signature does not match tree head".to_string(),
        )),
        Err(e) => Err(Error::SthSignature(e.to_string())),
    }
}
