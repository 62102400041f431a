// Shared helpers for driving a faked CT log with wiremock.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openssl::asn1::Asn1Time;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::X509;
use openssl::x509::X509NameBuilder;
use openssl::x509::extension::SubjectAlternativeName;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use ct_relay::ct_log::stream::{BackoffPolicy, StreamConfig};

/// Self-signed certificate with a SAN, used as the leaf for every fake entry.
pub fn mint_cert(common_name: &str) -> Vec<u8> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = EcKey::generate(&group).unwrap();
    let pkey = PKey::from_ec_key(key).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&pkey).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();

    let san = SubjectAlternativeName::new()
        .dns(common_name)
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(san).unwrap();

    builder.sign(&pkey, MessageDigest::sha256()).unwrap();
    builder.build().to_der().unwrap()
}

fn be24(len: usize) -> [u8; 3] {
    [(len >> 16) as u8, (len >> 8) as u8, len as u8]
}

/// base64 MerkleTreeLeaf for an x509 entry.
pub fn x509_leaf_input(cert_der: &[u8]) -> String {
    let mut leaf = vec![0u8, 0u8]; // version, leaf_type
    leaf.extend_from_slice(&1_700_000_000_000u64.to_be_bytes());
    leaf.extend_from_slice(&0u16.to_be_bytes()); // x509_entry
    leaf.extend_from_slice(&be24(cert_der.len()));
    leaf.extend_from_slice(cert_der);
    STANDARD.encode(leaf)
}

/// base64 CertificateChain for extra_data.
pub fn chain_extra_data(chain: &[&[u8]]) -> String {
    let mut inner = Vec::new();
    for cert in chain {
        inner.extend_from_slice(&be24(cert.len()));
        inner.extend_from_slice(cert);
    }
    let mut out = be24(inner.len()).to_vec();
    out.extend_from_slice(&inner);
    STANDARD.encode(out)
}

/// `n` identical well-formed entries.
pub fn make_entries(n: usize, cert_der: &[u8]) -> Vec<(String, String)> {
    let leaf_input = x509_leaf_input(cert_der);
    let extra_data = chain_extra_data(&[]);
    (0..n).map(|_| (leaf_input.clone(), extra_data.clone())).collect()
}

/// Serves get-sth from a fixed sequence of tree sizes; the last one repeats.
pub struct SthResponder {
    sizes: Vec<u64>,
    calls: AtomicUsize,
}

impl SthResponder {
    pub fn new(sizes: Vec<u64>) -> Self {
        assert!(!sizes.is_empty());
        Self {
            sizes,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Respond for SthResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let tree_size = *self.sizes.get(call).unwrap_or_else(|| self.sizes.last().unwrap());
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tree_size": tree_size,
            "timestamp": 1_700_000_000_000u64,
            "sha256_root_hash": STANDARD.encode([0u8; 32]),
            "tree_head_signature": "",
        }))
    }
}

/// Serves get-entries out of a fixed entry list, returning at most `cap`
/// entries per call to exercise short reads.
pub struct EntriesResponder {
    entries: Vec<(String, String)>,
    cap: usize,
}

impl EntriesResponder {
    pub fn new(entries: Vec<(String, String)>, cap: usize) -> Self {
        assert!(cap > 0);
        Self { entries, cap }
    }
}

impl Respond for EntriesResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut start = 0usize;
        let mut end = 0usize;
        for (key, value) in request.url.query_pairs() {
            match key.as_ref() {
                "start" => start = value.parse().unwrap(),
                "end" => end = value.parse().unwrap(),
                _ => {}
            }
        }
        let end = end.min(self.entries.len().saturating_sub(1));
        let upper = end.min(start + self.cap - 1);
        let entries: Vec<_> = self
            .entries
            .get(start..=upper)
            .unwrap_or(&[])
            .iter()
            .map(|(leaf_input, extra_data)| {
                serde_json::json!({ "leaf_input": leaf_input, "extra_data": extra_data })
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "entries": entries }))
    }
}

/// Mount a fake log on `server`: an STH size sequence plus an entry list.
pub async fn mount_fake_log(
    server: &MockServer,
    sizes: Vec<u64>,
    entries: Vec<(String, String)>,
    cap: usize,
) {
    Mock::given(method("GET"))
        .and(path("/ct/v1/get-sth"))
        .respond_with(SthResponder::new(sizes))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ct/v1/get-entries"))
        .respond_with(EntriesResponder::new(entries, cap))
        .mount(server)
        .await;
}

/// Backoff that exhausts in well under a second, so a stalled fake log ends
/// the stream quickly.
pub fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        initial_interval: Duration::from_millis(20),
        multiplier: 1.5,
        randomization_factor: 0.5,
        max_interval: Duration::from_millis(50),
        max_elapsed_time: Duration::from_millis(250),
    }
}

pub fn test_config(batch_size: u64, n_workers: usize, start_index: i64) -> StreamConfig {
    StreamConfig {
        batch_size,
        n_workers,
        start_index,
        backoff: fast_backoff(),
    }
}
