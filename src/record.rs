// src/record.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contiguous window of parsed entries from one log; the unit of delivery
/// between the streaming pipeline and a sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub operator_name: String,
    pub log_source_name: String,
    pub start: u64,
    pub end: u64,
    pub logs: Vec<LogRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    #[serde(rename = "X509Cert")]
    X509Cert,
    #[serde(rename = "PreCert")]
    PreCert,
}

/// One certificate entry in the shape sinks receive it. The JSON field names
/// below are the wire contract and must not drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub entry_type: EntryType,
    pub body: LogEntryBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntryBody {
    #[serde(rename = "cert_leaf")]
    pub cert: CertificateInfo,
    #[serde(rename = "cert_chain")]
    pub chain: Vec<CertificateInfo>,
    pub index: u64,
    /// `not_before` rendered as YYYY-MM-DD.
    pub date: String,
    pub issued_at: DateTime<Utc>,
    pub source: LogSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub subject: Subject,
    pub extensions: Extensions,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Base64 of the raw ASN.1 certificate bytes.
    pub as_der: String,
    /// DNS names parsed back out of the rendered SAN string.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subject {
    pub aggregated: String,
    #[serde(rename = "C")]
    pub country: String,
    #[serde(rename = "ST")]
    pub state: String,
    #[serde(rename = "L")]
    pub locality: String,
    #[serde(rename = "O")]
    pub organization: String,
    #[serde(rename = "OU")]
    pub organizational_unit: String,
    #[serde(rename = "CN")]
    pub common_name: String,
}

/// Selected extensions rendered as human-readable strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extensions {
    #[serde(rename = "basicConstraints", default, skip_serializing_if = "String::is_empty")]
    pub basic_constraints: String,
    #[serde(rename = "keyUsage", default, skip_serializing_if = "String::is_empty")]
    pub key_usage: String,
    #[serde(rename = "authorityInfoAccess", default, skip_serializing_if = "String::is_empty")]
    pub authority_info_access: String,
    #[serde(rename = "authorityKeyIdentifier", default, skip_serializing_if = "String::is_empty")]
    pub authority_key_identifier: String,
    #[serde(rename = "certificatePolicies", default, skip_serializing_if = "String::is_empty")]
    pub certificate_policies: String,
    #[serde(rename = "crlDistributionPoints", default, skip_serializing_if = "String::is_empty")]
    pub crl_distribution_points: String,
    #[serde(rename = "subjectKeyIdentifier", default, skip_serializing_if = "String::is_empty")]
    pub subject_key_identifier: String,
    #[serde(rename = "subjectAltNames", default, skip_serializing_if = "String::is_empty")]
    pub subject_alt_names: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSource {
    pub url: String,
    pub name: String,
}
