// src/formatter.rs
//! Renders parsed X.509 certificates into the flat record schema. All
//! functions here are pure; formatting the same input twice yields the same
//! record.

use std::net::IpAddr;

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;
use x509_parser::prelude::*;

use crate::ct_log::entry::ParsedEntry;
use crate::error::Error;
use crate::record::{
    CertificateInfo, Extensions, LogEntryBody, LogRecord, LogSource, Subject,
};

/// Build a full record from a decoded log entry. A fatally malformed leaf
/// fails the call; chain elements that do not parse are skipped with a
/// diagnostic.
pub fn record_from_entry(
    entry: &ParsedEntry,
    index: u64,
    log_url: &str,
    operator_name: &str,
) -> Result<LogRecord, Error> {
    let (_, leaf) = X509Certificate::from_der(&entry.leaf_der)
        .map_err(|e| Error::LeafParse(format!("leaf certificate: {:?}", e)))?;
    let cert = certificate_info(&leaf, &entry.leaf_der);

    let mut chain = Vec::with_capacity(entry.chain_der.len());
    for raw in &entry.chain_der {
        match X509Certificate::from_der(raw) {
            Ok((_, parsed)) => chain.push(certificate_info(&parsed, raw)),
            Err(e) => debug!("could not parse certificate from ASN.1 chain data: {:?}", e),
        }
    }

    let issued_at = cert.not_before;
    Ok(LogRecord {
        entry_type: entry.kind,
        body: LogEntryBody {
            cert,
            chain,
            index,
            date: issued_at.format("%Y-%m-%d").to_string(),
            issued_at,
            source: LogSource {
                url: log_url.to_string(),
                name: operator_name.to_string(),
            },
        },
    })
}

/// Flatten one certificate into the record shape.
pub fn certificate_info(cert: &X509Certificate<'_>, raw_der: &[u8]) -> CertificateInfo {
    let subject_alt_names = subject_alt_names(cert);
    let domains = domains_from_san(&subject_alt_names);

    CertificateInfo {
        subject: subject_info(cert),
        extensions: Extensions {
            basic_constraints: basic_constraints(cert),
            key_usage: key_usage(cert),
            authority_info_access: authority_info_access(cert),
            authority_key_identifier: authority_key_id(cert),
            certificate_policies: certificate_policies(cert),
            crl_distribution_points: crl_distribution_points(cert),
            subject_key_identifier: subject_key_id(cert),
            subject_alt_names,
        },
        not_before: asn1_datetime(&cert.validity().not_before),
        not_after: asn1_datetime(&cert.validity().not_after),
        as_der: base64::engine::general_purpose::STANDARD.encode(raw_der),
        domains,
    }
}

/// Every DNS name in a rendered SAN string. This derived form, not a second
/// pass over the extension, is the contract for the `domains` field.
pub fn domains_from_san(subject_alt_names: &str) -> Vec<String> {
    subject_alt_names
        .split(',')
        .filter_map(|piece| piece.trim().strip_prefix("DNS:"))
        .map(str::to_string)
        .collect()
}

fn asn1_datetime(time: &ASN1Time) -> DateTime<Utc> {
    Utc.timestamp_opt(time.timestamp(), 0).single().unwrap_or_default()
}

fn subject_info(cert: &X509Certificate<'_>) -> Subject {
    let subject = cert.subject();
    Subject {
        aggregated: subject.to_string(),
        country: flat_attr(subject.iter_country()),
        state: flat_attr(subject.iter_state_or_province()),
        locality: flat_attr(subject.iter_locality()),
        organization: flat_attr(subject.iter_organization()),
        organizational_unit: flat_attr(subject.iter_organizational_unit()),
        common_name: flat_attr(subject.iter_common_name()),
    }
}

fn flat_attr<'a, 'b: 'a>(values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>) -> String {
    values
        .filter_map(|attr| attr.as_str().ok())
        .collect::<Vec<_>>()
        .join(" ")
}

fn basic_constraints(cert: &X509Certificate<'_>) -> String {
    for ext in cert.extensions() {
        if let ParsedExtension::BasicConstraints(bc) = ext.parsed_extension() {
            let mut out = format!("CA:{}", bc.ca);
            if let Some(pathlen) = bc.path_len_constraint {
                out.push_str(&format!(", pathlen:{}", pathlen));
            }
            return out;
        }
    }
    String::new()
}

fn key_usage(cert: &X509Certificate<'_>) -> String {
    for ext in cert.extensions() {
        if let ParsedExtension::KeyUsage(ku) = ext.parsed_extension() {
            let mut out = String::new();
            let flags = [
                (ku.digital_signature(), "Digital Signature"),
                (ku.non_repudiation(), "Content Commitment"),
                (ku.key_encipherment(), "Key Encipherment"),
                (ku.data_encipherment(), "Data Encipherment"),
                (ku.key_agreement(), "Key Agreement"),
                (ku.key_cert_sign(), "Certificate Signing"),
                (ku.crl_sign(), "CRL Signing"),
                (ku.encipher_only(), "Encipher Only"),
                (ku.decipher_only(), "Decipher Only"),
            ];
            for (set, label) in flags {
                if set {
                    comma_append(&mut out, label);
                }
            }
            return out;
        }
    }
    String::new()
}

fn authority_info_access(cert: &X509Certificate<'_>) -> String {
    for ext in cert.extensions() {
        if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
            let mut issuers = String::new();
            let mut ocsp = String::new();
            for desc in &aia.accessdescs {
                if let GeneralName::URI(uri) = &desc.access_location {
                    if desc.access_method == oid_registry::OID_PKIX_ACCESS_DESCRIPTOR_CA_ISSUERS {
                        comma_append(&mut issuers, &format!("URI:{}", uri));
                    } else if desc.access_method == oid_registry::OID_PKIX_ACCESS_DESCRIPTOR_OCSP {
                        comma_append(&mut ocsp, &format!("URI:{}", uri));
                    }
                }
            }
            let mut out = String::new();
            if !issuers.is_empty() {
                out.push_str(&format!("CA Issuers - {}", issuers));
            }
            if !ocsp.is_empty() {
                out.push_str(&format!("OCSP - {}", ocsp));
            }
            return out;
        }
    }
    String::new()
}

fn authority_key_id(cert: &X509Certificate<'_>) -> String {
    for ext in cert.extensions() {
        if let ParsedExtension::AuthorityKeyIdentifier(aki) = ext.parsed_extension() {
            if let Some(key_id) = &aki.key_identifier {
                return format!("keyid:{}", hex::encode(key_id.0));
            }
        }
    }
    String::new()
}

fn subject_key_id(cert: &X509Certificate<'_>) -> String {
    for ext in cert.extensions() {
        if let ParsedExtension::SubjectKeyIdentifier(key_id) = ext.parsed_extension() {
            return format!("keyid:{}", hex::encode(key_id.0));
        }
    }
    String::new()
}

fn certificate_policies(cert: &X509Certificate<'_>) -> String {
    for ext in cert.extensions() {
        if let ParsedExtension::CertificatePolicies(policies) = ext.parsed_extension() {
            let mut out = String::new();
            for info in policies.iter() {
                comma_append(&mut out, &format!("Policy: {}", info.policy_id));
            }
            return out;
        }
    }
    String::new()
}

fn crl_distribution_points(cert: &X509Certificate<'_>) -> String {
    for ext in cert.extensions() {
        if let ParsedExtension::CRLDistributionPoints(crl) = ext.parsed_extension() {
            let mut uris = String::new();
            for point in &crl.points {
                if let Some(DistributionPointName::FullName(names)) = &point.distribution_point {
                    for name in names {
                        if let GeneralName::URI(uri) = name {
                            comma_append(&mut uris, &format!("URI:{}", uri));
                        }
                    }
                }
            }
            if uris.is_empty() {
                return String::new();
            }
            return format!("Full Name:{}", uris);
        }
    }
    String::new()
}

fn subject_alt_names(cert: &X509Certificate<'_>) -> String {
    for ext in cert.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            let mut out = String::new();
            for name in &san.general_names {
                match name {
                    GeneralName::DNSName(dns) => comma_append(&mut out, &format!("DNS:{}", dns)),
                    GeneralName::RFC822Name(email) => {
                        comma_append(&mut out, &format!("email:{}", email))
                    }
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            comma_append(&mut out, &format!("IP Address:{}", ip));
                        }
                    }
                    _ => {}
                }
            }
            return out;
        }
    }
    String::new()
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

fn comma_append(buf: &mut String, piece: &str) {
    if !buf.is_empty() {
        buf.push_str(", ");
    }
    buf.push_str(piece);
}
