//! X.509/RSA validation for TLS certificate upserts.
//!
//! Normalizes escaped newlines, validates that the certificate's public key
//! and the supplied private key are an RSA pair with a matching modulus, and
//! extracts `NotAfter` for the stored `expires_at` field.

use chrono::{DateTime, Utc};
use pkcs8::DecodePrivateKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use x509_parser::oid_registry::OID_PKCS1_RSAENCRYPTION;

#[derive(Debug)]
pub enum CertError {
    InvalidCert(String),
    InvalidKey(String),
    NonRsaKey,
    KeyMismatch,
}

impl std::fmt::Display for CertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertError::InvalidCert(s) => write!(f, "invalid certificate: {s}"),
            CertError::InvalidKey(s) => write!(f, "invalid private key: {s}"),
            CertError::NonRsaKey => write!(f, "only RSA private keys are supported"),
            CertError::KeyMismatch => {
                write!(f, "certificate public key does not match the supplied private key")
            }
        }
    }
}

impl std::error::Error for CertError {}

/// Normalize a PEM block: turn literal `\n` escapes into real newlines and
/// guarantee a trailing newline.
pub fn normalize_pem(raw: &str) -> String {
    let unescaped = raw.replace("\\n", "\n");
    if unescaped.ends_with('\n') {
        unescaped
    } else {
        format!("{unescaped}\n")
    }
}

/// Parse the certificate's `NotAfter` and validate the cert/key pair,
/// returning the certificate's expiry as a UTC timestamp.
pub fn validate_cert_key_pair(cert_pem: &str, key_pem: &str) -> Result<DateTime<Utc>, CertError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes())
        .map_err(|e| CertError::InvalidCert(e.to_string()))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| CertError::InvalidCert(e.to_string()))?;

    let not_after = cert.validity().not_after.timestamp();
    let expires_at = DateTime::<Utc>::from_timestamp(not_after, 0)
        .ok_or_else(|| CertError::InvalidCert("NotAfter out of range".to_owned()))?;

    let spki = cert.public_key();
    if spki.algorithm.algorithm != OID_PKCS1_RSAENCRYPTION {
        return Err(CertError::NonRsaKey);
    }
    let cert_public_key = RsaPublicKey::from_pkcs1_der(&spki.subject_public_key.data)
        .map_err(|_| CertError::NonRsaKey)?;

    let private_key = parse_rsa_private_key(key_pem)?;

    if private_key.n() != cert_public_key.n() {
        return Err(CertError::KeyMismatch);
    }

    Ok(expires_at)
}

fn parse_rsa_private_key(key_pem: &str) -> Result<RsaPrivateKey, CertError> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(key_pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs1_pem(key_pem).map_err(|e| CertError::InvalidKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_pem_unescapes_newlines_and_adds_trailing_newline() {
        let raw = "-----BEGIN CERTIFICATE-----\\nABC\\n-----END CERTIFICATE-----";
        let normalized = normalize_pem(raw);
        assert!(normalized.ends_with('\n'));
        assert!(!normalized.contains("\\n"));
    }

    #[test]
    fn normalize_pem_is_a_no_op_when_already_normalized() {
        let raw = "line1\nline2\n";
        assert_eq!(normalize_pem(raw), raw);
    }

    const TEST_CERT: &str = include_str!("../../tests/fixtures/test_cert.pem");
    const TEST_KEY: &str = include_str!("../../tests/fixtures/test_key.pem");
    const WRONG_KEY: &str = include_str!("../../tests/fixtures/wrong_key.pem");

    #[test]
    fn validate_cert_key_pair_accepts_a_real_matching_rsa_pair() {
        let expires_at = validate_cert_key_pair(TEST_CERT, TEST_KEY).unwrap();
        assert_eq!(expires_at.format("%Y-%m-%d").to_string(), "2030-01-01");
    }

    #[test]
    fn validate_cert_key_pair_rejects_a_mismatched_key() {
        let err = validate_cert_key_pair(TEST_CERT, WRONG_KEY).unwrap_err();
        assert!(matches!(err, CertError::KeyMismatch));
    }
}
