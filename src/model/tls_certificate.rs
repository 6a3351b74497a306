//! `TLSCertificate` entity: a domain's certificate/key pair and its expiry.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TlsCertificate {
    pub id: String,
    pub domain: String,
    pub is_wildcard: bool,
    /// PEM text, guaranteed to end with a newline.
    pub cert: String,
    /// PEM text, guaranteed to end with a newline.
    pub key: String,
    pub expires_at: DateTime<Utc>,
}
