//! `Backend` entity: a structurally deduped upstream resolution target.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverType {
    Static,
    Dns,
}

impl ResolverType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolverType::Static => "static",
            ResolverType::Dns => "dns",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "static" => Some(ResolverType::Static),
            "dns" => Some(ResolverType::Dns),
            _ => None,
        }
    }
}

/// `id` is a random UUID; rows are structurally deduped on
/// `(resolver_type, dns_resolver, hosts-as-sorted-JSON, port, is_tls, sni_domain)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backend {
    pub id: String,
    pub resolver_type: String,
    pub dns_resolver: Option<String>,
    /// Sorted lexicographically; stored as JSON text.
    pub hosts: Vec<String>,
    pub port: u16,
    pub is_tls: bool,
    pub sni_domain: Option<String>,
}

impl Backend {
    /// The structural key two backends are deduped on. `hosts` must already
    /// be sorted by the caller (upsert sorts before constructing a `Backend`).
    pub fn dedup_key_json(&self) -> String {
        serde_json::to_string(&self.hosts).expect("Vec<String> always serializes")
    }
}
