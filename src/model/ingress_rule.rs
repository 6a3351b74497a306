//! `IngressRule` entity: a routing decision binding a listener to a backend.

use serde::Serialize;

/// `id = "tcp:<listener_id>"` for TCP, else
/// `"http:<listener_id>:<domain>:<route_prefix>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngressRule {
    pub id: String,
    pub priority: i64,
    pub listener_id: String,
    pub backend_id: String,
    /// Empty = match-all; only permissible for non-HTTP / non-TLS listeners.
    pub domain: String,
    pub route_prefix: String,
    /// Sorted CIDR strings.
    pub allowed_cidrs: Vec<String>,
    /// Sorted CIDR strings.
    pub denied_cidrs: Vec<String>,
}
