//! Configuration entity schema and identity derivation.
//!
//! Every entity id is deterministic from its natural key except `Backend`,
//! which is a random UUID deduped on a structural tuple (see
//! [`backend::Backend::dedup_key_json`]).

pub mod backend;
pub mod ingress_rule;
pub mod listener;
pub mod message;
pub mod redirect_rule;
pub mod tls_certificate;

pub use backend::Backend;
pub use ingress_rule::IngressRule;
pub use listener::Listener;
pub use message::Message;
pub use redirect_rule::HttpRedirectRule;
pub use tls_certificate::TlsCertificate;

/// `id = domain` if not wildcard else `"*.<domain>"`.
pub fn tls_certificate_id(domain: &str, is_wildcard: bool) -> String {
    if is_wildcard {
        format!("*.{domain}")
    } else {
        domain.to_owned()
    }
}

/// `id = "<ip>:<port>"`.
pub fn listener_id(ip: &str, port: u16) -> String {
    format!("{ip}:{port}")
}

/// `id = "tcp:<listener_id>"` for TCP ingress rules (match-all domain).
pub fn ingress_rule_id_tcp(listener_id: &str) -> String {
    format!("tcp:{listener_id}")
}

/// `id = "http:<listener_id>:<domain>:<route_prefix>"` for HTTP ingress rules.
pub fn ingress_rule_id_http(listener_id: &str, domain: &str, route_prefix: &str) -> String {
    format!("http:{listener_id}:{domain}:{route_prefix}")
}

/// `id = "http:<listener_id>:<domain>:<route_prefix>:<kind>"`,
/// `kind = "https"` if `is_https_redirect` else `"other"`.
pub fn redirect_rule_id(
    listener_id: &str,
    domain: &str,
    route_prefix: &str,
    is_https_redirect: bool,
) -> String {
    let kind = if is_https_redirect { "https" } else { "other" };
    format!("http:{listener_id}:{domain}:{route_prefix}:{kind}")
}
