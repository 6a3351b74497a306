//! Mutation handlers: one per event kind, dispatched from a parsed request.
//!
//! Each handler validates its request, derives the deterministic (or
//! deduped) entity id, and writes through `store::config_store`. Handlers
//! never open their own transaction — the caller runs a batch of them inside
//! a single `Store::with_write_transaction` call.

mod certs;
mod ingress_rule;
mod redirect_rule;
mod tls_certificate;

use crate::events::ParsedRequest;
use crate::store::StoreError;
use crate::validation::ValidationError;
use rusqlite::Connection;

pub use certs::CertError;

#[derive(Debug)]
pub enum HandlerError {
    Validation(String),
    Store(StoreError),
    Crypto(String),
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::Validation(s) => write!(f, "{s}"),
            HandlerError::Store(e) => write!(f, "{e}"),
            HandlerError::Crypto(s) => write!(f, "{s}"),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<ValidationError> for HandlerError {
    fn from(e: ValidationError) -> Self {
        HandlerError::Validation(e.to_string())
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        HandlerError::Store(e)
    }
}

impl From<CertError> for HandlerError {
    fn from(e: CertError) -> Self {
        HandlerError::Crypto(e.to_string())
    }
}

/// Result of a successful mutation: the JSON body placed into a reply's
/// `data` field. Deletes and no-op conflicts both succeed with `null`.
pub type HandlerResult = Result<serde_json::Value, HandlerError>;

/// Dispatch a parsed request to its handler. `conn` is expected to be the
/// transaction the caller's batch is running inside.
pub fn dispatch(conn: &Connection, request: &ParsedRequest) -> HandlerResult {
    match request {
        ParsedRequest::TlsCertificateUpsert(r) => tls_certificate::upsert(conn, r),
        ParsedRequest::TlsCertificateDelete(r) => tls_certificate::delete(conn, r),
        ParsedRequest::IngressRuleUpsert(r) => ingress_rule::upsert(conn, r),
        ParsedRequest::IngressRuleDelete(r) => ingress_rule::delete(conn, r),
        ParsedRequest::HttpRedirectRuleUpsert(r) => redirect_rule::upsert(conn, r),
        ParsedRequest::HttpRedirectRuleDelete(r) => redirect_rule::delete(conn, r),
    }
}

pub(crate) fn validate_bind_ip(bind_ip: &str) -> Result<(), HandlerError> {
    if bind_ip != "0.0.0.0" {
        return Err(HandlerError::Validation(format!(
            "bind_ip must be 0.0.0.0, got '{bind_ip}'"
        )));
    }
    Ok(())
}

pub(crate) fn default_route_prefix(protocol: &str, route_prefix: &str) -> String {
    if protocol == "http" && route_prefix.is_empty() {
        "/".to_owned()
    } else {
        route_prefix.to_owned()
    }
}
