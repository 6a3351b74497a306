//! Inbound event registry and outbound reply envelope.
//!
//! The registry is a closed tagged variant per event plus a single parse
//! function: unknown events are a registry miss, not a parse error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event kind registry
// ---------------------------------------------------------------------------

/// The closed set of event suffixes this agent understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    TlsCertificateUpsert,
    TlsCertificateDelete,
    IngressRuleUpsert,
    IngressRuleDelete,
    HttpRedirectRuleUpsert,
    HttpRedirectRuleDelete,
}

impl EventKind {
    /// Registry lookup. An unrecognized string is not a parse error — it's
    /// a registry miss, handled by the caller as "unknown event".
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "v1.tls_certificate.upsert" => Some(EventKind::TlsCertificateUpsert),
            "v1.tls_certificate.delete" => Some(EventKind::TlsCertificateDelete),
            "v1.ingress_rule.upsert" => Some(EventKind::IngressRuleUpsert),
            "v1.ingress_rule.delete" => Some(EventKind::IngressRuleDelete),
            "v1.http_redirect_rule.upsert" => Some(EventKind::HttpRedirectRuleUpsert),
            "v1.http_redirect_rule.delete" => Some(EventKind::HttpRedirectRuleDelete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::TlsCertificateUpsert => "v1.tls_certificate.upsert",
            EventKind::TlsCertificateDelete => "v1.tls_certificate.delete",
            EventKind::IngressRuleUpsert => "v1.ingress_rule.upsert",
            EventKind::IngressRuleDelete => "v1.ingress_rule.delete",
            EventKind::HttpRedirectRuleUpsert => "v1.http_redirect_rule.upsert",
            EventKind::HttpRedirectRuleDelete => "v1.http_redirect_rule.delete",
        }
    }
}

// ---------------------------------------------------------------------------
// Request shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsCertificateUpsertRequest {
    pub request_id: String,
    pub requested_at: DateTime<Utc>,
    pub domain: String,
    #[serde(default)]
    pub is_wildcard: bool,
    pub cert: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsCertificateDeleteRequest {
    pub request_id: String,
    pub requested_at: DateTime<Utc>,
    pub domain: String,
    #[serde(default)]
    pub is_wildcard: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngressRuleUpsertRequest {
    pub request_id: String,
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub priority: i64,
    pub bind_ip: String,
    pub port: u16,
    pub protocol: String,
    #[serde(default)]
    pub is_tls: bool,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub route_prefix: String,
    #[serde(default)]
    pub allowed_cidrs: Vec<String>,
    #[serde(default)]
    pub denied_cidrs: Vec<String>,
    pub backend_resolver: String,
    #[serde(default)]
    pub backend_dns_resolver: String,
    #[serde(default)]
    pub backend_hosts: Vec<String>,
    pub backend_port: u16,
    #[serde(default)]
    pub backend_is_tls: bool,
    #[serde(default)]
    pub backend_sni_domain: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngressRuleDeleteRequest {
    pub request_id: String,
    pub requested_at: DateTime<Utc>,
    pub bind_ip: String,
    pub port: u16,
    pub protocol: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub route_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpRedirectRuleUpsertRequest {
    pub request_id: String,
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub priority: i64,
    pub bind_ip: String,
    pub port: u16,
    #[serde(default)]
    pub is_tls: bool,
    pub domain: String,
    #[serde(default)]
    pub route_prefix: String,
    #[serde(default)]
    pub is_https_redirect: bool,
    #[serde(default)]
    pub scheme_redirect: Option<String>,
    #[serde(default)]
    pub host_redirect: Option<String>,
    #[serde(default)]
    pub path_redirect: Option<String>,
    #[serde(default)]
    pub status_code: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpRedirectRuleDeleteRequest {
    pub request_id: String,
    pub requested_at: DateTime<Utc>,
    pub bind_ip: String,
    pub port: u16,
    pub domain: String,
    #[serde(default)]
    pub route_prefix: String,
    #[serde(default)]
    pub is_https_redirect: bool,
}

/// A fully parsed inbound request, tagged by event kind.
#[derive(Debug, Clone)]
pub enum ParsedRequest {
    TlsCertificateUpsert(TlsCertificateUpsertRequest),
    TlsCertificateDelete(TlsCertificateDeleteRequest),
    IngressRuleUpsert(IngressRuleUpsertRequest),
    IngressRuleDelete(IngressRuleDeleteRequest),
    HttpRedirectRuleUpsert(HttpRedirectRuleUpsertRequest),
    HttpRedirectRuleDelete(HttpRedirectRuleDeleteRequest),
}

impl ParsedRequest {
    pub fn request_id(&self) -> &str {
        match self {
            ParsedRequest::TlsCertificateUpsert(r) => &r.request_id,
            ParsedRequest::TlsCertificateDelete(r) => &r.request_id,
            ParsedRequest::IngressRuleUpsert(r) => &r.request_id,
            ParsedRequest::IngressRuleDelete(r) => &r.request_id,
            ParsedRequest::HttpRedirectRuleUpsert(r) => &r.request_id,
            ParsedRequest::HttpRedirectRuleDelete(r) => &r.request_id,
        }
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        match self {
            ParsedRequest::TlsCertificateUpsert(r) => r.requested_at,
            ParsedRequest::TlsCertificateDelete(r) => r.requested_at,
            ParsedRequest::IngressRuleUpsert(r) => r.requested_at,
            ParsedRequest::IngressRuleDelete(r) => r.requested_at,
            ParsedRequest::HttpRedirectRuleUpsert(r) => r.requested_at,
            ParsedRequest::HttpRedirectRuleDelete(r) => r.requested_at,
        }
    }

    /// Re-serialize the parsed request to canonical JSON, as stored in
    /// `Message.request_payload`.
    pub fn to_canonical_json(&self) -> serde_json::Result<String> {
        match self {
            ParsedRequest::TlsCertificateUpsert(r) => serde_json::to_string(r),
            ParsedRequest::TlsCertificateDelete(r) => serde_json::to_string(r),
            ParsedRequest::IngressRuleUpsert(r) => serde_json::to_string(r),
            ParsedRequest::IngressRuleDelete(r) => serde_json::to_string(r),
            ParsedRequest::HttpRedirectRuleUpsert(r) => serde_json::to_string(r),
            ParsedRequest::HttpRedirectRuleDelete(r) => serde_json::to_string(r),
        }
    }
}

#[derive(Debug)]
pub enum EventError {
    UnknownEvent(String),
    Malformed(String),
    MissingRequestId,
    ZeroRequestedAt,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventError::UnknownEvent(e) => write!(f, "unknown event '{e}'"),
            EventError::Malformed(s) => write!(f, "malformed payload: {s}"),
            EventError::MissingRequestId => write!(f, "request_id is missing or empty"),
            EventError::ZeroRequestedAt => write!(f, "requested_at is zero"),
        }
    }
}

impl std::error::Error for EventError {}

/// Parse `payload` as the request shape registered for `event`.
///
/// Returns `EventError::UnknownEvent` if `event` is not in the registry
/// (ack-and-drop, not a parse error); `Malformed` if the
/// JSON doesn't match the registered shape; `MissingRequestId` /
/// `ZeroRequestedAt` if the common envelope fields fail validation.
pub fn parse_request(event: &str, payload: &[u8]) -> Result<ParsedRequest, EventError> {
    let kind = EventKind::from_str(event).ok_or_else(|| EventError::UnknownEvent(event.to_owned()))?;

    let parsed = match kind {
        EventKind::TlsCertificateUpsert => ParsedRequest::TlsCertificateUpsert(
            serde_json::from_slice(payload).map_err(|e| EventError::Malformed(e.to_string()))?,
        ),
        EventKind::TlsCertificateDelete => ParsedRequest::TlsCertificateDelete(
            serde_json::from_slice(payload).map_err(|e| EventError::Malformed(e.to_string()))?,
        ),
        EventKind::IngressRuleUpsert => ParsedRequest::IngressRuleUpsert(
            serde_json::from_slice(payload).map_err(|e| EventError::Malformed(e.to_string()))?,
        ),
        EventKind::IngressRuleDelete => ParsedRequest::IngressRuleDelete(
            serde_json::from_slice(payload).map_err(|e| EventError::Malformed(e.to_string()))?,
        ),
        EventKind::HttpRedirectRuleUpsert => ParsedRequest::HttpRedirectRuleUpsert(
            serde_json::from_slice(payload).map_err(|e| EventError::Malformed(e.to_string()))?,
        ),
        EventKind::HttpRedirectRuleDelete => ParsedRequest::HttpRedirectRuleDelete(
            serde_json::from_slice(payload).map_err(|e| EventError::Malformed(e.to_string()))?,
        ),
    };

    if parsed.request_id().is_empty() {
        return Err(EventError::MissingRequestId);
    }
    if parsed.requested_at().timestamp() == 0 {
        return Err(EventError::ZeroRequestedAt);
    }

    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Outbound reply envelope (ResponsePayloadV1)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ResponsePayloadV1 {
    pub request_id: String,
    pub requested_at: DateTime<Utc>,
    pub success: bool,
    pub data: serde_json::Value,
    pub error_message: String,
    pub processed_at: DateTime<Utc>,
    pub queued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_event_is_a_registry_miss() {
        let err = parse_request("v1.unknown.event", b"{}").unwrap_err();
        assert!(matches!(err, EventError::UnknownEvent(_)));
    }

    #[test]
    fn malformed_json_is_distinguished_from_unknown_event() {
        let err = parse_request("v1.tls_certificate.upsert", b"not json").unwrap_err();
        assert!(matches!(err, EventError::Malformed(_)));
    }

    #[test]
    fn missing_request_id_is_rejected() {
        let payload = br#"{"request_id":"","requested_at":"2024-01-01T00:00:00Z","domain":"example.com","is_wildcard":false,"cert":"x","key":"y"}"#;
        let err = parse_request("v1.tls_certificate.upsert", payload).unwrap_err();
        assert!(matches!(err, EventError::MissingRequestId));
    }

    #[test]
    fn zero_requested_at_is_rejected() {
        let payload = br#"{"request_id":"r1","requested_at":"1970-01-01T00:00:00Z","domain":"example.com","is_wildcard":false,"cert":"x","key":"y"}"#;
        let err = parse_request("v1.tls_certificate.upsert", payload).unwrap_err();
        assert!(matches!(err, EventError::ZeroRequestedAt));
    }

    #[test]
    fn valid_payload_parses_into_typed_request() {
        let payload = br#"{"request_id":"r1","requested_at":"2024-01-01T00:00:00Z","domain":"example.com","is_wildcard":false,"cert":"x","key":"y"}"#;
        let parsed = parse_request("v1.tls_certificate.upsert", payload).unwrap();
        match parsed {
            ParsedRequest::TlsCertificateUpsert(r) => {
                assert_eq!(r.domain, "example.com");
            }
            _ => panic!("expected TlsCertificateUpsert"),
        }
    }
}
