//! `HTTPRedirectRule` entity: an HTTP response that redirects without hitting a backend.

use serde::Serialize;

/// `id = "http:<listener_id>:<domain>:<route_prefix>:<kind>"`, `kind =
/// "https"` if `is_https_redirect` else `"other"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpRedirectRule {
    pub id: String,
    pub listener_id: String,
    pub domain: String,
    pub path_prefix: String,
    pub is_https_redirect: bool,
    pub scheme_redirect: Option<String>,
    pub host_redirect: Option<String>,
    pub path_redirect: Option<String>,
    /// One of 301, 302, 307, 308. Defaults to 301.
    pub status_code: u16,
}
