//! Configuration entity CRUD: certificates, listeners, backends, ingress
//! rules, redirect rules, and orphan GC.

use super::StoreError;
use crate::model::{Backend, HttpRedirectRule, IngressRule, Listener, TlsCertificate};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TLSCertificate
// ---------------------------------------------------------------------------

pub fn upsert_tls_certificate(conn: &Connection, cert: &TlsCertificate) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO tls_certificates (id, domain, is_wildcard, cert, key, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            domain = excluded.domain,
            is_wildcard = excluded.is_wildcard,
            cert = excluded.cert,
            key = excluded.key,
            expires_at = excluded.expires_at",
        params![
            cert.id,
            cert.domain,
            cert.is_wildcard,
            cert.cert,
            cert.key,
            cert.expires_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_tls_certificate(
    conn: &Connection,
    id: &str,
) -> Result<Option<TlsCertificate>, StoreError> {
    conn.query_row(
        "SELECT id, domain, is_wildcard, cert, key, expires_at FROM tls_certificates WHERE id = ?1",
        params![id],
        |row| {
            let expires_at: String = row.get(5)?;
            Ok(TlsCertificate {
                id: row.get(0)?,
                domain: row.get(1)?,
                is_wildcard: row.get(2)?,
                cert: row.get(3)?,
                key: row.get(4)?,
                expires_at: parse_rfc3339(&expires_at),
            })
        },
    )
    .optional()
    .map_err(StoreError::from)
}

/// Idempotent delete: an absent id is a no-op success.
pub fn delete_tls_certificate(conn: &Connection, id: &str) -> Result<(), StoreError> {
    conn.execute("DELETE FROM tls_certificates WHERE id = ?1", params![id])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Upsert a listener, enforcing the sticky `protocol`/`is_tls` policy
/// if a row with this id already
/// exists with a different `protocol` or `is_tls`, the upsert fails without
/// mutating anything.
pub fn upsert_listener(conn: &Connection, listener: &Listener) -> Result<(), StoreError> {
    if let Some(existing) = get_listener(conn, &listener.id)? {
        if existing.protocol != listener.protocol || existing.is_tls != listener.is_tls {
            return Err(StoreError::Conflict(format!(
                "listener {} already exists with protocol={} is_tls={}; remove existing rules before changing it",
                listener.id, existing.protocol, existing.is_tls
            )));
        }
        return Ok(());
    }
    conn.execute(
        "INSERT INTO listeners (id, protocol, ip, port, is_tls) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            listener.id,
            listener.protocol,
            listener.ip,
            listener.port,
            listener.is_tls,
        ],
    )?;
    Ok(())
}

pub fn get_listener(conn: &Connection, id: &str) -> Result<Option<Listener>, StoreError> {
    conn.query_row(
        "SELECT id, protocol, ip, port, is_tls FROM listeners WHERE id = ?1",
        params![id],
        |row| {
            Ok(Listener {
                id: row.get(0)?,
                protocol: row.get(1)?,
                ip: row.get(2)?,
                port: row.get::<_, i64>(3)? as u16,
                is_tls: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(StoreError::from)
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Candidate backend to upsert, before the dedup lookup assigns (or reuses)
/// an id. `hosts` must already be sorted by the caller.
pub struct BackendCandidate {
    pub resolver_type: String,
    pub dns_resolver: Option<String>,
    pub hosts: Vec<String>,
    pub port: u16,
    pub is_tls: bool,
    pub sni_domain: Option<String>,
}

/// Dedup-upsert a backend on its structural tuple.
/// Returns the (possibly pre-existing) backend id.
pub fn upsert_backend(conn: &Connection, candidate: &BackendCandidate) -> Result<String, StoreError> {
    let hosts_json =
        serde_json::to_string(&candidate.hosts).map_err(|e| StoreError::InvalidData(e.to_string()))?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM backends
             WHERE resolver_type = ?1
               AND dns_resolver IS ?2
               AND hosts = ?3
               AND port = ?4
               AND is_tls = ?5
               AND sni_domain IS ?6",
            params![
                candidate.resolver_type,
                candidate.dns_resolver,
                hosts_json,
                candidate.port,
                candidate.is_tls,
                candidate.sni_domain,
            ],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO backends (id, resolver_type, dns_resolver, hosts, port, is_tls, sni_domain)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            candidate.resolver_type,
            candidate.dns_resolver,
            hosts_json,
            candidate.port,
            candidate.is_tls,
            candidate.sni_domain,
        ],
    )?;
    Ok(id)
}

pub fn get_backend(conn: &Connection, id: &str) -> Result<Option<Backend>, StoreError> {
    conn.query_row(
        "SELECT id, resolver_type, dns_resolver, hosts, port, is_tls, sni_domain
         FROM backends WHERE id = ?1",
        params![id],
        |row| {
            let hosts_json: String = row.get(3)?;
            let hosts: Vec<String> = serde_json::from_str(&hosts_json).unwrap_or_default();
            Ok(Backend {
                id: row.get(0)?,
                resolver_type: row.get(1)?,
                dns_resolver: row.get(2)?,
                hosts,
                port: row.get::<_, i64>(4)? as u16,
                is_tls: row.get(5)?,
                sni_domain: row.get(6)?,
            })
        },
    )
    .optional()
    .map_err(StoreError::from)
}

// ---------------------------------------------------------------------------
// IngressRule
// ---------------------------------------------------------------------------

pub fn upsert_ingress_rule(conn: &Connection, rule: &IngressRule) -> Result<(), StoreError> {
    let allowed_json = serde_json::to_string(&rule.allowed_cidrs)
        .map_err(|e| StoreError::InvalidData(e.to_string()))?;
    let denied_json = serde_json::to_string(&rule.denied_cidrs)
        .map_err(|e| StoreError::InvalidData(e.to_string()))?;
    conn.execute(
        "INSERT INTO ingress_rules
            (id, priority, listener_id, backend_id, domain, route_prefix, allowed_cidrs, denied_cidrs)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            priority = excluded.priority,
            listener_id = excluded.listener_id,
            backend_id = excluded.backend_id,
            domain = excluded.domain,
            route_prefix = excluded.route_prefix,
            allowed_cidrs = excluded.allowed_cidrs,
            denied_cidrs = excluded.denied_cidrs",
        params![
            rule.id,
            rule.priority,
            rule.listener_id,
            rule.backend_id,
            rule.domain,
            rule.route_prefix,
            allowed_json,
            denied_json,
        ],
    )?;
    Ok(())
}

pub fn get_ingress_rule(conn: &Connection, id: &str) -> Result<Option<IngressRule>, StoreError> {
    conn.query_row(
        "SELECT id, priority, listener_id, backend_id, domain, route_prefix, allowed_cidrs, denied_cidrs
         FROM ingress_rules WHERE id = ?1",
        params![id],
        |row| {
            let allowed_json: String = row.get(6)?;
            let denied_json: String = row.get(7)?;
            Ok(IngressRule {
                id: row.get(0)?,
                priority: row.get(1)?,
                listener_id: row.get(2)?,
                backend_id: row.get(3)?,
                domain: row.get(4)?,
                route_prefix: row.get(5)?,
                allowed_cidrs: serde_json::from_str(&allowed_json).unwrap_or_default(),
                denied_cidrs: serde_json::from_str(&denied_json).unwrap_or_default(),
            })
        },
    )
    .optional()
    .map_err(StoreError::from)
}

/// Idempotent delete: an absent id is a no-op success.
pub fn delete_ingress_rule(conn: &Connection, id: &str) -> Result<(), StoreError> {
    conn.execute("DELETE FROM ingress_rules WHERE id = ?1", params![id])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// HTTPRedirectRule
// ---------------------------------------------------------------------------

pub fn upsert_redirect_rule(conn: &Connection, rule: &HttpRedirectRule) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO http_redirect_rules
            (id, listener_id, domain, path_prefix, is_https_redirect,
             scheme_redirect, host_redirect, path_redirect, status_code)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
            listener_id = excluded.listener_id,
            domain = excluded.domain,
            path_prefix = excluded.path_prefix,
            is_https_redirect = excluded.is_https_redirect,
            scheme_redirect = excluded.scheme_redirect,
            host_redirect = excluded.host_redirect,
            path_redirect = excluded.path_redirect,
            status_code = excluded.status_code",
        params![
            rule.id,
            rule.listener_id,
            rule.domain,
            rule.path_prefix,
            rule.is_https_redirect,
            rule.scheme_redirect,
            rule.host_redirect,
            rule.path_redirect,
            rule.status_code,
        ],
    )?;
    Ok(())
}

pub fn get_redirect_rule(
    conn: &Connection,
    id: &str,
) -> Result<Option<HttpRedirectRule>, StoreError> {
    conn.query_row(
        "SELECT id, listener_id, domain, path_prefix, is_https_redirect,
                scheme_redirect, host_redirect, path_redirect, status_code
         FROM http_redirect_rules WHERE id = ?1",
        params![id],
        |row| {
            Ok(HttpRedirectRule {
                id: row.get(0)?,
                listener_id: row.get(1)?,
                domain: row.get(2)?,
                path_prefix: row.get(3)?,
                is_https_redirect: row.get(4)?,
                scheme_redirect: row.get(5)?,
                host_redirect: row.get(6)?,
                path_redirect: row.get(7)?,
                status_code: row.get::<_, i64>(8)? as u16,
            })
        },
    )
    .optional()
    .map_err(StoreError::from)
}

/// Idempotent delete: an absent id is a no-op success.
pub fn delete_redirect_rule(conn: &Connection, id: &str) -> Result<(), StoreError> {
    conn.execute("DELETE FROM http_redirect_rules WHERE id = ?1", params![id])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Orphan GC
// ---------------------------------------------------------------------------

/// Delete listeners and backends no longer referenced by any rule.
///
/// When the reference set for an entity kind is empty, no deletion is
/// performed for that kind — this guards against wiping every listener or
/// backend if both rule tables are transiently empty mid-batch.
pub fn gc_orphans(conn: &Connection) -> Result<(), StoreError> {
    let referenced_listeners: i64 = conn.query_row(
        "SELECT COUNT(*) FROM (
            SELECT listener_id FROM ingress_rules
            UNION
            SELECT listener_id FROM http_redirect_rules
         )",
        [],
        |row| row.get(0),
    )?;
    if referenced_listeners > 0 {
        conn.execute(
            "DELETE FROM listeners WHERE id NOT IN (
                SELECT listener_id FROM ingress_rules
                UNION
                SELECT listener_id FROM http_redirect_rules
             )",
            [],
        )?;
    }

    let referenced_backends: i64 =
        conn.query_row("SELECT COUNT(*) FROM ingress_rules", [], |row| row.get(0))?;
    if referenced_backends > 0 {
        conn.execute(
            "DELETE FROM backends WHERE id NOT IN (SELECT backend_id FROM ingress_rules)",
            [],
        )?;
    }

    Ok(())
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn open_store() -> (Store, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(file.path()).unwrap();
        (store, file)
    }

    #[test]
    fn listener_upsert_is_idempotent_but_rejects_protocol_change() {
        let (store, _f) = open_store();
        store
            .with_rw(|conn| {
                let l = Listener {
                    id: "0.0.0.0:443".to_owned(),
                    protocol: "http".to_owned(),
                    ip: "0.0.0.0".to_owned(),
                    port: 443,
                    is_tls: true,
                };
                upsert_listener(conn, &l)?;
                upsert_listener(conn, &l)?;
                assert!(get_listener(conn, "0.0.0.0:443")?.is_some());

                let conflicting = Listener {
                    is_tls: false,
                    ..l
                };
                let err = upsert_listener(conn, &conflicting).unwrap_err();
                assert!(matches!(err, StoreError::Conflict(_)));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn backend_dedup_ignores_host_order() {
        let (store, _f) = open_store();
        store
            .with_rw(|conn| {
                let a = BackendCandidate {
                    resolver_type: "static".to_owned(),
                    dns_resolver: None,
                    hosts: vec!["a".to_owned(), "b".to_owned()],
                    port: 8080,
                    is_tls: false,
                    sni_domain: None,
                };
                let b = BackendCandidate {
                    hosts: vec!["a".to_owned(), "b".to_owned()],
                    ..BackendCandidate {
                        resolver_type: "static".to_owned(),
                        dns_resolver: None,
                        hosts: vec![],
                        port: 8080,
                        is_tls: false,
                        sni_domain: None,
                    }
                };
                let id_a = upsert_backend(conn, &a)?;
                let id_b = upsert_backend(conn, &b)?;
                assert_eq!(id_a, id_b);

                let count: i64 = conn.query_row("SELECT COUNT(*) FROM backends", [], |r| r.get(0))?;
                assert_eq!(count, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn gc_orphans_skips_deletion_when_reference_set_is_empty() {
        let (store, _f) = open_store();
        store
            .with_rw(|conn| {
                let l = Listener {
                    id: "0.0.0.0:80".to_owned(),
                    protocol: "http".to_owned(),
                    ip: "0.0.0.0".to_owned(),
                    port: 80,
                    is_tls: false,
                };
                upsert_listener(conn, &l)?;
                gc_orphans(conn)?;
                assert!(get_listener(conn, "0.0.0.0:80")?.is_some());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn gc_orphans_deletes_unreferenced_listener_and_backend() {
        let (store, _f) = open_store();
        store
            .with_rw(|conn| {
                let l1 = Listener {
                    id: "0.0.0.0:80".to_owned(),
                    protocol: "http".to_owned(),
                    ip: "0.0.0.0".to_owned(),
                    port: 80,
                    is_tls: false,
                };
                let l2 = Listener {
                    id: "0.0.0.0:81".to_owned(),
                    protocol: "http".to_owned(),
                    ip: "0.0.0.0".to_owned(),
                    port: 81,
                    is_tls: false,
                };
                upsert_listener(conn, &l1)?;
                upsert_listener(conn, &l2)?;

                let backend_id = upsert_backend(
                    conn,
                    &BackendCandidate {
                        resolver_type: "static".to_owned(),
                        dns_resolver: None,
                        hosts: vec!["a".to_owned()],
                        port: 80,
                        is_tls: false,
                        sni_domain: None,
                    },
                )?;

                let rule = IngressRule {
                    id: "http:0.0.0.0:80:example.com:/".to_owned(),
                    priority: 0,
                    listener_id: l1.id.clone(),
                    backend_id: backend_id.clone(),
                    domain: "example.com".to_owned(),
                    route_prefix: "/".to_owned(),
                    allowed_cidrs: vec![],
                    denied_cidrs: vec![],
                };
                upsert_ingress_rule(conn, &rule)?;

                gc_orphans(conn)?;

                assert!(get_listener(conn, &l1.id)?.is_some());
                assert!(get_listener(conn, &l2.id)?.is_none());
                assert!(get_backend(conn, &backend_id)?.is_some());
                Ok(())
            })
            .unwrap();
    }
}
