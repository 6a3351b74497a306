use super::{certs, HandlerResult};
use crate::events::{TlsCertificateDeleteRequest, TlsCertificateUpsertRequest};
use crate::model::{self, TlsCertificate};
use crate::store::config_store;
use crate::validation::validate_domain;
use rusqlite::Connection;

pub fn upsert(conn: &Connection, req: &TlsCertificateUpsertRequest) -> HandlerResult {
    let domain = validate_domain(&req.domain)?;

    let cert_pem = certs::normalize_pem(&req.cert);
    let key_pem = certs::normalize_pem(&req.key);
    let expires_at = certs::validate_cert_key_pair(&cert_pem, &key_pem)?;

    let id = model::tls_certificate_id(&domain, req.is_wildcard);
    let cert = TlsCertificate {
        id,
        domain,
        is_wildcard: req.is_wildcard,
        cert: cert_pem,
        key: key_pem,
        expires_at,
    };
    config_store::upsert_tls_certificate(conn, &cert)?;
    Ok(serde_json::to_value(&cert).expect("TlsCertificate always serializes"))
}

pub fn delete(conn: &Connection, req: &TlsCertificateDeleteRequest) -> HandlerResult {
    let domain = validate_domain(&req.domain)?;
    let id = model::tls_certificate_id(&domain, req.is_wildcard);
    config_store::delete_tls_certificate(conn, &id)?;
    Ok(serde_json::Value::Null)
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

    const TEST_CERT: &str = include_str!("../../tests/fixtures/test_cert.pem");
    const TEST_KEY: &str = include_str!("../../tests/fixtures/test_key.pem");

    #[test]
    fn upsert_accepts_a_bare_domain_with_wildcard_flag_set() {
        let (store, _f) = open_store();
        store
            .with_rw(|conn| {
                let req = TlsCertificateUpsertRequest {
                    request_id: "r1".to_owned(),
                    requested_at: chrono::Utc::now(),
                    domain: "example.com".to_owned(),
                    is_wildcard: true,
                    cert: TEST_CERT.to_owned(),
                    key: TEST_KEY.to_owned(),
                };
                let cert = upsert(conn, &req).unwrap();
                assert_eq!(cert["id"], "*.example.com");
                assert_eq!(cert["domain"], "example.com");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn upsert_stores_a_real_certificate_and_echoes_it_back() {
        let (store, _f) = open_store();
        store
            .with_rw(|conn| {
                let req = TlsCertificateUpsertRequest {
                    request_id: "r1".to_owned(),
                    requested_at: chrono::Utc::now(),
                    domain: "example.com".to_owned(),
                    is_wildcard: false,
                    cert: TEST_CERT.to_owned(),
                    key: TEST_KEY.to_owned(),
                };
                let cert = upsert(conn, &req).unwrap();
                assert_eq!(cert["id"], "example.com");
                assert_eq!(cert["expires_at"], "2030-01-01T21:47:26Z");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn delete_is_idempotent_for_absent_certificate() {
        let (store, _f) = open_store();
        store
            .with_rw(|conn| {
                let req = TlsCertificateDeleteRequest {
                    request_id: "r1".to_owned(),
                    requested_at: chrono::Utc::now(),
                    domain: "nowhere.example.com".to_owned(),
                    is_wildcard: false,
                };
                assert!(delete(conn, &req).is_ok());
                Ok(())
            })
            .unwrap();
    }
}
