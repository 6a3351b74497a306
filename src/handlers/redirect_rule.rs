use super::{default_route_prefix, validate_bind_ip, HandlerError, HandlerResult};
use crate::events::{HttpRedirectRuleDeleteRequest, HttpRedirectRuleUpsertRequest};
use crate::model::{self, HttpRedirectRule, Listener};
use crate::store::config_store;
use crate::validation::validate_domain;
use rusqlite::Connection;

const VALID_STATUS_CODES: [u16; 4] = [301, 302, 307, 308];

pub fn upsert(conn: &Connection, req: &HttpRedirectRuleUpsertRequest) -> HandlerResult {
    validate_bind_ip(&req.bind_ip)?;
    if !(1..=65535).contains(&req.port) {
        return Err(HandlerError::Validation(format!(
            "port {} is out of range",
            req.port
        )));
    }
    let domain = validate_domain(&req.domain)?;
    let route_prefix = default_route_prefix("http", &req.route_prefix);

    let status_code = if req.status_code == 0 {
        301
    } else {
        req.status_code
    };
    if !VALID_STATUS_CODES.contains(&status_code) {
        return Err(HandlerError::Validation(format!(
            "status_code must be one of 301, 302, 307, 308, got {status_code}"
        )));
    }

    let listener_id = model::listener_id(&req.bind_ip, req.port);
    let listener = Listener {
        id: listener_id.clone(),
        protocol: "http".to_owned(),
        ip: req.bind_ip.clone(),
        port: req.port,
        is_tls: req.is_tls,
    };
    config_store::upsert_listener(conn, &listener)?;

    let id = model::redirect_rule_id(&listener_id, &domain, &route_prefix, req.is_https_redirect);
    let rule = HttpRedirectRule {
        id,
        listener_id,
        domain,
        path_prefix: route_prefix,
        is_https_redirect: req.is_https_redirect,
        scheme_redirect: req.scheme_redirect.clone(),
        host_redirect: req.host_redirect.clone(),
        path_redirect: req.path_redirect.clone(),
        status_code,
    };
    config_store::upsert_redirect_rule(conn, &rule)?;
    Ok(serde_json::to_value(&rule).expect("HttpRedirectRule always serializes"))
}

pub fn delete(conn: &Connection, req: &HttpRedirectRuleDeleteRequest) -> HandlerResult {
    validate_bind_ip(&req.bind_ip)?;
    let domain = validate_domain(&req.domain)?;
    let route_prefix = default_route_prefix("http", &req.route_prefix);
    let listener_id = model::listener_id(&req.bind_ip, req.port);
    let id = model::redirect_rule_id(&listener_id, &domain, &route_prefix, req.is_https_redirect);
    config_store::delete_redirect_rule(conn, &id)?;
    Ok(serde_json::Value::Null)
}
