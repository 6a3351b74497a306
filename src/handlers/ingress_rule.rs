use super::{default_route_prefix, validate_bind_ip, HandlerError, HandlerResult};
use crate::events::{IngressRuleDeleteRequest, IngressRuleUpsertRequest};
use crate::model::{self, IngressRule, Listener};
use crate::store::config_store::{self, BackendCandidate};
use crate::validation::{validate_cidr, validate_domain};
use rusqlite::Connection;

pub fn upsert(conn: &Connection, req: &IngressRuleUpsertRequest) -> HandlerResult {
    validate_bind_ip(&req.bind_ip)?;
    if !(1..=65535).contains(&req.port) {
        return Err(HandlerError::Validation(format!(
            "port {} is out of range",
            req.port
        )));
    }
    if req.protocol != "http" && req.protocol != "tcp" {
        return Err(HandlerError::Validation(format!(
            "protocol must be 'http' or 'tcp', got '{}'",
            req.protocol
        )));
    }

    let domain = if req.protocol == "http" || req.is_tls {
        if req.domain.is_empty() {
            return Err(HandlerError::Validation(
                "domain is required for HTTP or TLS listeners".to_owned(),
            ));
        }
        validate_domain(&req.domain)?
    } else if req.domain.is_empty() {
        String::new()
    } else {
        validate_domain(&req.domain)?
    };

    let route_prefix = default_route_prefix(&req.protocol, &req.route_prefix);

    for cidr in req.allowed_cidrs.iter().chain(req.denied_cidrs.iter()) {
        validate_cidr(cidr)?;
    }

    match req.backend_resolver.as_str() {
        "static" => {
            if req.backend_hosts.is_empty() {
                return Err(HandlerError::Validation(
                    "backend_hosts must not be empty for a static resolver".to_owned(),
                ));
            }
            if !req.backend_dns_resolver.is_empty() {
                return Err(HandlerError::Validation(
                    "backend_dns_resolver must not be set for a static resolver".to_owned(),
                ));
            }
        }
        "dns" => {
            if req.backend_dns_resolver.is_empty() {
                return Err(HandlerError::Validation(
                    "backend_dns_resolver is required for a dns resolver".to_owned(),
                ));
            }
            if req.backend_hosts.is_empty() {
                return Err(HandlerError::Validation(
                    "backend_hosts must not be empty for a dns resolver".to_owned(),
                ));
            }
        }
        other => {
            return Err(HandlerError::Validation(format!(
                "backend_resolver must be 'static' or 'dns', got '{other}'"
            )))
        }
    }
    if !(1..=65535).contains(&req.backend_port) {
        return Err(HandlerError::Validation(format!(
            "backend_port {} is out of range",
            req.backend_port
        )));
    }

    let listener_id = model::listener_id(&req.bind_ip, req.port);
    let listener = Listener {
        id: listener_id.clone(),
        protocol: req.protocol.clone(),
        ip: req.bind_ip.clone(),
        port: req.port,
        is_tls: req.is_tls,
    };
    config_store::upsert_listener(conn, &listener)?;

    let mut hosts = req.backend_hosts.clone();
    hosts.sort();
    let sni_domain = if req.backend_sni_domain.is_empty() {
        None
    } else {
        Some(validate_domain(&req.backend_sni_domain)?)
    };
    let backend_id = config_store::upsert_backend(
        conn,
        &BackendCandidate {
            resolver_type: req.backend_resolver.clone(),
            dns_resolver: if req.backend_dns_resolver.is_empty() {
                None
            } else {
                Some(req.backend_dns_resolver.clone())
            },
            hosts,
            port: req.backend_port,
            is_tls: req.backend_is_tls,
            sni_domain,
        },
    )?;

    let mut allowed_cidrs = req.allowed_cidrs.clone();
    allowed_cidrs.sort();
    let mut denied_cidrs = req.denied_cidrs.clone();
    denied_cidrs.sort();

    let id = if req.protocol == "tcp" {
        model::ingress_rule_id_tcp(&listener_id)
    } else {
        model::ingress_rule_id_http(&listener_id, &domain, &route_prefix)
    };

    let rule = IngressRule {
        id,
        priority: req.priority,
        listener_id,
        backend_id,
        domain,
        route_prefix,
        allowed_cidrs,
        denied_cidrs,
    };
    config_store::upsert_ingress_rule(conn, &rule)?;
    Ok(serde_json::to_value(&rule).expect("IngressRule always serializes"))
}

pub fn delete(conn: &Connection, req: &IngressRuleDeleteRequest) -> HandlerResult {
    validate_bind_ip(&req.bind_ip)?;
    let listener_id = model::listener_id(&req.bind_ip, req.port);
    let route_prefix = default_route_prefix(&req.protocol, &req.route_prefix);

    let id = if req.protocol == "tcp" {
        model::ingress_rule_id_tcp(&listener_id)
    } else {
        let domain = if req.domain.is_empty() {
            String::new()
        } else {
            validate_domain(&req.domain)?
        };
        model::ingress_rule_id_http(&listener_id, &domain, &route_prefix)
    };
    config_store::delete_ingress_rule(conn, &id)?;
    Ok(serde_json::Value::Null)
}
