//! `Listener` entity. `protocol`/`is_tls` are sticky once a listener row exists.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Tcp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Tcp => "tcp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Protocol::Http),
            "tcp" => Some(Protocol::Tcp),
            _ => None,
        }
    }
}

/// `id = "<ip>:<port>"`; `protocol` and `is_tls` are sticky once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listener {
    pub id: String,
    pub protocol: String,
    pub ip: String,
    pub port: u16,
    pub is_tls: bool,
}
