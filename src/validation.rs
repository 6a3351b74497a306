//! Shared validation helpers used by every mutation handler.
//!
//! # Domain validation
//! Trims, rejects empty/root, strips a single trailing dot, accepts a
//! leftmost-label wildcard (`*` or `*.rest`), otherwise IDN-normalizes to
//! ASCII with strict `idna` lookup semantics and checks label shape.
//!
//! # CIDR validation
//! Delegates to `cidr::IpCidr`, which accepts both IPv4 and IPv6 blocks.

use cidr::IpCidr;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyDomain,
    RootDomain,
    TooLong(usize),
    DoubleDot,
    LeadingOrTrailingDot,
    EmptyLabel,
    InvalidLabel(String),
    Underscore,
    IdnError(String),
    InvalidWildcard(String),
    InvalidCidr(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyDomain => write!(f, "domain must not be empty"),
            ValidationError::RootDomain => write!(f, "domain must not be the root '.'"),
            ValidationError::TooLong(n) => write!(f, "domain is {n} characters, exceeds 253"),
            ValidationError::DoubleDot => write!(f, "domain contains '..'"),
            ValidationError::LeadingOrTrailingDot => {
                write!(f, "domain has a leading or trailing dot")
            }
            ValidationError::EmptyLabel => write!(f, "domain contains an empty label"),
            ValidationError::InvalidLabel(l) => write!(f, "invalid domain label '{l}'"),
            ValidationError::Underscore => write!(f, "domain must not contain '_'"),
            ValidationError::IdnError(s) => write!(f, "IDN normalization failed: {s}"),
            ValidationError::InvalidWildcard(s) => write!(f, "invalid wildcard domain '{s}'"),
            ValidationError::InvalidCidr(s) => write!(f, "invalid CIDR block '{s}'"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate (and normalize) a domain. Returns the normalized
/// ASCII domain, or the original wildcard form (`*` / `*.rest`) unchanged
/// apart from trimming and trailing-dot stripping.
pub fn validate_domain(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyDomain);
    }
    if trimmed == "." {
        return Err(ValidationError::RootDomain);
    }

    let stripped = trimmed.strip_suffix('.').unwrap_or(trimmed);

    if stripped == "*" {
        return Ok("*".to_owned());
    }
    if let Some(rest) = stripped.strip_prefix("*.") {
        let normalized_rest = validate_domain(rest)
            .map_err(|_| ValidationError::InvalidWildcard(stripped.to_owned()))?;
        return Ok(format!("*.{normalized_rest}"));
    }

    validate_plain_domain(stripped)
}

fn validate_plain_domain(domain: &str) -> Result<String, ValidationError> {
    if domain.len() > 253 {
        return Err(ValidationError::TooLong(domain.len()));
    }
    if domain.contains("..") {
        return Err(ValidationError::DoubleDot);
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        return Err(ValidationError::LeadingOrTrailingDot);
    }
    if domain.contains('_') {
        return Err(ValidationError::Underscore);
    }

    let ascii = idna::domain_to_ascii_strict(domain)
        .map_err(|e| ValidationError::IdnError(format!("{e:?}")))?;

    for label in ascii.split('.') {
        if label.is_empty() {
            return Err(ValidationError::EmptyLabel);
        }
        if !is_valid_label(label) {
            return Err(ValidationError::InvalidLabel(label.to_owned()));
        }
    }

    Ok(ascii)
}

/// `^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$`
fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !is_alnum(bytes[0]) {
        return false;
    }
    if bytes.len() == 1 {
        return true;
    }
    if !is_alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes[1..bytes.len() - 1]
        .iter()
        .all(|&b| is_alnum(b) || b == b'-')
}

/// Validate a CIDR block string (IPv4 or IPv6).
pub fn validate_cidr(raw: &str) -> Result<(), ValidationError> {
    IpCidr::from_str(raw)
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidCidr(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_ascii_domain() {
        assert_eq!(validate_domain("example.com").unwrap(), "example.com");
    }

    #[test]
    fn strips_single_trailing_dot() {
        assert_eq!(validate_domain("example.com.").unwrap(), "example.com");
    }

    #[test]
    fn rejects_empty_and_root() {
        assert_eq!(validate_domain(""), Err(ValidationError::EmptyDomain));
        assert_eq!(validate_domain("."), Err(ValidationError::RootDomain));
    }

    #[test]
    fn rejects_double_dot_and_underscore() {
        assert_eq!(validate_domain("a..com"), Err(ValidationError::DoubleDot));
        assert_eq!(
            validate_domain("a_b.com"),
            Err(ValidationError::Underscore)
        );
    }

    #[test]
    fn accepts_leftmost_wildcard() {
        assert_eq!(validate_domain("*").unwrap(), "*");
        assert_eq!(validate_domain("*.example.com").unwrap(), "*.example.com");
    }

    #[test]
    fn rejects_wildcard_not_in_leftmost_position() {
        assert!(validate_domain("sub.*.com").is_err());
    }

    #[test]
    fn rejects_label_with_uppercase_via_idna_normalization() {
        // idna lowercases ASCII labels; this should normalize cleanly.
        assert_eq!(validate_domain("Example.COM").unwrap(), "example.com");
    }

    #[test]
    fn validates_ipv4_and_ipv6_cidrs() {
        assert!(validate_cidr("10.0.0.0/8").is_ok());
        assert!(validate_cidr("2001:db8::/32").is_ok());
        assert!(validate_cidr("not-a-cidr").is_err());
    }
}
