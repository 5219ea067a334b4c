//! Hostname and DNS name rules

use std::net::IpAddr;

use crate::certificate::Certificate;
use crate::policy::HostnameMode;

const MAX_DNS_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Syntax check for a DNS name; `*` is only allowed as the whole leftmost
/// label of a name with at least three labels
pub(crate) fn is_valid_dns_name(name: &str, allow_wildcard: bool) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > MAX_DNS_NAME_LEN {
        return false;
    }

    let labels: Vec<&str> = name.split('.').collect();
    labels.iter().enumerate().all(|(i, label)| {
        if *label == "*" {
            return allow_wildcard && i == 0 && labels.len() >= 3;
        }
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

fn normalize(name: &str) -> String {
    name.strip_suffix('.').unwrap_or(name).to_ascii_lowercase()
}

fn dns_pattern_matches(pattern: &str, host: &str, mode: HostnameMode) -> bool {
    let pattern = normalize(pattern);
    if pattern == host {
        return true;
    }
    if mode != HostnameMode::WildcardPermissive || !is_valid_dns_name(&pattern, true) {
        return false;
    }
    match (pattern.strip_prefix("*."), host.split_once('.')) {
        (Some(suffix), Some((first, rest))) => !first.is_empty() && rest == suffix,
        _ => false,
    }
}

/// Whether `expected` names the certificate's subject
///
/// SAN entries are authoritative; the common name is consulted only when the
/// certificate carries no SAN at all.
#[must_use]
pub fn matches_hostname(certificate: &Certificate, expected: &str, mode: HostnameMode) -> bool {
    let has_san =
        !certificate.san_dns_names().is_empty() || !certificate.san_ip_addresses().is_empty();

    if let Ok(ip) = expected.parse::<IpAddr>() {
        if has_san {
            return certificate.san_ip_addresses().contains(&ip);
        }
        return certificate
            .common_name()
            .and_then(|cn| cn.parse::<IpAddr>().ok())
            .is_some_and(|cn_ip| cn_ip == ip);
    }

    let host = normalize(expected);
    if host.is_empty() {
        return false;
    }

    if has_san {
        return certificate
            .san_dns_names()
            .iter()
            .any(|pattern| dns_pattern_matches(pattern, &host, mode));
    }

    certificate
        .common_name()
        .is_some_and(|cn| dns_pattern_matches(cn, &host, mode))
}
