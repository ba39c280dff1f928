//! Domain-name syntax checks for pinned hostnames and lookup queries

use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;

const MAX_DOMAIN_LENGTH: usize = 253;

fn label_pattern() -> &'static Regex {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    // Regex is a literal; compilation cannot fail
    LABEL.get_or_init(|| {
        Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").unwrap_or_else(|_| unreachable!())
    })
}

fn tld_pattern() -> &'static Regex {
    static TLD: OnceLock<Regex> = OnceLock::new();
    TLD.get_or_init(|| {
        Regex::new(r"^(?:[a-z]{2,63}|xn--[a-z0-9-]{1,59})$").unwrap_or_else(|_| unreachable!())
    })
}

/// Lower-case a hostname and strip surrounding whitespace and a single trailing dot
#[must_use]
pub fn normalize(hostname: &str) -> String {
    let trimmed = hostname.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

/// Check that `hostname` is a bare domain name.
///
/// Accepts fully qualified names with an alphabetic (or punycode) top-level label,
/// `localhost`, and literal IPv4/IPv6 addresses. Rejects URLs, ports, paths, wildcards,
/// empty labels (`.com`) and single-label names.
#[must_use]
pub fn is_valid_domain(hostname: &str) -> bool {
    let host = normalize(hostname);
    if host.is_empty() || host.len() > MAX_DOMAIN_LENGTH {
        return false;
    }
    if host == "localhost" || host.parse::<IpAddr>().is_ok() {
        return true;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let Some((tld, rest)) = labels.split_last() else {
        return false;
    };
    tld_pattern().is_match(tld) && rest.iter().all(|label| label_pattern().is_match(label))
}

/// Segment-aware subdomain test: `a.b.c` is under `b.c`, `evilb.c` is not.
/// Both arguments must already be normalized.
#[must_use]
pub fn is_subdomain_of(candidate: &str, domain: &str) -> bool {
    candidate.len() > domain.len()
        && candidate.ends_with(domain)
        && candidate.as_bytes()[candidate.len() - domain.len() - 1] == b'.'
}

/// Proper parent suffixes of a normalized hostname, most specific first.
/// `a.b.example.com` yields `b.example.com`, `example.com`, `com`.
pub fn parent_suffixes(hostname: &str) -> impl Iterator<Item = &str> {
    hostname
        .match_indices('.')
        .map(move |(idx, _)| &hostname[idx + 1..])
        .filter(|suffix| !suffix.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_regular_domains() {
        assert!(is_valid_domain("www.test.com"));
        assert!(is_valid_domain("datatheorem.com"));
        assert!(is_valid_domain("WWW.DataTheorem.COM."));
        assert!(is_valid_domain("xn--bcher-kva.xn--p1ai"));
    }

    #[test]
    fn test_accepts_localhost_and_ip_literals() {
        assert!(is_valid_domain("localhost"));
        assert!(is_valid_domain("127.0.0.1"));
        assert!(is_valid_domain("::1"));
    }

    #[test]
    fn test_rejects_non_domains() {
        assert!(!is_valid_domain(".com"));
        assert!(!is_valid_domain("com"));
        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain("https://www.datatheorem.com"));
        assert!(!is_valid_domain("www.datatheorem.com/path"));
        assert!(!is_valid_domain("www.datatheorem.com:443"));
        assert!(!is_valid_domain("*.datatheorem.com"));
        assert!(!is_valid_domain("-bad.datatheorem.com"));
        assert!(!is_valid_domain("a..datatheorem.com"));
        assert!(!is_valid_domain("www.datatheorem.c0m"));
    }

    #[test]
    fn test_subdomain_is_segment_aware() {
        assert!(is_subdomain_of("a.b.c", "b.c"));
        assert!(is_subdomain_of("x.y.datatheorem.com", "datatheorem.com"));
        assert!(!is_subdomain_of("evilb.c", "b.c"));
        assert!(!is_subdomain_of("b.c", "b.c"));
    }

    #[test]
    fn test_parent_suffixes_most_specific_first() {
        let suffixes: Vec<&str> = parent_suffixes("a.b.example.com").collect();
        assert_eq!(suffixes, vec!["b.example.com", "example.com", "com"]);
        assert_eq!(parent_suffixes("localhost").count(), 0);
    }
}
