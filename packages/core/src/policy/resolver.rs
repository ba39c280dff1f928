//! Hostname to policy lookup

use std::collections::HashMap;
use std::sync::Arc;

use rustls::pki_types::CertificateDer;

use super::debug::DebugOverrides;
use super::domain::DomainPolicy;
use super::hostname;
use crate::errors::{ConfigurationError, InvalidHostname};

/// Immutable set of domain policies plus the debug trust overrides.
///
/// Lookup picks the exact hostname first, then the most specific parent domain whose
/// policy includes subdomains. A more specific policy that does not include
/// subdomains does not shadow a less specific one that does.
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    policies: HashMap<String, Arc<DomainPolicy>>,
    should_override_pins: bool,
    debug_ca_certificates: Vec<CertificateDer<'static>>,
}

impl PolicyResolver {
    /// Index `policies`, rejecting duplicates and an empty set.
    ///
    /// `debug_overrides` are discarded unless `debuggable` is set.
    pub fn new(
        policies: Vec<DomainPolicy>,
        debug_overrides: DebugOverrides,
        debuggable: bool,
    ) -> Result<Self, ConfigurationError> {
        if policies.is_empty() {
            return Err(ConfigurationError::NoPinnedDomains);
        }

        let mut indexed = HashMap::with_capacity(policies.len());
        for policy in policies {
            let key = policy.hostname().to_string();
            if indexed.insert(key.clone(), Arc::new(policy)).is_some() {
                return Err(ConfigurationError::DuplicateDomain(key));
            }
        }

        let DebugOverrides {
            override_pins,
            ca_certificates,
        } = if debuggable {
            debug_overrides
        } else {
            if !debug_overrides.is_empty() {
                tracing::info!("Ignoring <debug-overrides>: application is not debuggable");
            }
            DebugOverrides::default()
        };

        if override_pins {
            tracing::warn!("Pin validation is disabled for all domains by debug overrides");
        }

        Ok(Self {
            policies: indexed,
            should_override_pins: override_pins,
            debug_ca_certificates: ca_certificates,
        })
    }

    /// Policy applying to `hostname`, if the domain is pinned.
    ///
    /// Expired policies are returned as well; skipping the pin check is the caller's
    /// decision.
    pub fn resolve(&self, hostname: &str) -> Result<Option<Arc<DomainPolicy>>, InvalidHostname> {
        if !hostname::is_valid_domain(hostname) {
            return Err(InvalidHostname(hostname.to_string()));
        }
        let host = hostname::normalize(hostname);

        if let Some(policy) = self.policies.get(&host) {
            return Ok(Some(Arc::clone(policy)));
        }

        let inherited = hostname::parent_suffixes(&host)
            .filter_map(|suffix| self.policies.get(suffix))
            .find(|policy| policy.include_subdomains())
            .cloned();
        Ok(inherited)
    }

    #[inline]
    #[must_use]
    pub fn should_override_pins(&self) -> bool {
        self.should_override_pins
    }

    #[inline]
    #[must_use]
    pub fn debug_ca_certificates(&self) -> &[CertificateDer<'static>] {
        &self.debug_ca_certificates
    }

    pub fn policies(&self) -> impl Iterator<Item = &Arc<DomainPolicy>> {
        self.policies.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PublicKeyPin;

    fn policy(host: &str, include_subdomains: bool, seed: u8) -> DomainPolicy {
        DomainPolicy::builder(host)
            .include_subdomains(include_subdomains)
            .pins([PublicKeyPin::from_digest([seed; 32]), PublicKeyPin::from_digest([seed + 1; 32])])
            .build()
            .unwrap()
    }

    fn resolver(policies: Vec<DomainPolicy>) -> PolicyResolver {
        PolicyResolver::new(policies, DebugOverrides::default(), false).unwrap()
    }

    #[test]
    fn test_exact_match_wins() {
        let r = resolver(vec![
            policy("datatheorem.com", true, 1),
            policy("other.datatheorem.com", false, 10),
        ]);
        let found = r.resolve("other.datatheorem.com").unwrap().unwrap();
        assert_eq!(found.hostname(), "other.datatheorem.com");
    }

    #[test]
    fn test_subdomain_falls_back_to_including_ancestor() {
        let r = resolver(vec![
            policy("datatheorem.com", true, 1),
            policy("other.datatheorem.com", false, 10),
        ]);
        let found = r.resolve("x.other.datatheorem.com").unwrap().unwrap();
        assert_eq!(found.hostname(), "datatheorem.com");
    }

    #[test]
    fn test_most_specific_including_ancestor_wins() {
        let r = resolver(vec![
            policy("datatheorem.com", true, 1),
            policy("api.datatheorem.com", true, 10),
        ]);
        let found = r.resolve("v1.api.datatheorem.com").unwrap().unwrap();
        assert_eq!(found.hostname(), "api.datatheorem.com");
    }

    #[test]
    fn test_suffix_match_is_segment_aware() {
        let r = resolver(vec![policy("datatheorem.com", true, 1)]);
        assert!(r.resolve("evildatatheorem.com").unwrap().is_none());
        assert!(r.resolve("www.google.com").unwrap().is_none());
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let r = resolver(vec![policy("www.datatheorem.com", false, 1)]);
        assert!(r.resolve("WWW.DataTheorem.com.").unwrap().is_some());
    }

    #[test]
    fn test_non_domain_is_rejected() {
        let r = resolver(vec![policy("www.datatheorem.com", false, 1)]);
        let err = r.resolve("https://www.datatheorem.com/").unwrap_err();
        assert!(err.to_string().starts_with("Invalid domain supplied"));
    }

    #[test]
    fn test_duplicate_domains_are_rejected() {
        let err = PolicyResolver::new(
            vec![policy("www.datatheorem.com", false, 1), policy("WWW.datatheorem.com", true, 5)],
            DebugOverrides::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateDomain(_)));
    }

    #[test]
    fn test_empty_policy_set_is_rejected() {
        let err = PolicyResolver::new(Vec::new(), DebugOverrides::default(), false).unwrap_err();
        assert_eq!(err, ConfigurationError::NoPinnedDomains);
    }

    #[test]
    fn test_debug_overrides_require_debuggable() {
        let overrides = DebugOverrides {
            override_pins: true,
            ca_certificates: Vec::new(),
        };
        let release = PolicyResolver::new(
            vec![policy("www.datatheorem.com", false, 1)],
            overrides.clone(),
            false,
        )
        .unwrap();
        assert!(!release.should_override_pins());

        let debug =
            PolicyResolver::new(vec![policy("www.datatheorem.com", false, 1)], overrides, true)
                .unwrap();
        assert!(debug.should_override_pins());
    }
}
