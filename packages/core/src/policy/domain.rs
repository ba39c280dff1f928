//! Resolved per-domain pinning policy and its inheriting builder

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use url::Url;

use super::hostname;
use super::pin::PublicKeyPin;
use crate::errors::ConfigurationError;

/// Collector endpoint that receives reports unless a policy opts out
pub const DEFAULT_REPORT_URI: &str = "https://overmind.datatheorem.com/trustkit/report";

/// Parsed [`DEFAULT_REPORT_URI`]
#[must_use]
pub fn default_report_uri() -> Url {
    match Url::parse(DEFAULT_REPORT_URI) {
        Ok(url) => url,
        Err(_) => unreachable!(), // DEFAULT_REPORT_URI is a valid literal
    }
}

/// Partially specified settings of one `domain-config` node.
///
/// Unset fields are taken from the nearest ancestor that sets them; see
/// [`PolicySettings::merged_over`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySettings {
    pub include_subdomains: Option<bool>,
    pub pins: Option<BTreeSet<PublicKeyPin>>,
    pub expiration_date: Option<NaiveDate>,
    pub enforce_pinning: Option<bool>,
    pub report_uris: Option<BTreeSet<Url>>,
    pub disable_default_report_uri: Option<bool>,
}

impl PolicySettings {
    /// Fill every unset field from `parent`, which must itself be fully merged
    #[must_use]
    pub fn merged_over(&self, parent: &PolicySettings) -> PolicySettings {
        PolicySettings {
            include_subdomains: self.include_subdomains.or(parent.include_subdomains),
            pins: self.pins.clone().or_else(|| parent.pins.clone()),
            expiration_date: self.expiration_date.or(parent.expiration_date),
            enforce_pinning: self.enforce_pinning.or(parent.enforce_pinning),
            report_uris: self
                .report_uris
                .clone()
                .or_else(|| parent.report_uris.clone()),
            disable_default_report_uri: self
                .disable_default_report_uri
                .or(parent.disable_default_report_uri),
        }
    }

    /// Whether this node (after merging) declares a pin-set at all
    #[inline]
    #[must_use]
    pub fn has_pin_set(&self) -> bool {
        self.pins.is_some()
    }
}

/// Immutable, validated pinning rule for one domain
#[derive(Clone, PartialEq, Eq)]
pub struct DomainPolicy {
    hostname: String,
    include_subdomains: bool,
    pins: BTreeSet<PublicKeyPin>,
    enforce_pinning: bool,
    expiration_date: Option<NaiveDate>,
    report_uris: BTreeSet<Url>,
}

impl DomainPolicy {
    /// Start building a policy for `hostname`
    pub fn builder(hostname: impl Into<String>) -> DomainPolicyBuilder {
        DomainPolicyBuilder::new(hostname)
    }

    #[inline]
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[inline]
    #[must_use]
    pub fn include_subdomains(&self) -> bool {
        self.include_subdomains
    }

    #[inline]
    #[must_use]
    pub fn pins(&self) -> &BTreeSet<PublicKeyPin> {
        &self.pins
    }

    #[inline]
    #[must_use]
    pub fn enforce_pinning(&self) -> bool {
        self.enforce_pinning
    }

    #[inline]
    #[must_use]
    pub fn expiration_date(&self) -> Option<NaiveDate> {
        self.expiration_date
    }

    #[inline]
    #[must_use]
    pub fn report_uris(&self) -> &BTreeSet<Url> {
        &self.report_uris
    }

    /// A policy lapses at 00:00 UTC on its expiration date
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date
            .is_some_and(|expiration| now.date_naive() >= expiration)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether `hostname` (normalized) is covered by this policy
    #[must_use]
    pub fn matches(&self, hostname: &str) -> bool {
        hostname == self.hostname
            || (self.include_subdomains && hostname::is_subdomain_of(hostname, &self.hostname))
    }
}

impl fmt::Debug for DomainPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainPolicy")
            .field("hostname", &self.hostname)
            .field("include_subdomains", &self.include_subdomains)
            .field("pins", &self.pins)
            .field("enforce_pinning", &self.enforce_pinning)
            .field("expiration_date", &self.expiration_date)
            .field(
                "report_uris",
                &self.report_uris.iter().map(Url::as_str).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Builder for [`DomainPolicy`]; validation runs once, in [`build`](Self::build)
#[derive(Debug, Clone)]
pub struct DomainPolicyBuilder {
    hostname: String,
    settings: PolicySettings,
    default_report_uri: Option<Url>,
}

impl DomainPolicyBuilder {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            settings: PolicySettings::default(),
            default_report_uri: Some(default_report_uri()),
        }
    }

    /// Start from already merged node settings
    #[must_use]
    pub fn with_settings(mut self, settings: PolicySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Take every field still unset from `parent`
    #[must_use]
    pub fn inherit(mut self, parent: &PolicySettings) -> Self {
        self.settings = self.settings.merged_over(parent);
        self
    }

    #[must_use]
    pub fn include_subdomains(mut self, include: bool) -> Self {
        self.settings.include_subdomains = Some(include);
        self
    }

    #[must_use]
    pub fn pins<I: IntoIterator<Item = PublicKeyPin>>(mut self, pins: I) -> Self {
        self.settings.pins = Some(pins.into_iter().collect());
        self
    }

    #[must_use]
    pub fn enforce_pinning(mut self, enforce: bool) -> Self {
        self.settings.enforce_pinning = Some(enforce);
        self
    }

    #[must_use]
    pub fn expiration_date(mut self, date: NaiveDate) -> Self {
        self.settings.expiration_date = Some(date);
        self
    }

    #[must_use]
    pub fn report_uris<I: IntoIterator<Item = Url>>(mut self, uris: I) -> Self {
        self.settings.report_uris = Some(uris.into_iter().collect());
        self
    }

    #[must_use]
    pub fn disable_default_report_uri(mut self, disable: bool) -> Self {
        self.settings.disable_default_report_uri = Some(disable);
        self
    }

    /// Replace the process-wide collector (`None` means there is none)
    #[must_use]
    pub fn default_report_uri(mut self, uri: Option<Url>) -> Self {
        self.default_report_uri = uri;
        self
    }

    /// Validate and freeze the policy
    pub fn build(self) -> Result<DomainPolicy, ConfigurationError> {
        let settings = self.settings;

        if !hostname::is_valid_domain(&self.hostname) {
            return Err(ConfigurationError::InvalidDomain(self.hostname));
        }
        let hostname = hostname::normalize(&self.hostname);

        let pins = settings.pins.unwrap_or_default();
        let enforce_pinning = settings.enforce_pinning.unwrap_or(false);
        if enforce_pinning {
            if pins.is_empty() {
                return Err(ConfigurationError::EmptyPinSet(hostname));
            }
            if pins.len() < 2 {
                return Err(ConfigurationError::TooFewPins(hostname));
            }
        }

        let mut report_uris = settings.report_uris.unwrap_or_default();
        if !settings.disable_default_report_uri.unwrap_or(false) {
            if let Some(default_uri) = self.default_report_uri {
                report_uris.insert(default_uri);
            }
        }

        Ok(DomainPolicy {
            hostname,
            include_subdomains: settings.include_subdomains.unwrap_or(false),
            pins,
            enforce_pinning,
            expiration_date: settings.expiration_date,
            report_uris,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(byte: u8) -> PublicKeyPin {
        PublicKeyPin::from_digest([byte; 32])
    }

    #[test]
    fn test_enforced_single_pin_is_rejected() {
        let err = DomainPolicy::builder("www.datatheorem.com")
            .pins([pin(1)])
            .enforce_pinning(true)
            .build()
            .unwrap_err();
        assert!(err.to_string().starts_with("Less than two pins"), "{err}");
    }

    #[test]
    fn test_enforced_empty_pin_set_is_rejected() {
        let err = DomainPolicy::builder("www.datatheorem.com")
            .pins([])
            .enforce_pinning(true)
            .build()
            .unwrap_err();
        assert!(err.to_string().starts_with("An empty pin-set"), "{err}");
    }

    #[test]
    fn test_invalid_domain_is_rejected() {
        let err = DomainPolicy::builder(".com")
            .pins([pin(1), pin(2)])
            .build()
            .unwrap_err();
        assert!(err.to_string().starts_with("Tried to pin an invalid domain"), "{err}");
    }

    #[test]
    fn test_report_only_single_pin_is_accepted() {
        let policy = DomainPolicy::builder("www.datatheorem.com")
            .pins([pin(1)])
            .build()
            .unwrap();
        assert!(!policy.enforce_pinning());
        assert_eq!(policy.pins().len(), 1);
    }

    #[test]
    fn test_default_report_uri_added_unless_disabled() {
        let with_default = DomainPolicy::builder("www.datatheorem.com")
            .pins([pin(1), pin(2)])
            .build()
            .unwrap();
        assert!(with_default.report_uris().contains(&default_report_uri()));

        let without_default = DomainPolicy::builder("www.datatheorem.com")
            .pins([pin(1), pin(2)])
            .disable_default_report_uri(true)
            .build()
            .unwrap();
        assert!(without_default.report_uris().is_empty());
    }

    #[test]
    fn test_inherit_fills_only_unset_fields() {
        let parent = PolicySettings {
            include_subdomains: Some(true),
            pins: Some([pin(1), pin(2)].into_iter().collect()),
            enforce_pinning: Some(true),
            disable_default_report_uri: Some(true),
            ..PolicySettings::default()
        };
        let policy = DomainPolicy::builder("api.datatheorem.com")
            .enforce_pinning(false)
            .inherit(&parent)
            .build()
            .unwrap();

        assert!(policy.include_subdomains());
        assert!(!policy.enforce_pinning());
        assert_eq!(policy.pins().len(), 2);
        assert!(policy.report_uris().is_empty());
    }

    #[test]
    fn test_expiration_lapses_at_start_of_day() {
        let policy = DomainPolicy::builder("www.datatheorem.com")
            .pins([pin(1), pin(2)])
            .expiration_date(NaiveDate::from_ymd_opt(2018, 1, 1).unwrap())
            .build()
            .unwrap();

        let before = "2017-12-31T23:59:59Z".parse::<DateTime<Utc>>().unwrap();
        let on = "2018-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert!(!policy.is_expired_at(before));
        assert!(policy.is_expired_at(on));
    }

    #[test]
    fn test_hostname_is_normalized() {
        let policy = DomainPolicy::builder(" WWW.DataTheorem.com. ")
            .pins([pin(1), pin(2)])
            .build()
            .unwrap();
        assert_eq!(policy.hostname(), "www.datatheorem.com");
        assert!(policy.matches("www.datatheorem.com"));
        assert!(!policy.matches("a.www.datatheorem.com"));
    }
}
