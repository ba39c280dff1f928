//! `network-security-config` policy document parser
//!
//! The document is a tree of nestable `domain-config` nodes. Each node is read into a
//! partial [`PolicySettings`] record, merged with its parent's already merged record,
//! and turned into one [`DomainPolicyBuilder`] per `<domain>` child. Nodes with no
//! pin-set anywhere on their ancestor path produce no builder.

use std::sync::Arc;

use chrono::NaiveDate;
use roxmltree::{Document, Node};
use url::Url;

use super::debug::{CertificateSource, DebugOverrides, NoCertificates, RAW_RESOURCE_PREFIX};
use super::domain::{default_report_uri, DomainPolicyBuilder, PolicySettings};
use super::pin::PublicKeyPin;
use super::resolver::PolicyResolver;
use crate::errors::ConfigurationError;

const ROOT_TAG: &str = "network-security-config";
const DOMAIN_CONFIG_TAG: &str = "domain-config";
const DOMAIN_TAG: &str = "domain";
const PIN_SET_TAG: &str = "pin-set";
const PIN_TAG: &str = "pin";
const TRUSTKIT_CONFIG_TAG: &str = "trustkit-config";
const REPORT_URI_TAG: &str = "report-uri";
const DEBUG_OVERRIDES_TAG: &str = "debug-overrides";
const CERTIFICATES_TAG: &str = "certificates";

const SUPPORTED_DIGEST: &str = "SHA-256";
const EXPIRATION_FORMAT: &str = "%Y-%m-%d";

/// Settings that shape how a document is turned into policies
#[derive(Clone)]
pub struct ParserOptions {
    /// Collector added to every policy that does not disable it
    pub default_report_uri: Option<Url>,
    /// Whether `<debug-overrides>` are honored
    pub debuggable: bool,
    /// Where `@raw/<name>` debug certificates are read from
    pub certificate_source: Arc<dyn CertificateSource>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            default_report_uri: Some(default_report_uri()),
            debuggable: false,
            certificate_source: Arc::new(NoCertificates),
        }
    }
}

impl std::fmt::Debug for ParserOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserOptions")
            .field("default_report_uri", &self.default_report_uri.as_ref().map(Url::as_str))
            .field("debuggable", &self.debuggable)
            .finish_non_exhaustive()
    }
}

/// Unresolved output of a parse: builders in document order plus debug overrides
#[derive(Debug, Clone, Default)]
pub struct ParsedPolicy {
    pub builders: Vec<DomainPolicyBuilder>,
    pub debug_overrides: DebugOverrides,
    /// `overridePins` as declared by the document's debug certificates, `None` when
    /// there are none
    pub declared_override_pins: Option<bool>,
}

/// Fold one more `overridePins` declaration into `current`.
///
/// Only one value is supported for the whole process: disagreeing declarations
/// resolve to `false`.
#[must_use]
pub fn merge_override_pins(current: Option<bool>, next: bool) -> Option<bool> {
    match current {
        Some(previous) if previous != next => {
            tracing::warn!(
                "Different values for overridePins are set in the policy but only one \
                 value is supported; using overridePins=false for all connections"
            );
            Some(false)
        }
        _ => Some(next),
    }
}

/// Parser for policy documents
#[derive(Debug, Clone, Default)]
pub struct PolicyParser {
    options: ParserOptions,
}

impl PolicyParser {
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Parse `document` and build the resolver
    pub fn parse(&self, document: &str) -> Result<PolicyResolver, ConfigurationError> {
        let parsed = self.parse_builders(document)?;
        let policies = parsed
            .builders
            .into_iter()
            .map(DomainPolicyBuilder::build)
            .collect::<Result<Vec<_>, _>>()?;
        PolicyResolver::new(policies, parsed.debug_overrides, self.options.debuggable)
    }

    /// Parse `document` without validating the resulting policies
    pub fn parse_builders(&self, document: &str) -> Result<ParsedPolicy, ConfigurationError> {
        let doc = Document::parse(document)
            .map_err(|e| ConfigurationError::MalformedDocument(e.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != ROOT_TAG {
            return Err(ConfigurationError::MalformedDocument(format!(
                "expected <{ROOT_TAG}> root element, found <{}>",
                root.tag_name().name()
            )));
        }

        let mut parsed = ParsedPolicy::default();
        let mut override_pins: Option<bool> = None;

        for child in root.children().filter(Node::is_element) {
            match child.tag_name().name() {
                DOMAIN_CONFIG_TAG => {
                    self.read_domain_config(child, &PolicySettings::default(), &mut parsed.builders)?;
                }
                DEBUG_OVERRIDES_TAG => {
                    self.read_debug_overrides(child, &mut override_pins, &mut parsed.debug_overrides)?;
                }
                other => tracing::debug!("Ignoring <{}> in policy document", other),
            }
        }

        parsed.debug_overrides.override_pins = override_pins.unwrap_or(false);
        parsed.declared_override_pins = override_pins;
        tracing::debug!(
            "Parsed {} domain builder(s) from policy document",
            parsed.builders.len()
        );
        Ok(parsed)
    }

    fn read_domain_config(
        &self,
        node: Node<'_, '_>,
        parent: &PolicySettings,
        builders: &mut Vec<DomainPolicyBuilder>,
    ) -> Result<(), ConfigurationError> {
        let mut local = PolicySettings::default();
        let mut domains: Vec<(String, Option<bool>)> = Vec::new();
        let mut nested: Vec<Node<'_, '_>> = Vec::new();

        for child in node.children().filter(Node::is_element) {
            match child.tag_name().name() {
                DOMAIN_TAG => {
                    let include_subdomains = optional_bool(child, "includeSubdomains")?;
                    domains.push((element_text(child), include_subdomains));
                    if include_subdomains.is_some() {
                        local.include_subdomains = include_subdomains;
                    }
                }
                PIN_SET_TAG => read_pin_set(child, &mut local)?,
                TRUSTKIT_CONFIG_TAG => read_trustkit_config(child, &mut local)?,
                DOMAIN_CONFIG_TAG => nested.push(child),
                other => tracing::trace!("Ignoring <{}> inside <{}>", other, DOMAIN_CONFIG_TAG),
            }
        }

        if domains.is_empty() {
            return Err(ConfigurationError::MalformedDocument(format!(
                "<{DOMAIN_CONFIG_TAG}> without a <{DOMAIN_TAG}> element"
            )));
        }

        let merged = local.merged_over(parent);
        if merged.has_pin_set() {
            for (hostname, include_subdomains) in domains {
                let mut settings = merged.clone();
                settings.include_subdomains = include_subdomains.or(parent.include_subdomains);
                builders.push(
                    DomainPolicyBuilder::new(hostname)
                        .with_settings(settings)
                        .default_report_uri(self.options.default_report_uri.clone()),
                );
            }
        } else {
            tracing::debug!(
                "Skipping <{}> for {:?}: no pin-set declared",
                DOMAIN_CONFIG_TAG,
                domains.iter().map(|(host, _)| host.as_str()).collect::<Vec<_>>()
            );
        }

        for child in nested {
            self.read_domain_config(child, &merged, builders)?;
        }
        Ok(())
    }

    fn read_debug_overrides(
        &self,
        node: Node<'_, '_>,
        override_pins: &mut Option<bool>,
        overrides: &mut DebugOverrides,
    ) -> Result<(), ConfigurationError> {
        let certificates = node
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == CERTIFICATES_TAG);

        for entry in certificates {
            let current = optional_bool(entry, "overridePins")?.unwrap_or(false);
            *override_pins = merge_override_pins(*override_pins, current);

            let src = entry.attribute("src").unwrap_or_default().trim();
            match src {
                "system" | "user" => tracing::info!(
                    "Ignoring <{}> src={}: only @raw debug certificates are supported",
                    CERTIFICATES_TAG,
                    src
                ),
                _ => match src.strip_prefix(RAW_RESOURCE_PREFIX) {
                    Some(name) => {
                        let loaded = self.options.certificate_source.load(name)?;
                        overrides.ca_certificates.extend(loaded);
                    }
                    None => {
                        return Err(ConfigurationError::DebugCertificate {
                            src: src.to_string(),
                            reason: "expected @raw/<name>, system or user".to_string(),
                        })
                    }
                },
            }
        }
        Ok(())
    }
}

fn read_pin_set(node: Node<'_, '_>, settings: &mut PolicySettings) -> Result<(), ConfigurationError> {
    if let Some(expiration) = node.attribute("expiration") {
        let date = NaiveDate::parse_from_str(expiration.trim(), EXPIRATION_FORMAT)
            .map_err(|_| ConfigurationError::InvalidExpirationDate(expiration.to_string()))?;
        settings.expiration_date = Some(date);
    }

    let mut pins = settings.pins.take().unwrap_or_default();
    for pin in node
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == PIN_TAG)
    {
        match pin.attribute("digest") {
            Some(SUPPORTED_DIGEST) => {}
            Some(other) => return Err(ConfigurationError::UnsupportedDigest(other.to_string())),
            None => return Err(ConfigurationError::UnsupportedDigest("<missing>".to_string())),
        }
        pins.insert(PublicKeyPin::from_base64(&element_text(pin))?);
    }
    settings.pins = Some(pins);
    Ok(())
}

fn read_trustkit_config(
    node: Node<'_, '_>,
    settings: &mut PolicySettings,
) -> Result<(), ConfigurationError> {
    settings.enforce_pinning = Some(optional_bool(node, "enforcePinning")?.unwrap_or(false));
    if let Some(disable) = optional_bool(node, "disableDefaultReportUri")? {
        settings.disable_default_report_uri = Some(disable);
    }

    let mut uris = settings.report_uris.take().unwrap_or_default();
    for entry in node
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == REPORT_URI_TAG)
    {
        uris.insert(parse_report_uri(&element_text(entry))?);
    }
    settings.report_uris = Some(uris);
    Ok(())
}

/// Report collectors must be absolute http(s) URLs
pub fn parse_report_uri(raw: &str) -> Result<Url, ConfigurationError> {
    let uri = Url::parse(raw.trim()).map_err(|e| ConfigurationError::InvalidReportUri {
        uri: raw.to_string(),
        reason: e.to_string(),
    })?;
    match uri.scheme() {
        "http" | "https" => Ok(uri),
        scheme => Err(ConfigurationError::InvalidReportUri {
            uri: raw.to_string(),
            reason: format!("unsupported scheme {scheme}"),
        }),
    }
}

fn optional_bool(node: Node<'_, '_>, attribute: &'static str) -> Result<Option<bool>, ConfigurationError> {
    node.attribute(attribute)
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ConfigurationError::InvalidAttribute {
                attribute,
                value: value.to_string(),
            }),
        })
        .transpose()
}

fn element_text(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIN_A: &str = "grX4Ta9HpZx6tSHkmCrvpApTQGo67CYDnvprLg5yRME=";
    const PIN_B: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

    fn parse_builders(xml: &str) -> Result<ParsedPolicy, ConfigurationError> {
        PolicyParser::default().parse_builders(xml)
    }

    #[test]
    fn test_rejects_wrong_root() {
        let err = parse_builders("<network-config/>").unwrap_err();
        assert!(matches!(err, ConfigurationError::MalformedDocument(_)));
    }

    #[test]
    fn test_rejects_malformed_xml() {
        let err = parse_builders("<network-security-config>").unwrap_err();
        assert!(matches!(err, ConfigurationError::MalformedDocument(_)));
    }

    #[test]
    fn test_rejects_unsupported_digest() {
        let xml = format!(
            r#"<network-security-config><domain-config>
                <domain>www.datatheorem.com</domain>
                <pin-set><pin digest="SHA-1">{PIN_A}</pin></pin-set>
            </domain-config></network-security-config>"#
        );
        let err = parse_builders(&xml).unwrap_err();
        assert!(err.to_string().starts_with("Unexpected digest value"), "{err}");
    }

    #[test]
    fn test_rejects_bad_expiration_date() {
        let xml = format!(
            r#"<network-security-config><domain-config>
                <domain>www.datatheorem.com</domain>
                <pin-set expiration="01/01/2018"><pin digest="SHA-256">{PIN_A}</pin></pin-set>
            </domain-config></network-security-config>"#
        );
        let err = parse_builders(&xml).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidExpirationDate(_)));
    }

    #[test]
    fn test_rejects_non_boolean_attribute() {
        let xml = format!(
            r#"<network-security-config><domain-config>
                <domain includeSubdomains="yes">www.datatheorem.com</domain>
                <pin-set><pin digest="SHA-256">{PIN_A}</pin></pin-set>
            </domain-config></network-security-config>"#
        );
        let err = parse_builders(&xml).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidAttribute { attribute: "includeSubdomains", .. }
        ));
    }

    #[test]
    fn test_node_without_pin_set_yields_no_builder() {
        let xml = format!(
            r#"<network-security-config>
                <domain-config><domain>localhost</domain></domain-config>
                <domain-config>
                    <domain>www.datatheorem.com</domain>
                    <pin-set><pin digest="SHA-256">{PIN_A}</pin></pin-set>
                </domain-config>
            </network-security-config>"#
        );
        let parsed = parse_builders(&xml).unwrap();
        assert_eq!(parsed.builders.len(), 1);
        assert_eq!(parsed.declared_override_pins, None);
    }

    #[test]
    fn test_nested_node_inherits_parent_settings() {
        let xml = format!(
            r#"<network-security-config>
                <domain-config>
                    <domain includeSubdomains="true">datatheorem.com</domain>
                    <pin-set expiration="2099-01-01">
                        <pin digest="SHA-256">{PIN_A}</pin>
                        <pin digest="SHA-256">{PIN_B}</pin>
                    </pin-set>
                    <trustkit-config enforcePinning="true" disableDefaultReportUri="true">
                        <report-uri>https://report.datatheorem.com/log</report-uri>
                    </trustkit-config>
                    <domain-config>
                        <domain>other.datatheorem.com</domain>
                    </domain-config>
                </domain-config>
            </network-security-config>"#
        );
        let parsed = parse_builders(&xml).unwrap();
        let policies: Vec<_> = parsed
            .builders
            .into_iter()
            .map(|b| b.build().unwrap())
            .collect();
        assert_eq!(policies.len(), 2);

        let child = &policies[1];
        assert_eq!(child.hostname(), "other.datatheorem.com");
        assert!(child.enforce_pinning());
        assert!(child.include_subdomains());
        assert_eq!(child.pins().len(), 2);
        assert_eq!(child.expiration_date(), NaiveDate::from_ymd_opt(2099, 1, 1));
        assert_eq!(child.report_uris().len(), 1);
    }

    #[test]
    fn test_conflicting_override_pins_falls_back_to_false() {
        let xml = r#"<network-security-config>
                <debug-overrides><trust-anchors>
                    <certificates src="user" overridePins="true"/>
                    <certificates src="system" overridePins="false"/>
                </trust-anchors></debug-overrides>
            </network-security-config>"#;
        let parsed = parse_builders(xml).unwrap();
        assert!(!parsed.debug_overrides.override_pins);
        assert_eq!(parsed.declared_override_pins, Some(false));
        assert!(parsed.debug_overrides.ca_certificates.is_empty());
    }

    #[test]
    fn test_override_pins_merge_rule() {
        assert_eq!(merge_override_pins(None, true), Some(true));
        assert_eq!(merge_override_pins(Some(true), true), Some(true));
        assert_eq!(merge_override_pins(Some(true), false), Some(false));
        assert_eq!(merge_override_pins(Some(false), true), Some(false));
    }

    #[test]
    fn test_consistent_override_pins_is_kept() {
        let xml = r#"<network-security-config>
                <debug-overrides><trust-anchors>
                    <certificates src="user" overridePins="true"/>
                    <certificates src="system" overridePins="true"/>
                </trust-anchors></debug-overrides>
            </network-security-config>"#;
        let parsed = parse_builders(xml).unwrap();
        assert!(parsed.debug_overrides.override_pins);
    }

    #[test]
    fn test_raw_certificate_without_source_is_an_error() {
        let xml = r#"<network-security-config>
                <debug-overrides><trust-anchors>
                    <certificates src="@raw/debugca"/>
                </trust-anchors></debug-overrides>
            </network-security-config>"#;
        let err = parse_builders(xml).unwrap_err();
        assert!(matches!(err, ConfigurationError::DebugCertificate { .. }));
    }

    #[test]
    fn test_report_uri_must_be_http() {
        assert!(parse_report_uri("https://report.datatheorem.com/log").is_ok());
        assert!(parse_report_uri("ftp://report.datatheorem.com/log").is_err());
        assert!(parse_report_uri("not a url").is_err());
    }
}
