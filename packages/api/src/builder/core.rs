//! Builder state and assembly

use std::path::PathBuf;
use std::sync::Arc;

use trustpin_core::config::TrustKitConfig;
use trustpin_core::pinning::{BaselineValidator, WebPkiBaseline};
use trustpin_core::policy::{
    merge_override_pins, CertificateSource, DebugOverrides, DomainPolicyBuilder, PolicyParser,
    PolicyResolver,
};
use trustpin_core::reporting::{HyperReportSender, ReportSender};
use trustpin_core::{ConfigurationError, StateError, TrustKit, TrustKitError};

/// Fluent builder for [`TrustKit`]
///
/// Policies come from a `network-security-config` document, from domains declared
/// with [`domain`](Self::domain), or both. Every collaborator has a platform default:
/// the webpki baseline over the system roots and the hyper report sender.
///
/// # Examples
///
/// ```no_run
/// use trustpin::{PublicKeyPin, TrustKitBuilder};
///
/// # fn run() -> Result<(), trustpin::TrustKitError> {
/// let trustkit = TrustKitBuilder::new()
///     .domain("www.datatheorem.com", |domain| {
///         domain
///             .include_subdomains(true)
///             .enforce_pinning(true)
///             .pins([
///                 PublicKeyPin::from_digest([1; 32]),
///                 PublicKeyPin::from_digest([2; 32]),
///             ])
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct TrustKitBuilder {
    pub(crate) config: TrustKitConfig,
    pub(crate) documents: Vec<PolicySource>,
    pub(crate) domains: Vec<DomainPolicyBuilder>,
    pub(crate) baseline: Option<Arc<dyn BaselineValidator>>,
    pub(crate) sender: Option<Arc<dyn ReportSender>>,
    pub(crate) certificate_source: Option<Arc<dyn CertificateSource>>,
}

/// Where a policy document is read from
#[derive(Debug, Clone)]
pub(crate) enum PolicySource {
    Inline(String),
    File(PathBuf),
}

impl PolicySource {
    fn load(&self) -> Result<String, ConfigurationError> {
        match self {
            Self::Inline(document) => Ok(document.clone()),
            Self::File(path) => std::fs::read_to_string(path).map_err(|e| {
                ConfigurationError::Validation(format!(
                    "cannot read policy file {}: {e}",
                    path.display()
                ))
            }),
        }
    }
}

impl std::fmt::Debug for TrustKitBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustKitBuilder")
            .field("config", &self.config)
            .field("documents", &self.documents)
            .field("domains", &self.domains)
            .field("custom_baseline", &self.baseline.is_some())
            .field("custom_sender", &self.sender.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for TrustKitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustKitBuilder {
    /// Builder over the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TrustKitConfig::default())
    }

    /// Builder starting from an existing configuration
    #[must_use]
    pub fn with_config(config: TrustKitConfig) -> Self {
        Self {
            config,
            documents: Vec::new(),
            domains: Vec::new(),
            baseline: None,
            sender: None,
            certificate_source: None,
        }
    }

    /// Assemble the configured [`TrustKit`]
    ///
    /// # Errors
    ///
    /// Returns `TrustKitError::Configuration` if the configuration is invalid, a policy
    /// document cannot be read or parsed, a domain violates a policy rule, a domain is
    /// declared twice, or no domain is pinned at all. Returns `TrustKitError::Tls` if
    /// the default baseline or report sender cannot be created.
    pub fn build(self) -> Result<TrustKit, TrustKitError> {
        self.config.validate()?;

        let mut options = self.config.parser_options();
        if let Some(source) = self.certificate_source {
            options.certificate_source = source;
        }
        let parser = PolicyParser::new(options);

        let mut builders = Vec::new();
        let mut debug_overrides = DebugOverrides::default();
        let mut override_pins = None;
        for source in &self.documents {
            let parsed = parser.parse_builders(&source.load()?)?;
            builders.extend(parsed.builders);
            if let Some(declared) = parsed.declared_override_pins {
                override_pins = merge_override_pins(override_pins, declared);
            }
            debug_overrides
                .ca_certificates
                .extend(parsed.debug_overrides.ca_certificates);
        }
        debug_overrides.override_pins = override_pins.unwrap_or(false);
        let default_uri = self.config.default_report_uri.clone();
        builders.extend(
            self.domains
                .into_iter()
                .map(|domain| domain.default_report_uri(default_uri.clone())),
        );

        let policies = builders
            .into_iter()
            .map(DomainPolicyBuilder::build)
            .collect::<Result<Vec<_>, _>>()?;
        let resolver = PolicyResolver::new(policies, debug_overrides, self.config.debuggable)?;

        let baseline = match self.baseline {
            Some(baseline) => baseline,
            None => Arc::new(WebPkiBaseline::with_platform_roots(
                self.config.use_native_roots,
                resolver.debug_ca_certificates(),
            )?),
        };
        let sender = match self.sender {
            Some(sender) => sender,
            None => Arc::new(HyperReportSender::with_platform_roots(
                self.config.use_native_roots,
                self.config.report_connect_timeout,
                self.config.report_timeout,
            )?),
        };

        TrustKit::new(self.config, resolver, baseline, sender)
    }

    /// Build and install as the process-wide instance
    ///
    /// # Errors
    ///
    /// Fails with `StateError::AlreadyInitialized` before building anything if an
    /// instance is already installed, or with any error from [`build`](Self::build).
    pub fn init(self) -> Result<&'static TrustKit, TrustKitError> {
        if crate::is_initialized() {
            return Err(StateError::AlreadyInitialized.into());
        }
        let trustkit = self.build()?;
        Ok(crate::init(trustkit)?)
    }
}
