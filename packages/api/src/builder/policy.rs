//! Policy sources and collaborators

use std::path::PathBuf;
use std::sync::Arc;

use trustpin_core::pinning::BaselineValidator;
use trustpin_core::policy::{CertificateSource, DomainPolicyBuilder};
use trustpin_core::reporting::ReportSender;

use super::core::{PolicySource, TrustKitBuilder};

impl TrustKitBuilder {
    /// Add a `network-security-config` document
    ///
    /// May be called more than once; a domain defined in two documents is rejected at
    /// build time.
    #[must_use]
    pub fn policy_document(mut self, document: impl Into<String>) -> Self {
        self.documents.push(PolicySource::Inline(document.into()));
        self
    }

    /// Add a `network-security-config` document read at build time
    #[must_use]
    pub fn policy_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.documents.push(PolicySource::File(path.into()));
        self
    }

    /// Pin a domain in code
    ///
    /// `configure` receives a fresh [`DomainPolicyBuilder`]; the configured default
    /// report URI is applied when the TrustKit is built.
    #[must_use]
    pub fn domain<F>(mut self, hostname: impl Into<String>, configure: F) -> Self
    where
        F: FnOnce(DomainPolicyBuilder) -> DomainPolicyBuilder,
    {
        self.domains.push(configure(DomainPolicyBuilder::new(hostname)));
        self
    }

    /// Replace the webpki baseline validator
    #[must_use]
    pub fn baseline(mut self, baseline: Arc<dyn BaselineValidator>) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// Replace the hyper report sender
    #[must_use]
    pub fn report_sender(mut self, sender: Arc<dyn ReportSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Resolve `@raw/<name>` debug certificates through `source`
    #[must_use]
    pub fn certificate_source(mut self, source: Arc<dyn CertificateSource>) -> Self {
        self.certificate_source = Some(source);
        self
    }
}
