//! Assembled pinning layer: policies, evaluator, reporter and the rustls glue

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, ServerName};
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::config::TrustKitConfig;
use crate::errors::{InvalidHostname, TrustKitError};
use crate::pinning::{
    BaselineValidator, Evaluation, HandshakeContext, PinValidationResult, PinningServerCertVerifier,
    TrustEvaluator, WebPkiBaseline,
};
use crate::policy::{DomainPolicy, PolicyParser, PolicyResolver};
use crate::reporting::{FailureReporter, HyperReportSender, ReportSender};

/// One fully initialized pinning configuration.
///
/// Cheap to share behind an `Arc`; everything inside is immutable apart from the
/// reporter's rate limiter.
pub struct TrustKit {
    config: TrustKitConfig,
    evaluator: Arc<TrustEvaluator>,
    reporter: Arc<FailureReporter>,
    baseline: Arc<dyn BaselineValidator>,
}

impl std::fmt::Debug for TrustKit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustKit")
            .field("config", &self.config)
            .field("evaluator", &self.evaluator)
            .finish_non_exhaustive()
    }
}

impl TrustKit {
    /// Wire the given collaborators together
    pub fn new(
        config: TrustKitConfig,
        resolver: PolicyResolver,
        baseline: Arc<dyn BaselineValidator>,
        sender: Arc<dyn ReportSender>,
    ) -> Result<Self, TrustKitError> {
        config.validate()?;
        let reporter = Arc::new(FailureReporter::new(&config, sender));
        let evaluator = Arc::new(TrustEvaluator::new(Arc::new(resolver), Some(Arc::clone(&reporter))));
        tracing::info!(
            "Pinning configured for {} domain(s)",
            evaluator.resolver().len()
        );
        Ok(Self {
            config,
            evaluator,
            reporter,
            baseline,
        })
    }

    /// Platform baseline and hyper report sender for `resolver`
    pub fn with_platform_defaults(
        config: TrustKitConfig,
        resolver: PolicyResolver,
    ) -> Result<Self, TrustKitError> {
        let baseline = WebPkiBaseline::with_platform_roots(
            config.use_native_roots,
            resolver.debug_ca_certificates(),
        )?;
        let sender = HyperReportSender::with_platform_roots(
            config.use_native_roots,
            config.report_connect_timeout,
            config.report_timeout,
        )?;
        Self::new(config, resolver, Arc::new(baseline), Arc::new(sender))
    }

    /// Parse a `network-security-config` document and use the platform defaults
    pub fn from_policy_document(document: &str, config: TrustKitConfig) -> Result<Self, TrustKitError> {
        config.validate()?;
        let resolver = PolicyParser::new(config.parser_options()).parse(document)?;
        Self::with_platform_defaults(config, resolver)
    }

    /// Build from policies constructed in code; no debug overrides apply
    pub fn from_policies(policies: Vec<DomainPolicy>, config: TrustKitConfig) -> Result<Self, TrustKitError> {
        let resolver = PolicyResolver::new(policies, Default::default(), config.debuggable)?;
        Self::with_platform_defaults(config, resolver)
    }

    #[must_use]
    pub fn config(&self) -> &TrustKitConfig {
        &self.config
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<PolicyResolver> {
        self.evaluator.resolver()
    }

    #[must_use]
    pub fn evaluator(&self) -> &Arc<TrustEvaluator> {
        &self.evaluator
    }

    #[must_use]
    pub fn reporter(&self) -> &Arc<FailureReporter> {
        &self.reporter
    }

    #[must_use]
    pub fn baseline(&self) -> &Arc<dyn BaselineValidator> {
        &self.baseline
    }

    /// Policy applying to `hostname`
    pub fn policy_for(&self, hostname: &str) -> Result<Option<Arc<DomainPolicy>>, InvalidHostname> {
        self.resolver().resolve(hostname)
    }

    /// Evaluate a served chain with the configured baseline
    pub fn evaluate(&self, hostname: &str, port: u16, served: &[CertificateDer<'_>]) -> PinValidationResult {
        self.evaluate_detailed(hostname, port, served).verdict
    }

    pub fn evaluate_detailed(&self, hostname: &str, port: u16, served: &[CertificateDer<'_>]) -> Evaluation {
        let context = HandshakeContext::new(hostname, port);
        self.evaluator
            .evaluate_detailed(&context, served, self.baseline.as_ref())
    }

    /// Receive every failure report that passes rate limiting
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<Arc<crate::reporting::FailureReport>> {
        self.reporter.subscribe()
    }

    /// rustls verifier for connections to `port`
    #[must_use]
    pub fn server_cert_verifier(&self, port: u16) -> Arc<PinningServerCertVerifier> {
        Arc::new(PinningServerCertVerifier::new(
            Arc::clone(&self.evaluator),
            Arc::clone(&self.baseline),
            port,
        ))
    }

    /// Client configuration whose certificate verification enforces pinning
    pub fn client_config(&self, port: u16) -> Result<ClientConfig, TrustKitError> {
        let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| TrustKitError::Tls(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(self.server_cert_verifier(port))
            .with_no_client_auth();
        Ok(config)
    }

    /// Open a pinned TLS connection to `host:port`
    pub async fn connect(&self, host: &str, port: u16) -> Result<TlsStream<TcpStream>, TrustKitError> {
        let tcp_stream = tokio::time::timeout(
            self.config.report_connect_timeout,
            TcpStream::connect((host, port)),
        )
        .await
        .map_err(|_| TrustKitError::Connection(format!("Connection to {host}:{port} timed out")))?
        .map_err(|e| TrustKitError::Connection(format!("{host}:{port}: {e}")))?;

        let connector = TlsConnector::from(Arc::new(self.client_config(port)?));
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| TrustKitError::Tls(format!("Invalid hostname '{host}': {e}")))?;

        let tls_stream = connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| TrustKitError::Tls(format!("TLS handshake failed: {e}")))?;
        tracing::debug!("Pinned TLS connection established to {}:{}", host, port);
        Ok(tls_stream)
    }
}
