//! Pin validation decision procedure
//!
//! One evaluation per handshake: baseline trust, policy lookup, override and expiry
//! checks, then the pin set intersection on the validated chain. Failures on pinned
//! domains are handed to the [`FailureReporter`], which runs off the calling thread.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustls::pki_types::CertificateDer;

use super::baseline::{BaselineValidator, TrustAnchorSource, ValidatedChain};
use super::result::PinValidationResult;
use crate::errors::BaselineError;
use crate::policy::{DomainPolicy, PolicyResolver};
use crate::reporting::FailureReporter;

/// Per-handshake inputs that the certificate callback does not carry itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeContext {
    pub hostname: String,
    pub port: u16,
}

impl HandshakeContext {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }
}

/// Full outcome of one evaluation
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Verdict the connection should act on
    pub verdict: PinValidationResult,
    /// Verdict before report-only policies downgrade it to `Success`
    pub raw_verdict: PinValidationResult,
    pub policy: Option<Arc<DomainPolicy>>,
    pub validated_chain: Vec<CertificateDer<'static>>,
    pub baseline_error: Option<BaselineError>,
}

impl Evaluation {
    fn unpinned(verdict: PinValidationResult, validated_chain: Vec<CertificateDer<'static>>) -> Self {
        Self {
            verdict,
            raw_verdict: verdict,
            policy: None,
            validated_chain,
            baseline_error: None,
        }
    }

    fn pinned(
        verdict: PinValidationResult,
        raw_verdict: PinValidationResult,
        policy: Arc<DomainPolicy>,
        validated_chain: Vec<CertificateDer<'static>>,
    ) -> Self {
        Self {
            verdict,
            raw_verdict,
            policy: Some(policy),
            validated_chain,
            baseline_error: None,
        }
    }
}

/// Shared across handshakes; holds no per-connection state
#[derive(Debug, Clone)]
pub struct TrustEvaluator {
    resolver: Arc<PolicyResolver>,
    reporter: Option<Arc<FailureReporter>>,
}

impl TrustEvaluator {
    pub fn new(resolver: Arc<PolicyResolver>, reporter: Option<Arc<FailureReporter>>) -> Self {
        Self { resolver, reporter }
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<PolicyResolver> {
        &self.resolver
    }

    #[must_use]
    pub fn reporter(&self) -> Option<&Arc<FailureReporter>> {
        self.reporter.as_ref()
    }

    /// Verdict for `served` presented by `context.hostname`
    pub fn evaluate(
        &self,
        context: &HandshakeContext,
        served: &[CertificateDer<'_>],
        baseline: &dyn BaselineValidator,
    ) -> PinValidationResult {
        self.evaluate_detailed(context, served, baseline).verdict
    }

    pub fn evaluate_detailed(
        &self,
        context: &HandshakeContext,
        served: &[CertificateDer<'_>],
        baseline: &dyn BaselineValidator,
    ) -> Evaluation {
        self.evaluate_at(context, served, baseline, Utc::now())
    }

    /// Evaluation with an explicit clock, for expiry checks
    pub fn evaluate_at(
        &self,
        context: &HandshakeContext,
        served: &[CertificateDer<'_>],
        baseline: &dyn BaselineValidator,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let hostname = context.hostname.as_str();

        if served.is_empty() {
            tracing::warn!("Empty certificate chain presented by {}", hostname);
            return Evaluation::unpinned(PinValidationResult::ErrorInvalidParameters, Vec::new());
        }

        let policy = match self.resolver.resolve(hostname) {
            Ok(policy) => policy,
            Err(e) => {
                tracing::warn!("{}", e);
                return Evaluation::unpinned(PinValidationResult::ErrorInvalidParameters, Vec::new());
            }
        };

        let validated = match baseline.check_trusted(hostname, served) {
            Ok(validated) => validated,
            Err(e) => {
                tracing::warn!("Certificate validation failed for {}: {}", hostname, e);
                let served_owned: Vec<_> = served.iter().map(|c| c.clone().into_owned()).collect();
                let verdict = PinValidationResult::FailedCertificateChainNotTrusted;
                let mut evaluation = match policy {
                    Some(policy) => {
                        self.report(context, served, &served_owned, &policy, verdict);
                        Evaluation::pinned(verdict, verdict, policy, served_owned)
                    }
                    None => Evaluation::unpinned(verdict, served_owned),
                };
                evaluation.baseline_error = Some(e);
                return evaluation;
            }
        };

        let Some(policy) = policy else {
            return Evaluation::unpinned(PinValidationResult::Success, validated.certificates);
        };

        if self.resolver.should_override_pins() {
            tracing::debug!("Pin validation for {} skipped by debug overrides", hostname);
            return Evaluation::pinned(
                PinValidationResult::Success,
                PinValidationResult::Success,
                policy,
                validated.certificates,
            );
        }

        if policy.is_expired_at(now) {
            tracing::debug!(
                "Pinning policy for {} expired on {:?}; skipping pin validation",
                policy.hostname(),
                policy.expiration_date()
            );
            return Evaluation::pinned(
                PinValidationResult::Success,
                PinValidationResult::Success,
                policy,
                validated.certificates,
            );
        }

        if policy.pins().is_empty() {
            return Evaluation::pinned(
                PinValidationResult::Success,
                PinValidationResult::Success,
                policy,
                validated.certificates,
            );
        }

        let raw_verdict = match chain_matches_pins(&validated, &policy) {
            Ok(true) => {
                tracing::debug!("Pin validation succeeded for {}", hostname);
                return Evaluation::pinned(
                    PinValidationResult::Success,
                    PinValidationResult::Success,
                    policy,
                    validated.certificates,
                );
            }
            Ok(false) => match validated.anchor {
                TrustAnchorSource::System => PinValidationResult::Failed,
                TrustAnchorSource::UserDefined => PinValidationResult::FailedUserDefinedTrustAnchor,
            },
            Err(e) => {
                tracing::error!("Could not compute pins for {}: {}", hostname, e);
                PinValidationResult::ErrorCouldNotGenerateSpkiHash
            }
        };

        tracing::warn!(
            "Pin validation failed for {} (policy {}): {}",
            hostname,
            policy.hostname(),
            raw_verdict
        );
        self.report(context, served, &validated.certificates, &policy, raw_verdict);

        let verdict = match raw_verdict {
            PinValidationResult::FailedUserDefinedTrustAnchor => PinValidationResult::Success,
            _ if !policy.enforce_pinning() => PinValidationResult::Success,
            other => other,
        };
        Evaluation::pinned(verdict, raw_verdict, policy, validated.certificates)
    }

    fn report(
        &self,
        context: &HandshakeContext,
        served: &[CertificateDer<'_>],
        validated: &[CertificateDer<'_>],
        policy: &DomainPolicy,
        verdict: PinValidationResult,
    ) {
        if let Some(reporter) = &self.reporter {
            reporter.pin_validation_failed(
                &context.hostname,
                context.port,
                served,
                validated,
                policy,
                verdict,
            );
        }
    }
}

/// Whether any key on the validated path carries one of the policy's pins
fn chain_matches_pins(
    chain: &ValidatedChain,
    policy: &DomainPolicy,
) -> Result<bool, crate::errors::PinError> {
    Ok(chain.pins()?.iter().any(|pin| policy.pins().contains(pin)))
}
