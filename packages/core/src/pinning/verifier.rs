//! rustls integration: a server certificate verifier that enforces pinning

use std::fmt;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, OtherError, SignatureScheme};
use x509_parser::prelude::*;

use super::baseline::BaselineValidator;
use super::evaluator::{Evaluation, HandshakeContext, TrustEvaluator};
use super::result::PinValidationResult;
use crate::policy::PublicKeyPin;

/// Prefix of the handshake error raised for an enforced pin mismatch
pub const PIN_FAILURE_PREFIX: &str = "Pin verification failed";

/// Verifier bound to one destination port; the hostname comes from the handshake's
/// `ServerName`
pub struct PinningServerCertVerifier {
    evaluator: Arc<TrustEvaluator>,
    baseline: Arc<dyn BaselineValidator>,
    port: u16,
    provider: Arc<CryptoProvider>,
}

impl PinningServerCertVerifier {
    pub fn new(
        evaluator: Arc<TrustEvaluator>,
        baseline: Arc<dyn BaselineValidator>,
        port: u16,
    ) -> Self {
        Self {
            evaluator,
            baseline,
            port,
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    fn verify_unpinnable(
        &self,
        hostname: &str,
        served: &[CertificateDer<'_>],
    ) -> Result<ServerCertVerified, rustls::Error> {
        tracing::debug!("{} cannot carry a pinning policy; baseline validation only", hostname);
        self.baseline
            .check_trusted(hostname, served)
            .map(|_| ServerCertVerified::assertion())
            .map_err(|e| {
                rustls::Error::InvalidCertificate(CertificateError::Other(OtherError(Arc::new(e))))
            })
    }
}

impl fmt::Debug for PinningServerCertVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinningServerCertVerifier")
            .field("port", &self.port)
            .field("policies", &self.evaluator.resolver().len())
            .finish_non_exhaustive()
    }
}

fn hostname_of(server_name: &ServerName<'_>) -> Result<String, rustls::Error> {
    match server_name {
        ServerName::DnsName(name) => Ok(name.as_ref().to_string()),
        ServerName::IpAddress(ip) => Ok(std::net::IpAddr::from(*ip).to_string()),
        other => Err(rustls::Error::General(format!("Unsupported server name {other:?}"))),
    }
}

fn pin_failure_message(hostname: &str, evaluation: &Evaluation) -> String {
    let mut message = format!("{PIN_FAILURE_PREFIX} for {hostname}\n  Configured pins: ");
    if let Some(policy) = &evaluation.policy {
        for pin in policy.pins() {
            message.push_str(&pin.to_base64());
            message.push(' ');
        }
    }
    message.push_str("\n  Peer certificate chain: ");
    for certificate in &evaluation.validated_chain {
        let pin = PublicKeyPin::from_certificate(certificate.as_ref())
            .map(|pin| pin.to_base64())
            .unwrap_or_else(|_| "<unparsable>".to_string());
        let issuer = X509Certificate::from_der(certificate.as_ref())
            .map(|(_, cert)| cert.issuer().to_string())
            .unwrap_or_default();
        message.push_str(&format!("\n    {pin} - {issuer}"));
    }
    message
}

impl ServerCertVerifier for PinningServerCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let hostname = hostname_of(server_name)?;
        let mut served = Vec::with_capacity(intermediates.len() + 1);
        served.push(end_entity.clone());
        served.extend(intermediates.iter().cloned());

        // rustls accepts DNS names (underscores, single labels) that no policy can name
        if self.evaluator.resolver().resolve(&hostname).is_err() {
            return self.verify_unpinnable(&hostname, &served);
        }

        let context = HandshakeContext::new(hostname, self.port);
        let evaluation = self
            .evaluator
            .evaluate_detailed(&context, &served, self.baseline.as_ref());

        match evaluation.verdict {
            PinValidationResult::Success => Ok(ServerCertVerified::assertion()),
            PinValidationResult::FailedCertificateChainNotTrusted => {
                let reason = evaluation
                    .baseline_error
                    .unwrap_or(crate::errors::BaselineError::NotTrusted(context.hostname));
                Err(rustls::Error::InvalidCertificate(CertificateError::Other(
                    OtherError(Arc::new(reason)),
                )))
            }
            PinValidationResult::ErrorInvalidParameters => Err(rustls::Error::General(format!(
                "Invalid parameters for certificate validation of {}",
                context.hostname
            ))),
            PinValidationResult::Failed
            | PinValidationResult::FailedUserDefinedTrustAnchor
            | PinValidationResult::ErrorCouldNotGenerateSpkiHash => {
                let message = pin_failure_message(&context.hostname, &evaluation);
                tracing::error!("{}", message);
                Err(rustls::Error::General(message))
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
