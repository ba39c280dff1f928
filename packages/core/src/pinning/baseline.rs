//! Baseline X.509 chain-of-trust validation

use std::sync::Arc;

use rustls::client::danger::ServerCertVerifier;
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::RootCertStore;

use super::chain::{build_validated_chain, RootIndex, ValidatedPath};
use crate::errors::{BaselineError, PinError, TrustKitError};
use crate::policy::PublicKeyPin;

/// Which trust store anchored a validated chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrustAnchorSource {
    /// Platform or bundled roots
    System,
    /// Debug CA certificates from the policy's debug overrides
    UserDefined,
}

/// Chain accepted by the baseline validator, leaf first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedChain {
    pub certificates: Vec<CertificateDer<'static>>,
    pub anchor: TrustAnchorSource,
    /// Pin of the anchor key when the anchor certificate is not in `certificates`
    pub anchor_key: Option<PublicKeyPin>,
}

impl ValidatedChain {
    pub fn new(certificates: Vec<CertificateDer<'static>>, anchor: TrustAnchorSource) -> Self {
        Self {
            certificates,
            anchor,
            anchor_key: None,
        }
    }

    pub fn system(certificates: Vec<CertificateDer<'static>>) -> Self {
        Self::new(certificates, TrustAnchorSource::System)
    }

    pub fn user_defined(certificates: Vec<CertificateDer<'static>>) -> Self {
        Self::new(certificates, TrustAnchorSource::UserDefined)
    }

    fn from_path(path: ValidatedPath, anchor: TrustAnchorSource) -> Self {
        Self {
            certificates: path.certificates,
            anchor,
            anchor_key: path.anchor_key,
        }
    }

    /// Pins of every key on the path, leaf first, anchor key last
    pub fn pins(&self) -> Result<Vec<PublicKeyPin>, PinError> {
        let mut pins = self
            .certificates
            .iter()
            .map(|cert| PublicKeyPin::from_certificate(cert.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        pins.extend(self.anchor_key);
        Ok(pins)
    }
}

/// Platform chain validation: decides whether a served chain is trusted for `hostname`
/// and returns the path that was validated
pub trait BaselineValidator: Send + Sync {
    fn check_trusted(
        &self,
        hostname: &str,
        served: &[CertificateDer<'_>],
    ) -> Result<ValidatedChain, BaselineError>;
}

impl<F> BaselineValidator for F
where
    F: Fn(&str, &[CertificateDer<'_>]) -> Result<ValidatedChain, BaselineError> + Send + Sync,
{
    fn check_trusted(
        &self,
        hostname: &str,
        served: &[CertificateDer<'_>],
    ) -> Result<ValidatedChain, BaselineError> {
        self(hostname, served)
    }
}

/// Load the OS trust store, falling back to `webpki-roots`.
///
/// Returns the root store and the full root certificates that were available. The
/// bundled roots only carry anchor names and keys.
pub fn load_system_roots(use_native_roots: bool) -> (RootCertStore, Vec<CertificateDer<'static>>) {
    let mut root_store = RootCertStore::empty();
    let mut known = Vec::new();

    if use_native_roots {
        let cert_result = rustls_native_certs::load_native_certs();
        for err in &cert_result.errors {
            tracing::warn!("Certificate load error: {}", err);
        }
        for cert in cert_result.certs {
            match root_store.add(cert.clone()) {
                Ok(()) => known.push(cert),
                Err(e) => tracing::warn!("Failed to add system certificate: {}", e),
            }
        }
        tracing::debug!("Loaded {} system certificates", root_store.len());
    }

    if root_store.is_empty() {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        tracing::debug!("Using {} bundled webpki roots", root_store.len());
    }

    (root_store, known)
}

fn build_verifier(roots: RootCertStore) -> Result<Arc<WebPkiServerVerifier>, TrustKitError> {
    WebPkiServerVerifier::builder_with_provider(
        Arc::new(roots),
        Arc::new(rustls::crypto::ring::default_provider()),
    )
    .build()
    .map_err(|e| TrustKitError::Tls(format!("Failed to create webpki verifier: {e}")))
}

/// rustls/webpki baseline over the system roots, with the debug CAs as a second
/// trust store
#[derive(Debug)]
pub struct WebPkiBaseline {
    system: Arc<WebPkiServerVerifier>,
    system_roots: RootIndex,
    user: Option<(Arc<WebPkiServerVerifier>, RootIndex)>,
}

impl WebPkiBaseline {
    pub fn new(
        system_roots: RootCertStore,
        known_system_certs: Vec<CertificateDer<'static>>,
        debug_ca_certificates: &[CertificateDer<'static>],
    ) -> Result<Self, TrustKitError> {
        let system_index = RootIndex::from_store(&system_roots, &known_system_certs);
        let system = build_verifier(system_roots)?;

        let user = if debug_ca_certificates.is_empty() {
            None
        } else {
            let mut user_roots = RootCertStore::empty();
            for cert in debug_ca_certificates {
                if let Err(e) = user_roots.add(cert.clone()) {
                    tracing::warn!("Failed to add debug CA certificate: {}", e);
                }
            }
            if user_roots.is_empty() {
                None
            } else {
                tracing::info!("Trusting {} debug CA certificate(s)", user_roots.len());
                Some((
                    build_verifier(user_roots)?,
                    RootIndex::new(debug_ca_certificates.iter().cloned()),
                ))
            }
        };

        Ok(Self {
            system,
            system_roots: system_index,
            user,
        })
    }

    /// System roots (native, else bundled) plus the given debug CAs
    pub fn with_platform_roots(
        use_native_roots: bool,
        debug_ca_certificates: &[CertificateDer<'static>],
    ) -> Result<Self, TrustKitError> {
        let (roots, known) = load_system_roots(use_native_roots);
        Self::new(roots, known, debug_ca_certificates)
    }

    /// Trust exactly the given roots; used for private PKIs and tests
    pub fn with_roots(roots: &[CertificateDer<'static>]) -> Result<Self, TrustKitError> {
        let mut store = RootCertStore::empty();
        for cert in roots {
            store
                .add(cert.clone())
                .map_err(|e| TrustKitError::Tls(format!("Invalid root certificate: {e}")))?;
        }
        Self::new(store, roots.to_vec(), &[])
    }

    #[must_use]
    pub fn has_user_anchors(&self) -> bool {
        self.user.is_some()
    }
}

impl BaselineValidator for WebPkiBaseline {
    fn check_trusted(
        &self,
        hostname: &str,
        served: &[CertificateDer<'_>],
    ) -> Result<ValidatedChain, BaselineError> {
        let Some((end_entity, intermediates)) = served.split_first() else {
            return Err(BaselineError::EmptyChain);
        };
        let server_name = ServerName::try_from(hostname.to_string())
            .map_err(|e| BaselineError::InvalidServerName(format!("{hostname}: {e}")))?;
        let now = UnixTime::now();

        let system_error =
            match self
                .system
                .verify_server_cert(end_entity, intermediates, &server_name, &[], now)
            {
                Ok(_) => {
                    return Ok(ValidatedChain::from_path(
                        build_validated_chain(served, &self.system_roots),
                        TrustAnchorSource::System,
                    ))
                }
                Err(e) => e,
            };

        if let Some((verifier, roots)) = &self.user {
            if verifier
                .verify_server_cert(end_entity, intermediates, &server_name, &[], now)
                .is_ok()
            {
                tracing::debug!("Chain for {} anchored by a debug CA certificate", hostname);
                return Ok(ValidatedChain::from_path(
                    build_validated_chain(served, roots),
                    TrustAnchorSource::UserDefined,
                ));
            }
        }

        Err(BaselineError::NotTrusted(system_error.to_string()))
    }
}
