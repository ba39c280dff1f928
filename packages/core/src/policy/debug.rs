//! Global `<debug-overrides>` settings: extra trust anchors and the pin bypass switch

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rustls::pki_types::CertificateDer;

use crate::errors::ConfigurationError;

/// Prefix of a `src` attribute pointing at a bundled raw resource
pub const RAW_RESOURCE_PREFIX: &str = "@raw/";

const RAW_RESOURCE_EXTENSIONS: [&str; 4] = ["", "pem", "crt", "der"];

/// Trust-anchor overrides collected from `<debug-overrides>`.
///
/// Only honored when the consuming application runs in debuggable mode; the
/// resolver drops them otherwise.
#[derive(Clone, Default)]
pub struct DebugOverrides {
    pub override_pins: bool,
    pub ca_certificates: Vec<CertificateDer<'static>>,
}

impl DebugOverrides {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.override_pins && self.ca_certificates.is_empty()
    }
}

impl fmt::Debug for DebugOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugOverrides")
            .field("override_pins", &self.override_pins)
            .field("ca_certificates", &self.ca_certificates.len())
            .finish()
    }
}

/// Loads the certificates named by a `@raw/<name>` reference
pub trait CertificateSource: Send + Sync {
    fn load(&self, name: &str) -> Result<Vec<CertificateDer<'static>>, ConfigurationError>;
}

/// Source that never yields certificates; every `@raw` reference is an error
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCertificates;

impl CertificateSource for NoCertificates {
    fn load(&self, name: &str) -> Result<Vec<CertificateDer<'static>>, ConfigurationError> {
        Err(ConfigurationError::DebugCertificate {
            src: format!("{RAW_RESOURCE_PREFIX}{name}"),
            reason: "no raw resource directory configured".to_string(),
        })
    }
}

/// Directory of raw resources; `@raw/ca` resolves to the first existing file among
/// `ca`, `ca.pem`, `ca.crt` and `ca.der`
#[derive(Debug, Clone)]
pub struct RawResourceDir {
    root: PathBuf,
}

impl RawResourceDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        RAW_RESOURCE_EXTENSIONS.iter().find_map(|ext| {
            let path = if ext.is_empty() {
                self.root.join(name)
            } else {
                self.root.join(format!("{name}.{ext}"))
            };
            path.is_file().then_some(path)
        })
    }
}

impl CertificateSource for RawResourceDir {
    fn load(&self, name: &str) -> Result<Vec<CertificateDer<'static>>, ConfigurationError> {
        let src = format!("{RAW_RESOURCE_PREFIX}{name}");
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(ConfigurationError::DebugCertificate {
                src,
                reason: "resource name must be a bare file name".to_string(),
            });
        }

        let path = self.locate(name).ok_or_else(|| ConfigurationError::DebugCertificate {
            src: src.clone(),
            reason: format!("not found under {}", self.root.display()),
        })?;
        let bytes = fs::read(&path).map_err(|e| ConfigurationError::DebugCertificate {
            src: src.clone(),
            reason: e.to_string(),
        })?;

        let certificates = decode_certificates(&bytes)
            .map_err(|reason| ConfigurationError::DebugCertificate { src, reason })?;
        tracing::debug!(
            "Loaded {} debug CA certificate(s) from {}",
            certificates.len(),
            path.display()
        );
        Ok(certificates)
    }
}

/// Decode a PEM bundle, or a single DER certificate when the bytes are not PEM
pub fn decode_certificates(bytes: &[u8]) -> Result<Vec<CertificateDer<'static>>, String> {
    let looks_like_pem = bytes
        .windows(b"-----BEGIN".len())
        .any(|window| window == b"-----BEGIN");

    if looks_like_pem {
        let blocks = pem::parse_many(bytes).map_err(|e| format!("invalid PEM: {e}"))?;
        let certificates: Vec<_> = blocks
            .into_iter()
            .filter(|block| block.tag() == "CERTIFICATE")
            .map(|block| CertificateDer::from(block.into_contents()))
            .collect();
        if certificates.is_empty() {
            return Err("PEM data contains no CERTIFICATE block".to_string());
        }
        return Ok(certificates);
    }

    x509_parser::parse_x509_certificate(bytes)
        .map_err(|e| format!("neither PEM nor DER X.509: {e}"))?;
    Ok(vec![CertificateDer::from(bytes.to_vec())])
}
