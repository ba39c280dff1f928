//! Subject Public Key Info pins
//!
//! A pin is the SHA-256 digest of a certificate's DER-encoded Subject Public Key Info,
//! exchanged as standard base64 (RFC 7469). Equality is on the digest bytes, so two
//! pins decoded from differently padded or whitespace-wrapped strings compare equal.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::digest::{digest, SHA256};
use x509_parser::prelude::*;

use crate::errors::PinError;

/// Length of a SHA-256 digest
pub const PIN_LENGTH: usize = 32;

/// Base64-encoded SHA-256 hash of a certificate's SPKI
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKeyPin {
    digest: [u8; PIN_LENGTH],
}

impl PublicKeyPin {
    /// Hash the SPKI of a DER-encoded X.509 certificate
    pub fn from_certificate(cert_der: &[u8]) -> Result<Self, PinError> {
        let (_, cert) = X509Certificate::from_der(cert_der)
            .map_err(|e| PinError::Spki(format!("failed to parse certificate: {e}")))?;
        Ok(Self::from_spki(cert.public_key().raw))
    }

    /// Hash raw DER-encoded `SubjectPublicKeyInfo` bytes
    #[must_use]
    pub fn from_spki(spki_der: &[u8]) -> Self {
        let hash = digest(&SHA256, spki_der);
        let mut bytes = [0u8; PIN_LENGTH];
        bytes.copy_from_slice(hash.as_ref());
        Self { digest: bytes }
    }

    /// Decode a pre-computed base64 pin, as found in a `<pin digest="SHA-256">` element
    pub fn from_base64(encoded: &str) -> Result<Self, PinError> {
        let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| PinError::Encoding(e.to_string()))?;
        let digest: [u8; PIN_LENGTH] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| PinError::Length(decoded.len()))?;
        Ok(Self { digest })
    }

    #[inline]
    #[must_use]
    pub fn from_digest(digest: [u8; PIN_LENGTH]) -> Self {
        Self { digest }
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PIN_LENGTH] {
        &self.digest
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.digest)
    }

    /// HPKP header form used in reports: `pin-sha256="<base64>"`
    #[must_use]
    pub fn to_hpkp_directive(&self) -> String {
        format!("pin-sha256=\"{}\"", self.to_base64())
    }
}

impl FromStr for PublicKeyPin {
    type Err = PinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl fmt::Display for PublicKeyPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for PublicKeyPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKeyPin").field(&self.to_base64()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed_der() -> Vec<u8> {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["www.datatheorem.com".to_string()]).unwrap();
        params.self_signed(&key_pair).unwrap().der().to_vec()
    }

    #[test]
    fn test_certificate_pin_matches_encoded_pin() {
        let der = self_signed_der();
        let (_, cert) = X509Certificate::from_der(&der).unwrap();
        let expected = STANDARD.encode(digest(&SHA256, cert.public_key().raw));

        let from_cert = PublicKeyPin::from_certificate(&der).unwrap();
        let from_string = PublicKeyPin::from_base64(&expected).unwrap();

        assert_eq!(from_cert, from_string);
        assert_eq!(from_cert.to_string(), expected);
    }

    #[test]
    fn test_equality_ignores_encoding_whitespace() {
        let a = PublicKeyPin::from_base64("grX4Ta9HpZx6tSHkmCrvpApTQGo67CYDnvprLg5yRME=").unwrap();
        let b = PublicKeyPin::from_base64(" grX4Ta9HpZx6tSHkmCrv\npApTQGo67CYDnvprLg5yRME= ").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_wrong_length() {
        // 16 zero bytes
        let err = PublicKeyPin::from_base64("AAAAAAAAAAAAAAAAAAAAAA==").unwrap_err();
        assert_eq!(err, PinError::Length(16));
    }

    #[test]
    fn test_rejects_invalid_base64() {
        assert!(matches!(
            PublicKeyPin::from_base64("not*base64"),
            Err(PinError::Encoding(_))
        ));
    }

    #[test]
    fn test_rejects_garbage_certificate() {
        assert!(matches!(
            PublicKeyPin::from_certificate(b"definitely not DER"),
            Err(PinError::Spki(_))
        ));
    }

    #[test]
    fn test_hpkp_directive_format() {
        let pin = PublicKeyPin::from_digest([0u8; PIN_LENGTH]);
        assert_eq!(
            pin.to_hpkp_directive(),
            "pin-sha256=\"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=\""
        );
    }
}
