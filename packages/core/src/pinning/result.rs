//! Trust evaluation verdicts

use std::fmt;

use serde::{Serialize, Serializer};

/// Outcome of evaluating one handshake.
///
/// The discriminants are part of the report wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PinValidationResult {
    Success = 0,
    Failed = 1,
    FailedCertificateChainNotTrusted = 2,
    ErrorInvalidParameters = 3,
    FailedUserDefinedTrustAnchor = 4,
    ErrorCouldNotGenerateSpkiHash = 5,
}

impl PinValidationResult {
    /// Integer sent as `validation-result`
    #[inline]
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Self::Success),
            1 => Some(Self::Failed),
            2 => Some(Self::FailedCertificateChainNotTrusted),
            3 => Some(Self::ErrorInvalidParameters),
            4 => Some(Self::FailedUserDefinedTrustAnchor),
            5 => Some(Self::ErrorCouldNotGenerateSpkiHash),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Whether this verdict describes a pinning failure that a policy report covers
    #[must_use]
    pub const fn is_reportable(self) -> bool {
        matches!(
            self,
            Self::Failed
                | Self::FailedCertificateChainNotTrusted
                | Self::FailedUserDefinedTrustAnchor
                | Self::ErrorCouldNotGenerateSpkiHash
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::FailedCertificateChainNotTrusted => "FAILED_CERTIFICATE_CHAIN_NOT_TRUSTED",
            Self::ErrorInvalidParameters => "ERROR_INVALID_PARAMETERS",
            Self::FailedUserDefinedTrustAnchor => "FAILED_USER_DEFINED_TRUST_ANCHOR",
            Self::ErrorCouldNotGenerateSpkiHash => "ERROR_COULD_NOT_GENERATE_SPKI_HASH",
        }
    }
}

impl fmt::Display for PinValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PinValidationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.ordinal())
    }
}
