//! Commonly used types

pub use crate::config::{AppIdentity, TrustKitConfig};
pub use crate::errors::{
    BaselineError, ConfigurationError, InvalidHostname, PinError, ReportError, StateError,
    TrustKitError,
};
pub use crate::pinning::{
    BaselineValidator, Evaluation, HandshakeContext, PinValidationResult, PinningServerCertVerifier,
    TrustAnchorSource, TrustEvaluator, ValidatedChain, WebPkiBaseline,
};
pub use crate::policy::{
    CertificateSource, DebugOverrides, DomainPolicy, DomainPolicyBuilder, PolicyParser,
    PolicyResolver, PublicKeyPin, RawResourceDir,
};
pub use crate::reporting::{
    FailureReport, FailureReporter, HyperReportSender, ReportEventSink, ReportRateLimiter,
    ReportSender,
};
pub use crate::trustkit::TrustKit;
