//! Pinning policy model: pins, per-domain policies, the document parser and lookup

pub mod debug;
pub mod domain;
pub mod hostname;
pub mod parser;
pub mod pin;
pub mod resolver;

pub use debug::{CertificateSource, DebugOverrides, NoCertificates, RawResourceDir};
pub use domain::{
    default_report_uri, DomainPolicy, DomainPolicyBuilder, PolicySettings, DEFAULT_REPORT_URI,
};
pub use parser::{merge_override_pins, ParsedPolicy, ParserOptions, PolicyParser};
pub use pin::PublicKeyPin;
pub use resolver::PolicyResolver;
