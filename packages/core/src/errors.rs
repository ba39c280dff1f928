//! Error types for policy parsing, trust evaluation and reporting

/// Fatal policy errors, raised while parsing a policy document or constructing a
/// [`DomainPolicy`](crate::policy::DomainPolicy).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Malformed policy document: {0}")]
    MalformedDocument(String),
    #[error("Tried to pin an invalid domain: {0}")]
    InvalidDomain(String),
    #[error(
        "Less than two pins were supplied for domain {0}. This might brick your App; \
         always include a backup pin"
    )]
    TooFewPins(String),
    #[error("An empty pin-set was supplied for domain {0} with enforcePinning set")]
    EmptyPinSet(String),
    #[error("Unexpected digest value: {0}")]
    UnsupportedDigest(String),
    #[error("Invalid pin: {0}")]
    InvalidPin(#[from] PinError),
    #[error("Invalid expiration date in pin-set: {0}")]
    InvalidExpirationDate(String),
    #[error("Invalid report-uri {uri}: {reason}")]
    InvalidReportUri { uri: String, reason: String },
    #[error("Invalid value {value:?} for attribute {attribute}")]
    InvalidAttribute { attribute: &'static str, value: String },
    #[error("Policy contains the same domain defined twice: {0}")]
    DuplicateDomain(String),
    #[error("Policy contains 0 domains to pin")]
    NoPinnedDomains,
    #[error("Could not load debug certificate {src}: {reason}")]
    DebugCertificate { src: String, reason: String },
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Pin construction failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PinError {
    #[error("not valid base64: {0}")]
    Encoding(String),
    #[error("length is not 32 bytes (got {0})")]
    Length(usize),
    #[error("could not extract the subject public key info: {0}")]
    Spki(String),
}

/// Lifecycle misuse: initializing twice or querying before initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("TrustKit has already been initialized")]
    AlreadyInitialized,
    #[error("TrustKit has not been initialized")]
    NotInitialized,
}

/// A string that is not a bare domain was handed to a hostname lookup
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid domain supplied: {0}")]
pub struct InvalidHostname(pub String);

/// Baseline chain-of-trust validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BaselineError {
    #[error("Empty certificate chain")]
    EmptyChain,
    #[error("Invalid server name {0}")]
    InvalidServerName(String),
    #[error("Certificate chain not trusted: {0}")]
    NotTrusted(String),
    #[error("Baseline validator unavailable: {0}")]
    Unavailable(String),
}

/// Transient report delivery failures. Logged by the reporter, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Unsupported report-uri scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Report-uri has no host: {0}")]
    MissingHost(String),
    #[error("Connection to report collector timed out")]
    Timeout,
    #[error("Network error during report delivery: {0}")]
    Network(String),
    #[error("TLS error during report delivery: {0}")]
    Tls(String),
    #[error("HTTP error during report delivery: {0}")]
    Http(String),
    #[error("Report collector rejected the report with status {0}")]
    Status(http::StatusCode),
    #[error("Report serialization failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Umbrella error for the initialization path
#[derive(Debug, thiserror::Error)]
pub enum TrustKitError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("Connection failed: {0}")]
    Connection(String),
}
