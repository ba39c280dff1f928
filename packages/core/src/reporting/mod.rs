//! Pin validation failure reports

pub mod events;
pub mod rate_limiter;
pub mod report;
pub mod reporter;
pub mod sender;

pub use events::ReportEventSink;
pub use rate_limiter::ReportRateLimiter;
pub use report::{certificate_chain_pem, FailureReport, ReportKey, TRUSTKIT_VERSION};
pub use reporter::{dispatch, FailureReporter};
pub use sender::{HyperReportSender, ReportSender};
