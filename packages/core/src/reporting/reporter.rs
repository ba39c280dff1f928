//! Failure reporting pipeline: snapshot, rate limit, local fan-out, background upload

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use crossbeam_channel::Receiver;
use rustls::pki_types::CertificateDer;
use tokio::runtime::Handle;
use url::Url;

use super::events::ReportEventSink;
use super::rate_limiter::ReportRateLimiter;
use super::report::FailureReport;
use super::sender::ReportSender;
use crate::config::{AppIdentity, TrustKitConfig};
use crate::pinning::PinValidationResult;
use crate::policy::DomainPolicy;

/// Builds and dispatches failure reports.
///
/// Calls never block on the network and never fail: uploads run on a tokio runtime
/// (the configured one, the ambient one, or a short-lived dedicated thread) and
/// delivery errors are only logged.
pub struct FailureReporter {
    app: AppIdentity,
    app_platform: String,
    rate_limiter: ReportRateLimiter,
    events: ReportEventSink,
    sender: Arc<dyn ReportSender>,
    runtime: Option<Handle>,
}

impl fmt::Debug for FailureReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureReporter")
            .field("app", &self.app)
            .field("app_platform", &self.app_platform)
            .field("rate_limiter", &self.rate_limiter)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl FailureReporter {
    pub fn new(config: &TrustKitConfig, sender: Arc<dyn ReportSender>) -> Self {
        Self {
            app: config.app.clone(),
            app_platform: config.app_platform.clone(),
            rate_limiter: ReportRateLimiter::new(config.rate_limit_window),
            events: ReportEventSink::new(),
            sender,
            runtime: config.runtime.clone(),
        }
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &ReportRateLimiter {
        &self.rate_limiter
    }

    #[must_use]
    pub fn events(&self) -> &ReportEventSink {
        &self.events
    }

    /// Receive every report that passes rate limiting
    pub fn subscribe(&self) -> Receiver<Arc<FailureReport>> {
        self.events.subscribe()
    }

    /// Record a failed validation of `hostname` against `policy`
    pub fn pin_validation_failed(
        &self,
        hostname: &str,
        port: u16,
        served: &[CertificateDer<'_>],
        validated: &[CertificateDer<'_>],
        policy: &DomainPolicy,
        verdict: PinValidationResult,
    ) {
        let report = FailureReport::new(
            &self.app,
            &self.app_platform,
            hostname,
            port,
            policy,
            served,
            validated,
            verdict,
            Utc::now(),
        );
        self.submit(report, policy.report_uris().iter().cloned().collect());
    }

    /// Rate limit `report`, then fan it out locally and upload it to `uris`
    pub fn submit(&self, report: FailureReport, uris: Vec<Url>) {
        if self.rate_limiter.should_suppress(&report) {
            tracing::info!(
                "Pin failure report for {} was not sent due to rate-limiting",
                report.hostname
            );
            return;
        }

        let report = Arc::new(report);
        self.events.emit(&report);

        if uris.is_empty() {
            tracing::debug!("No report-uri configured for {}", report.noted_hostname);
            return;
        }
        let payload = match report.to_json() {
            Ok(json) => Bytes::from(json),
            Err(e) => {
                tracing::error!("Failed to serialize pin failure report: {}", e);
                return;
            }
        };

        let sender = Arc::clone(&self.sender);
        self.spawn(async move {
            dispatch(sender.as_ref(), &uris, payload).await;
        });
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(handle) = &self.runtime {
            handle.spawn(task);
            return;
        }
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(task);
            return;
        }

        let spawned = std::thread::Builder::new()
            .name("trustpin-report".to_string())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime.block_on(task),
                    Err(e) => tracing::error!("Failed to start report runtime: {}", e),
                }
            });
        if let Err(e) = spawned {
            tracing::error!("Failed to spawn report thread: {}", e);
        }
    }
}

/// Upload `payload` to each collector in turn; one failing collector does not stop
/// delivery to the others
pub async fn dispatch(sender: &dyn ReportSender, uris: &[Url], payload: Bytes) {
    for uri in uris {
        match sender.send(uri, payload.clone()).await {
            Ok(status) => tracing::debug!("Pin failure report sent to {} ({})", uri, status),
            Err(e) => tracing::warn!("Failed to send pin failure report to {}: {}", uri, e),
        }
    }
}
