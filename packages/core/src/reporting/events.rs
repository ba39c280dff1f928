//! In-process fan-out of dispatched reports

use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use super::report::FailureReport;

/// Reports queued per subscriber before further reports are dropped for it
pub const SUBSCRIBER_CAPACITY: usize = 256;

/// Broadcasts every report that passed rate limiting to local listeners.
///
/// Subscribers whose receiver was dropped are pruned on the next emit. A subscriber
/// that stops draining its queue loses reports once [`SUBSCRIBER_CAPACITY`] is reached.
#[derive(Debug, Default)]
pub struct ReportEventSink {
    subscribers: Mutex<Vec<Sender<Arc<FailureReport>>>>,
}

impl ReportEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Sender<Arc<FailureReport>>>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Report event sink lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Register a listener
    pub fn subscribe(&self) -> Receiver<Arc<FailureReport>> {
        self.subscribe_with_capacity(SUBSCRIBER_CAPACITY)
    }

    /// Register a listener with its own queue bound
    pub fn subscribe_with_capacity(&self, capacity: usize) -> Receiver<Arc<FailureReport>> {
        let (tx, rx) = bounded(capacity.max(1));
        self.lock().push(tx);
        rx
    }

    /// Never blocks; full queues drop the report for that subscriber only
    pub fn emit(&self, report: &Arc<FailureReport>) {
        self.lock()
            .retain(|subscriber| match subscriber.try_send(Arc::clone(report)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        "Report event subscriber queue full, dropping report for {}",
                        report.hostname
                    );
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppIdentity;
    use crate::pinning::PinValidationResult;
    use crate::policy::{DomainPolicy, PublicKeyPin};

    fn report() -> Arc<FailureReport> {
        let policy = DomainPolicy::builder("www.datatheorem.com")
            .pins([PublicKeyPin::from_digest([1; 32])])
            .build()
            .unwrap();
        Arc::new(FailureReport::new(
            &AppIdentity::default(),
            "LINUX",
            "www.datatheorem.com",
            443,
            &policy,
            &[],
            &[],
            PinValidationResult::Failed,
            chrono::Utc::now(),
        ))
    }

    #[test]
    fn test_every_subscriber_receives_report() {
        let sink = ReportEventSink::new();
        let first = sink.subscribe();
        let second = sink.subscribe();

        sink.emit(&report());
        assert_eq!(first.try_recv().unwrap().hostname, "www.datatheorem.com");
        assert!(second.try_recv().is_ok());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let sink = ReportEventSink::new();
        let kept = sink.subscribe();
        drop(sink.subscribe());

        sink.emit(&report());
        assert_eq!(sink.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn test_full_queue_drops_report_but_keeps_subscriber() {
        let sink = ReportEventSink::new();
        let slow = sink.subscribe_with_capacity(1);

        sink.emit(&report());
        sink.emit(&report());
        assert_eq!(sink.subscriber_count(), 1);
        assert!(slow.try_recv().is_ok());
        assert!(slow.try_recv().is_err());

        sink.emit(&report());
        assert!(slow.try_recv().is_ok());
    }
}
