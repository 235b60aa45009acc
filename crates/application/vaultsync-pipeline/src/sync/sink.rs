use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use vaultsync_core::SyncOutcome;

/// Receives each per-key outcome as soon as it is known.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, outcome: &SyncOutcome);
}

impl OutcomeSink for UnboundedSender<SyncOutcome> {
    fn record(&self, outcome: &SyncOutcome) {
        // A dropped receiver only means nobody is watching.
        let _ = self.send(outcome.clone());
    }
}

#[derive(Debug, Default)]
pub struct CollectingSink {
    outcomes: Mutex<Vec<SyncOutcome>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<SyncOutcome> {
        self.outcomes
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn into_outcomes(self) -> Vec<SyncOutcome> {
        self.outcomes.into_inner().unwrap_or_default()
    }
}

impl OutcomeSink for CollectingSink {
    fn record(&self, outcome: &SyncOutcome) {
        if let Ok(mut v) = self.outcomes.lock() {
            v.push(outcome.clone());
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl OutcomeSink for NoopSink {
    fn record(&self, _outcome: &SyncOutcome) {}
}
