use std::sync::Arc;

use tracing::{error, warn};

use crate::config::ErrorPolicy;
use crate::domain::NormalizedRecord;
use crate::metrics;
use crate::sink::{BatchSink, SinkReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    Delivered(SinkReport),
    Failed(String),
    /// Not attempted because an earlier sink failed under [`ErrorPolicy::Abort`].
    Skipped,
}

#[derive(Debug, Default)]
pub struct FanOutReport {
    pub outcomes: Vec<(&'static str, SinkOutcome)>,
}

impl FanOutReport {
    pub fn outcome(&self, sink: &str) -> Option<&SinkOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| *name == sink)
            .map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SinkOutcome::Failed(_)))
            .count()
    }
}

/// Hands a batch to each sink in order, awaiting one before starting the next.
pub struct FanOut {
    sinks: Vec<Arc<dyn BatchSink>>,
    on_sink_error: ErrorPolicy,
}

impl FanOut {
    pub fn new(sinks: Vec<Arc<dyn BatchSink>>, on_sink_error: ErrorPolicy) -> Self {
        Self {
            sinks,
            on_sink_error,
        }
    }

    pub async fn deliver(&self, records: &[NormalizedRecord]) -> FanOutReport {
        let mut report = FanOutReport::default();
        let mut aborted = false;

        for sink in &self.sinks {
            if aborted {
                warn!(sink = sink.name(), "skipping sink after earlier failure");
                report.outcomes.push((sink.name(), SinkOutcome::Skipped));
                continue;
            }
            let outcome = match sink.deliver(records).await {
                Ok(r) => SinkOutcome::Delivered(r),
                Err(e) => {
                    error!(sink = sink.name(), error = %e, "sink delivery failed");
                    metrics::SINK_FAILURES.with_label_values(&[sink.name()]).inc();
                    aborted = self.on_sink_error == ErrorPolicy::Abort;
                    SinkOutcome::Failed(e.to_string())
                }
            };
            report.outcomes.push((sink.name(), outcome));
        }
        report
    }
}
