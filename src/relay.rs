use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::collector::{CollectError, Collector};
use crate::domain::NormalizedRecord;
use crate::fanout::{FanOut, FanOutReport};
use crate::metrics;
use crate::readiness::Readiness;

/// Where a pass gets its beacon snapshot from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BeaconSource: Send + Sync {
    async fn collect(&self) -> Result<Vec<NormalizedRecord>, CollectError>;
}

#[async_trait]
impl BeaconSource for Collector {
    async fn collect(&self) -> Result<Vec<NormalizedRecord>, CollectError> {
        Collector::collect(self).await
    }
}

#[derive(Debug)]
pub struct PassReport {
    pub records: usize,
    /// `None` when the snapshot was empty and fan-out did not run.
    pub fanout: Option<FanOutReport>,
}

/// One collect-then-fan-out pass at a time.
pub struct Relay {
    source: Arc<dyn BeaconSource>,
    fanout: FanOut,
    ready: Arc<Readiness>,
    pass_lock: Mutex<()>,
}

impl Relay {
    pub fn new(source: Arc<dyn BeaconSource>, fanout: FanOut, ready: Arc<Readiness>) -> Self {
        Self {
            source,
            fanout,
            ready,
            pass_lock: Mutex::new(()),
        }
    }

    /// Runs a single pass. Overlapping calls wait for the pass in flight.
    pub async fn run_once(&self) -> Result<PassReport, CollectError> {
        let _guard = self.pass_lock.lock().await;
        metrics::PASSES.inc();

        let records = match self.source.collect().await {
            Ok(records) => {
                self.ready.set_source_ok(true);
                records
            }
            Err(CollectError::Malformed(reason)) => {
                // Nothing to relay, but the source is not healthy either.
                self.ready.set_source_ok(false);
                warn!(reason, "ignoring malformed beacon snapshot");
                return Ok(PassReport {
                    records: 0,
                    fanout: None,
                });
            }
            Err(e) => {
                self.ready.set_source_ok(false);
                metrics::PASS_FAILURES.inc();
                error!(error = %e, "collection failed, abandoning pass");
                return Err(e);
            }
        };

        if records.is_empty() {
            info!("no beacons in snapshot, nothing to relay");
            return Ok(PassReport {
                records: 0,
                fanout: None,
            });
        }

        let report = self.fanout.deliver(&records).await;
        info!(
            records = records.len(),
            failed_sinks = report.failures(),
            "relay pass finished"
        );
        Ok(PassReport {
            records: records.len(),
            fanout: Some(report),
        })
    }

    /// Polls every `interval` until `shutdown` fires. A pass that is in
    /// flight when shutdown fires runs to completion.
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // Errors are logged inside the pass.
            let _ = self.run_once().instrument(info_span!("relay_pass")).await;
        }
        info!("poll loop stopped");
    }
}
