use async_trait::async_trait;

use crate::domain::NormalizedRecord;

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("publish: {0}")]
    Publish(String),
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {status} for beacon {beacon_id}")]
    Status {
        beacon_id: String,
        status: reqwest::StatusCode,
    },
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{failed} of {total} records failed")]
    Partial { failed: usize, total: usize },
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Counts reported by a sink after handling one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub delivered: usize,
    pub skipped: usize,
}

impl SinkReport {
    pub fn delivered(delivered: usize) -> Self {
        Self {
            delivered,
            skipped: 0,
        }
    }
}

/// Downstream target that receives a whole batch of records per pass.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Short stable name used in logs and metric labels.
    fn name(&self) -> &'static str;

    async fn deliver(&self, records: &[NormalizedRecord]) -> Result<SinkReport, SinkError>;
}
