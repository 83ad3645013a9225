//! Push channel for live subscribers, served as Server-Sent Events.

use std::{convert::Infallible, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt as _};
use tracing::debug;

use crate::app::AppState;
use crate::config::LiveCfg;
use crate::domain::NormalizedRecord;
use crate::sink::{BatchSink, SinkError, SinkReport};

/// Fans each batch out to whoever is subscribed at the moment it is sent.
/// Late subscribers get nothing that was sent before they joined.
pub struct LiveHub {
    tx: broadcast::Sender<Arc<str>>,
    event_name: String,
}

impl LiveHub {
    pub fn new(cfg: &LiveCfg) -> Self {
        let (tx, _) = broadcast::channel(cfg.channel_capacity.max(1));
        Self {
            tx,
            event_name: cfg.event_name.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }
}

#[async_trait]
impl BatchSink for LiveHub {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn deliver(&self, records: &[NormalizedRecord]) -> Result<SinkReport, SinkError> {
        let payload: Arc<str> = serde_json::to_string(records)?.into();
        // Sending with no subscribers is not a failure.
        let subscribers = self.tx.send(payload).unwrap_or(0);
        debug!(subscribers, records = records.len(), "broadcast beacon batch");
        Ok(SinkReport::delivered(records.len()))
    }
}

/// `GET /events`
pub async fn events(
    State(st): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let event_name = st.live.event_name().to_string();
    let stream = BroadcastStream::new(st.live.subscribe()).filter_map(move |msg| match msg {
        Ok(batch) => Some(Ok(Event::default().event(&event_name).data(&*batch))),
        Err(lagged) => {
            debug!(error = %lagged, "live subscriber fell behind");
            None
        }
    });
    // End the stream on shutdown so graceful shutdown is not held open.
    let stream = futures::StreamExt::take_until(stream, st.shutdown.cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn current_subscribers_receive_the_batch_as_json() {
        let hub = LiveHub::new(&LiveCfg::default());
        let mut rx = hub.subscribe();

        let report = hub
            .deliver(&[NormalizedRecord::new("a1"), NormalizedRecord::new("a2")])
            .await
            .unwrap();

        assert_eq!(report.delivered, 2);
        let batch: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(batch[0]["beaconId"], "A1");
        assert_eq!(batch[1]["beaconId"], "A2");
    }

    #[tokio::test]
    async fn late_subscribers_get_no_replay() {
        let hub = LiveHub::new(&LiveCfg::default());

        hub.deliver(&[NormalizedRecord::new("a1")]).await.unwrap();
        let mut rx = hub.subscribe();

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
