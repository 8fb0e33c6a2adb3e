pub mod fusion;
pub mod recording;
pub mod rotation;
pub mod synthetic;
pub mod types;

use fusion::OrientationFilter;
use pendulum_config::FilterConfig;
use tokio::sync::{mpsc, watch};
use types::{OrientationSample, SensorEvent};

/// Messages handled by the hub task, in arrival order.
enum HubMessage {
    Event(SensorEvent),
    Enable,
    Disable,
}

/// Anything that publishes the latest fused pitch sample.
///
/// Readers see only the most recent value; a slow reader skips samples
/// rather than queueing them.
pub trait SampleSource: Send + Sync {
    /// A receiver that has already seen the current value.
    fn subscribe(&self) -> watch::Receiver<Option<OrientationSample>>;

    /// Start accepting sensor events with fresh filter state.
    fn enable(&self);

    /// Stop accepting sensor events.
    fn disable(&self);
}

/// Cloneable handle through which sensor sources push raw events.
#[derive(Clone)]
pub struct SensorSink {
    tx: mpsc::UnboundedSender<HubMessage>,
}

impl SensorSink {
    /// Queue an event. Returns `false` once the hub has shut down.
    pub fn send(&self, event: SensorEvent) -> bool {
        self.tx.send(HubMessage::Event(event)).is_ok()
    }
}

/// Sample ingestion for the orientation filter.
///
/// All three sensor kinds funnel into one channel drained by a single task,
/// so filter state is only ever touched from one place. Each processed event
/// replaces the published sample.
pub struct SensorHub {
    sample_rx: watch::Receiver<Option<OrientationSample>>,
    tx: mpsc::UnboundedSender<HubMessage>,
    _task: tokio::task::JoinHandle<()>,
}

impl SensorHub {
    /// Spawn the hub task. Events are dropped until [`SampleSource::enable`].
    pub fn spawn(config: FilterConfig) -> Self {
        let (sample_tx, sample_rx) = watch::channel(None);
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(hub_loop(rx, sample_tx, OrientationFilter::new(config)));

        Self {
            sample_rx,
            tx,
            _task: task,
        }
    }

    pub fn sink(&self) -> SensorSink {
        SensorSink {
            tx: self.tx.clone(),
        }
    }

    /// Get the latest sample (non-blocking).
    pub fn latest(&self) -> Option<OrientationSample> {
        *self.sample_rx.borrow()
    }
}

impl SampleSource for SensorHub {
    fn subscribe(&self) -> watch::Receiver<Option<OrientationSample>> {
        let mut rx = self.sample_rx.clone();
        rx.borrow_and_update();
        rx
    }

    fn enable(&self) {
        let _ = self.tx.send(HubMessage::Enable);
    }

    fn disable(&self) {
        let _ = self.tx.send(HubMessage::Disable);
    }
}

/// Background task: run every accepted event through the filter and publish the result.
async fn hub_loop(
    mut rx: mpsc::UnboundedReceiver<HubMessage>,
    sample_tx: watch::Sender<Option<OrientationSample>>,
    mut filter: OrientationFilter,
) {
    let mut enabled = false;
    let mut event_count: u64 = 0;

    while let Some(message) = rx.recv().await {
        match message {
            HubMessage::Event(event) if enabled => {
                let sample = filter.update(&event);
                sample_tx.send_replace(Some(sample));
                event_count += 1;
                if event_count % 1000 == 0 {
                    tracing::debug!(event_count, "Sensor events processed");
                }
            }
            HubMessage::Event(event) => {
                tracing::trace!(kind = ?event.kind, "Sensor event dropped while disabled");
            }
            HubMessage::Enable => {
                filter.reset();
                sample_tx.send_replace(None);
                enabled = true;
                event_count = 0;
                tracing::info!("Sensor hub enabled");
            }
            HubMessage::Disable => {
                enabled = false;
                tracing::info!(event_count, "Sensor hub disabled");
            }
        }
    }

    tracing::debug!("Sensor hub stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use types::SensorKind;

    const MS: i64 = 1_000_000;

    async fn next_sample(rx: &mut watch::Receiver<Option<OrientationSample>>) -> OrientationSample {
        loop {
            rx.changed().await.unwrap();
            if let Some(sample) = *rx.borrow_and_update() {
                return sample;
            }
        }
    }

    #[tokio::test]
    async fn events_are_dropped_until_enabled() {
        let hub = SensorHub::spawn(FilterConfig::default());
        let sink = hub.sink();
        assert!(sink.send(SensorEvent::new(SensorKind::Gyroscope, MS, Vec3::ZERO)));

        let mut rx = hub.subscribe();
        hub.enable();
        assert!(sink.send(SensorEvent::new(SensorKind::Gyroscope, 9 * MS, Vec3::ZERO)));

        let sample = next_sample(&mut rx).await;
        assert_eq!(sample.timestamp_ms, 9);
        // The pre-enable event never reached the filter.
        assert_eq!(sample.sampling_interval_ms, 0);
        assert_eq!(hub.latest(), Some(sample));
    }

    #[tokio::test]
    async fn latest_value_replaces_previous() {
        let hub = SensorHub::spawn(FilterConfig::default());
        let sink = hub.sink();
        hub.enable();
        for i in 1..=5 {
            sink.send(SensorEvent::new(SensorKind::Gyroscope, i * 10 * MS, Vec3::ZERO));
        }

        let mut rx = hub.subscribe();
        sink.send(SensorEvent::new(SensorKind::Gyroscope, 60 * MS, Vec3::ZERO));
        let sample = next_sample(&mut rx).await;
        assert_eq!(sample.timestamp_ms, 60);
        assert_eq!(sample.sampling_interval_ms, 10);
    }

    #[tokio::test]
    async fn re_enabling_starts_from_fresh_state() {
        let hub = SensorHub::spawn(FilterConfig::default());
        let sink = hub.sink();
        hub.enable();
        sink.send(SensorEvent::new(SensorKind::Gyroscope, 10 * MS, Vec3::ZERO));
        hub.disable();
        hub.enable();

        let mut rx = hub.subscribe();
        sink.send(SensorEvent::new(SensorKind::Gyroscope, 500 * MS, Vec3::ZERO));
        let sample = next_sample(&mut rx).await;
        assert_eq!(sample.sampling_interval_ms, 0);
    }
}
