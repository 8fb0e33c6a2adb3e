use pendulum_imu::types::OrientationSample;
use std::time::Duration;
use tokio::sync::watch;

/// Running mean of the pitch seen during calibration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroOffset {
    sum: f64,
    count: u64,
}

impl ZeroOffset {
    pub fn add(&mut self, pitch_degrees: f32) {
        self.sum += pitch_degrees as f64;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean of the added values, 0 when none were added.
    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum / self.count as f64) as f32
        }
    }
}

/// Average every sample published during `window`.
pub async fn calibrate(
    samples: &mut watch::Receiver<Option<OrientationSample>>,
    window: Duration,
) -> f32 {
    let mut zero = ZeroOffset::default();
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            _ = &mut deadline => break,
            changed = samples.changed() => {
                if changed.is_err() {
                    tracing::warn!("Sample source closed during calibration");
                    break;
                }
                if let Some(sample) = *samples.borrow_and_update() {
                    zero.add(sample.pitch_degrees);
                }
            }
        }
    }

    tracing::debug!(samples = zero.count(), "Calibration window closed");
    zero.mean()
}
