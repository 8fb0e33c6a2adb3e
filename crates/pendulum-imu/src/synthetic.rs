//! Synthetic pendulum sensor source for running without a phone attached.

use crate::types::{SensorEvent, SensorKind};
use crate::SensorSink;
use glam::Vec3;
use std::f32::consts::{FRAC_PI_4, TAU};
use std::time::Duration;

const GRAVITY: f32 = 9.806_65;
/// Horizontal geomagnetic field strength (uT).
const FIELD_STRENGTH: f32 = 30.0;

/// Damped pendulum swinging about the device X axis.
#[derive(Debug, Clone)]
pub struct PendulumModel {
    /// Tilt of the device from flat at rest (rad).
    pub rest_tilt: f32,
    /// Initial swing amplitude (rad).
    pub amplitude: f32,
    /// Swing period (s).
    pub period: f32,
    /// Exponential amplitude decay rate (1/s).
    pub damping: f32,
}

impl Default for PendulumModel {
    fn default() -> Self {
        Self {
            rest_tilt: FRAC_PI_4,
            amplitude: 20.0_f32.to_radians(),
            period: 2.0,
            damping: 0.05,
        }
    }
}

impl PendulumModel {
    /// Tilt about X from flat at time `t` (s).
    pub fn tilt(&self, t: f32) -> f32 {
        let omega = TAU / self.period;
        self.rest_tilt + self.amplitude * (-self.damping * t).exp() * (omega * t).cos()
    }

    /// Angular rate about X at time `t` (rad/s).
    pub fn tilt_rate(&self, t: f32) -> f32 {
        let omega = TAU / self.period;
        let envelope = self.amplitude * (-self.damping * t).exp();
        -envelope * (self.damping * (omega * t).cos() + omega * (omega * t).sin())
    }

    /// Magnetometer, accelerometer and gyroscope readings at `timestamp_ns`.
    pub fn events_at(&self, timestamp_ns: i64) -> [SensorEvent; 3] {
        let t = timestamp_ns as f32 * 1.0e-9;
        let (sin, cos) = self.tilt(t).sin_cos();
        [
            SensorEvent::new(
                SensorKind::Magnetometer,
                timestamp_ns,
                Vec3::new(0.0, cos, -sin) * FIELD_STRENGTH,
            ),
            SensorEvent::new(
                SensorKind::Accelerometer,
                timestamp_ns,
                Vec3::new(0.0, sin, cos) * GRAVITY,
            ),
            SensorEvent::new(
                SensorKind::Gyroscope,
                timestamp_ns,
                Vec3::new(self.tilt_rate(t), 0.0, 0.0),
            ),
        ]
    }
}

/// Feed `sink` with pendulum readings at `rate_hz` until the hub shuts down.
pub async fn run(model: PendulumModel, sink: SensorSink, rate_hz: u32) {
    let step = Duration::from_secs(1) / rate_hz.max(1);
    let mut ticker = tokio::time::interval(step);
    let mut timestamp_ns: i64 = 0;

    tracing::info!(rate_hz, period = model.period, "Synthetic pendulum running");

    loop {
        ticker.tick().await;
        for event in model.events_at(timestamp_ns) {
            if !sink.send(event) {
                tracing::debug!("Sensor hub closed, synthetic source stopping");
                return;
            }
        }
        timestamp_ns += step.as_nanos() as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::OrientationFilter;
    use approx::assert_abs_diff_eq;
    use pendulum_config::FilterConfig;

    #[test]
    fn rate_is_derivative_of_tilt() {
        let model = PendulumModel::default();
        let h = 1.0e-3;
        for t in [0.1, 0.7, 1.9] {
            let numeric = (model.tilt(t + h) - model.tilt(t - h)) / (2.0 * h);
            assert_abs_diff_eq!(model.tilt_rate(t), numeric, epsilon = 1e-2);
        }
    }

    #[test]
    fn filter_tracks_the_swing() {
        let model = PendulumModel::default();
        let mut filter = OrientationFilter::new(FilterConfig::default());
        let step_ns = 10_000_000;

        let mut last = None;
        for i in 0..=150 {
            for event in model.events_at(i * step_ns) {
                last = Some(filter.update(&event));
            }
        }

        let t = 150.0 * 0.01;
        let expected = 90.0 - model.tilt(t).to_degrees();
        assert_abs_diff_eq!(last.unwrap().pitch_degrees, expected, epsilon = 1.0);
    }
}
