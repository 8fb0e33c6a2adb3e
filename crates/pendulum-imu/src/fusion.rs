use crate::rotation::{
    delta_rotation_from_gyro, matrix_from_orientation, multiply, orientation_from_matrix,
    rotation_from_gravity, rotation_matrix_from_vector, EulerAngles,
};
use crate::types::{OrientationSample, SensorEvent, SensorKind};
use glam::{Mat3, Vec3};
use pendulum_config::FilterConfig;
use std::f32::consts::{PI, TAU};

const NS_PER_MS: i64 = 1_000_000;
const NS_TO_S: f32 = 1.0e-9;

/// Complementary orientation filter.
///
/// Accelerometer + magnetometer give a drift-free but noisy orientation; the
/// gyroscope gives a smooth one that drifts. The gyroscope path is seeded once
/// from the accelerometer/magnetometer orientation and then integrated on its
/// own; the fused orientation blends the two on every gyroscope event.
pub struct OrientationFilter {
    config: FilterConfig,
    accel: Option<Vec3>,
    magnet: Option<Vec3>,
    /// Latest good accelerometer/magnetometer orientation.
    accel_mag_orientation: Option<EulerAngles>,
    gyro: GyroState,
    fused_orientation: EulerAngles,
    previous_event_ms: Option<i64>,
}

enum GyroState {
    /// Waiting for the first gyroscope event after an accel/mag orientation exists.
    Uninitialized,
    Seeded {
        /// Accumulated device-to-world rotation.
        matrix: Mat3,
        last_timestamp_ns: i64,
    },
}

impl OrientationFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            accel: None,
            magnet: None,
            accel_mag_orientation: None,
            gyro: GyroState::Uninitialized,
            fused_orientation: EulerAngles::default(),
            previous_event_ms: None,
        }
    }

    /// Drop all state, as if no event had been seen.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    /// Process one sensor event and return the resulting pitch sample.
    pub fn update(&mut self, event: &SensorEvent) -> OrientationSample {
        let timestamp_ms = event.timestamp_ns / NS_PER_MS;
        let sampling_interval_ms = self
            .previous_event_ms
            .map_or(0, |previous| timestamp_ms - previous);
        self.previous_event_ms = Some(timestamp_ms);

        match event.kind {
            SensorKind::Accelerometer => {
                self.accel = Some(event.values);
                self.update_accel_mag_orientation();
            }
            SensorKind::Magnetometer => {
                self.magnet = Some(event.values);
                self.update_accel_mag_orientation();
            }
            SensorKind::Gyroscope => self.integrate_gyro(event),
        }

        OrientationSample {
            pitch_degrees: self.pitch_degrees(),
            timestamp_ms,
            sampling_interval_ms,
        }
    }

    /// Fused pitch in degrees: drift floor snapped to zero, mounting bias added.
    pub fn pitch_degrees(&self) -> f32 {
        let mut pitch = self.fused_orientation.pitch;
        if pitch.abs() < self.config.drift_floor_rad {
            pitch = 0.0;
        }
        pitch.to_degrees() + self.config.pitch_bias_deg
    }

    pub fn fused_orientation(&self) -> EulerAngles {
        self.fused_orientation
    }

    pub fn accel_mag_orientation(&self) -> Option<EulerAngles> {
        self.accel_mag_orientation
    }

    /// Whether the gyroscope path has been seeded.
    pub fn is_seeded(&self) -> bool {
        matches!(self.gyro, GyroState::Seeded { .. })
    }

    fn update_accel_mag_orientation(&mut self) {
        let (Some(accel), Some(magnet)) = (self.accel, self.magnet) else {
            return;
        };

        // Degenerate vectors keep the last good orientation.
        let Some(rotation) = rotation_from_gravity(accel, magnet) else {
            tracing::trace!("Accelerometer/magnetometer orientation unavailable");
            return;
        };

        let orientation = orientation_from_matrix(&rotation);
        self.accel_mag_orientation = Some(orientation);

        if !self.is_seeded() {
            self.fused_orientation = orientation;
        }
    }

    fn integrate_gyro(&mut self, event: &SensorEvent) {
        let Some(accel_mag) = self.accel_mag_orientation else {
            return;
        };

        let matrix = match &mut self.gyro {
            GyroState::Uninitialized => self.seed(accel_mag, event.timestamp_ns),
            GyroState::Seeded {
                matrix,
                last_timestamp_ns,
            } => {
                let dt = (event.timestamp_ns - *last_timestamp_ns) as f32 * NS_TO_S;
                *last_timestamp_ns = event.timestamp_ns;
                if dt > 0.0 {
                    let delta = delta_rotation_from_gyro(event.values, dt / 2.0);
                    *matrix = multiply(matrix, &rotation_matrix_from_vector(delta));
                }
                *matrix
            }
        };

        let gyro_orientation = orientation_from_matrix(&matrix);
        self.fused_orientation = blend(gyro_orientation, accel_mag, self.config.gyro_weight);
    }

    /// One-way transition out of `Uninitialized`.
    fn seed(&mut self, orientation: EulerAngles, timestamp_ns: i64) -> Mat3 {
        let matrix = multiply(&Mat3::IDENTITY, &matrix_from_orientation(orientation));
        self.gyro = GyroState::Seeded {
            matrix,
            last_timestamp_ns: timestamp_ns,
        };
        tracing::info!(
            azimuth = orientation.azimuth,
            pitch = orientation.pitch,
            roll = orientation.roll,
            "Gyroscope integration seeded"
        );
        matrix
    }
}

fn blend(gyro: EulerAngles, accel_mag: EulerAngles, gyro_weight: f32) -> EulerAngles {
    EulerAngles {
        azimuth: blend_angle(gyro.azimuth, accel_mag.azimuth, gyro_weight),
        pitch: blend_angle(gyro.pitch, accel_mag.pitch, gyro_weight),
        roll: blend_angle(gyro.roll, accel_mag.roll, gyro_weight),
    }
}

/// Weighted average of two angles along the shorter arc between them, so a
/// pair straddling the +/-pi seam is averaged across it.
fn blend_angle(gyro: f32, accel_mag: f32, gyro_weight: f32) -> f32 {
    let (gyro, accel_mag) = if (gyro - accel_mag).abs() <= PI {
        (gyro, accel_mag)
    } else if gyro < accel_mag {
        (gyro + TAU, accel_mag)
    } else {
        (gyro, accel_mag + TAU)
    };

    let fused = gyro_weight * gyro + (1.0 - gyro_weight) * accel_mag;
    if fused > PI {
        fused - TAU
    } else {
        fused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const MS: i64 = 1_000_000;

    fn gyro_only() -> FilterConfig {
        FilterConfig {
            gyro_weight: 1.0,
            ..FilterConfig::default()
        }
    }

    /// Accelerometer and magnetometer readings of a device tilted by `tilt` about X.
    fn tilted(filter: &mut OrientationFilter, tilt: f32, t_ns: i64) -> OrientationSample {
        let gravity = Vec3::new(0.0, tilt.sin(), tilt.cos()) * 9.81;
        let field = Vec3::new(0.0, tilt.cos(), -tilt.sin()) * 30.0;
        filter.update(&SensorEvent::new(SensorKind::Magnetometer, t_ns, field));
        filter.update(&SensorEvent::new(SensorKind::Accelerometer, t_ns, gravity))
    }

    fn gyro(filter: &mut OrientationFilter, rate: Vec3, t_ns: i64) -> OrientationSample {
        filter.update(&SensorEvent::new(SensorKind::Gyroscope, t_ns, rate))
    }

    #[test]
    fn sampling_interval_tracks_any_sensor_kind() {
        let mut filter = OrientationFilter::new(FilterConfig::default());
        let first = gyro(&mut filter, Vec3::ZERO, 5 * MS);
        assert_eq!(first.timestamp_ms, 5);
        assert_eq!(first.sampling_interval_ms, 0);

        let second = filter.update(&SensorEvent::new(
            SensorKind::Magnetometer,
            12 * MS + 400_000,
            Vec3::Y,
        ));
        assert_eq!(second.timestamp_ms, 12);
        assert_eq!(second.sampling_interval_ms, 7);
    }

    #[test]
    fn level_output_is_exactly_the_bias() {
        let mut filter = OrientationFilter::new(FilterConfig::default());
        let sample = gyro(&mut filter, Vec3::new(0.3, 0.0, 0.0), MS);
        assert_eq!(sample.pitch_degrees, 90.0);

        // Below the drift floor.
        let sample = tilted(&mut filter, 0.0005, 2 * MS);
        assert_eq!(sample.pitch_degrees, 90.0);
    }

    #[test]
    fn accel_mag_orientation_drives_output_before_seeding() {
        let mut filter = OrientationFilter::new(FilterConfig::default());
        let sample = tilted(&mut filter, 0.3, MS);
        assert!(!filter.is_seeded());
        assert_abs_diff_eq!(sample.pitch_degrees, 90.0 - 0.3_f32.to_degrees(), epsilon = 1e-3);
    }

    #[test]
    fn gyro_waits_for_an_orientation_seed() {
        let mut filter = OrientationFilter::new(FilterConfig::default());
        gyro(&mut filter, Vec3::X, MS);
        gyro(&mut filter, Vec3::X, 2 * MS);
        assert!(!filter.is_seeded());

        filter.update(&SensorEvent::new(SensorKind::Accelerometer, 3 * MS, Vec3::Z * 9.81));
        gyro(&mut filter, Vec3::X, 4 * MS);
        assert!(!filter.is_seeded());

        tilted(&mut filter, 0.0, 5 * MS);
        gyro(&mut filter, Vec3::X, 6 * MS);
        assert!(filter.is_seeded());
    }

    #[test]
    fn degenerate_vectors_keep_previous_orientation() {
        let mut filter = OrientationFilter::new(FilterConfig::default());
        tilted(&mut filter, 0.2, MS);
        let before = filter.accel_mag_orientation().unwrap();

        // Field parallel to gravity: no heading.
        let sample = filter.update(&SensorEvent::new(
            SensorKind::Magnetometer,
            2 * MS,
            Vec3::new(0.0, 0.2_f32.sin(), 0.2_f32.cos()) * 40.0,
        ));
        assert_eq!(filter.accel_mag_orientation(), Some(before));
        assert!(sample.pitch_degrees.is_finite());

        // Free fall.
        filter.update(&SensorEvent::new(SensorKind::Accelerometer, 3 * MS, Vec3::ZERO));
        assert_eq!(filter.accel_mag_orientation(), Some(before));
    }

    #[test]
    fn gyro_integration_rotates_pitch() {
        let mut filter = OrientationFilter::new(gyro_only());
        tilted(&mut filter, 0.0, 0);

        // Seed, then ten 10 ms steps at 1 rad/s about X.
        gyro(&mut filter, Vec3::X, 0);
        let mut last = None;
        for step in 1..=10 {
            last = Some(gyro(&mut filter, Vec3::X, step * 10 * MS));
        }

        let expected = 90.0 - 0.1_f32.to_degrees();
        assert_abs_diff_eq!(last.unwrap().pitch_degrees, expected, epsilon = 1e-3);
        assert_abs_diff_eq!(filter.fused_orientation().pitch, -0.1, epsilon = 1e-5);
    }

    #[test]
    fn seed_happens_once() {
        let mut filter = OrientationFilter::new(gyro_only());
        tilted(&mut filter, 0.2, 0);
        gyro(&mut filter, Vec3::ZERO, MS);
        let seeded_pitch = filter.fused_orientation().pitch;

        // A different accel/mag orientation does not move the gyroscope path.
        tilted(&mut filter, 0.6, 2 * MS);
        gyro(&mut filter, Vec3::ZERO, 3 * MS);
        assert_abs_diff_eq!(filter.fused_orientation().pitch, seeded_pitch, epsilon = 1e-6);
        assert_abs_diff_eq!(seeded_pitch, -0.2, epsilon = 1e-5);
    }

    #[test]
    fn complementary_weight_pulls_toward_accel_mag() {
        let config = FilterConfig {
            gyro_weight: 0.5,
            ..FilterConfig::default()
        };
        let mut filter = OrientationFilter::new(config);
        tilted(&mut filter, 0.0, 0);
        gyro(&mut filter, Vec3::ZERO, 0);

        tilted(&mut filter, 0.4, MS);
        gyro(&mut filter, Vec3::ZERO, 2 * MS);
        // Gyroscope still says level, accel/mag says -0.4.
        assert_abs_diff_eq!(filter.fused_orientation().pitch, -0.2, epsilon = 1e-5);
    }

    #[test]
    fn reset_forgets_seed_and_timing() {
        let mut filter = OrientationFilter::new(FilterConfig::default());
        tilted(&mut filter, 0.3, 10 * MS);
        gyro(&mut filter, Vec3::ZERO, 11 * MS);
        assert!(filter.is_seeded());

        filter.reset();
        assert!(!filter.is_seeded());
        assert_eq!(filter.accel_mag_orientation(), None);
        let sample = gyro(&mut filter, Vec3::ZERO, 50 * MS);
        assert_eq!(sample.sampling_interval_ms, 0);
        assert_eq!(sample.pitch_degrees, 90.0);
    }

    #[test]
    fn blend_crosses_the_seam() {
        let fused = blend_angle(-3.1, 3.0, 0.5);
        assert_abs_diff_eq!(fused, 0.5 * (-3.1 + TAU) + 0.5 * 3.0, epsilon = 1e-5);

        let fused = blend_angle(3.0, -3.1, 0.5);
        assert_abs_diff_eq!(fused, 0.5 * 3.0 + 0.5 * (-3.1 + TAU), epsilon = 1e-5);

        assert_abs_diff_eq!(blend_angle(0.2, 0.4, 0.98), 0.204, epsilon = 1e-6);
    }

    #[test]
    fn blend_stays_off_the_seam_for_nearby_angles() {
        // Both near -pi/2 and +0.1: the short arc does not cross +/-pi.
        assert_abs_diff_eq!(blend_angle(-1.6, 0.1, 0.98), -1.566, epsilon = 1e-5);
        assert_abs_diff_eq!(blend_angle(0.1, -1.6, 0.98), 0.066, epsilon = 1e-5);
        assert_abs_diff_eq!(blend_angle(-2.0, 1.0, 0.5), -0.5, epsilon = 1e-5);
    }
}
