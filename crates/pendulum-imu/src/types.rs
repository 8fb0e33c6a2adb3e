use glam::Vec3;

/// Which physical sensor produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// Accelerometer (m/s^2).
    Accelerometer,
    /// Magnetometer (uT).
    Magnetometer,
    /// Gyroscope angular velocity (rad/s).
    Gyroscope,
}

/// One raw tri-axis reading from a sensor source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorEvent {
    pub kind: SensorKind,
    /// Monotonic hardware timestamp (ns).
    pub timestamp_ns: i64,
    pub values: Vec3,
}

impl SensorEvent {
    pub fn new(kind: SensorKind, timestamp_ns: i64, values: Vec3) -> Self {
        Self {
            kind,
            timestamp_ns,
            values,
        }
    }
}

/// Fused pitch published after every sensor event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    /// Pitch in degrees, bias included.
    pub pitch_degrees: f32,
    /// Sensor-clock timestamp (ms).
    pub timestamp_ms: i64,
    /// Time since the previous event of any kind (ms), 0 for the first event.
    pub sampling_interval_ms: i64,
}
