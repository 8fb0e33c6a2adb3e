use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Orientation filter tuning.
    pub filter: FilterConfig,
    /// Controller gains and actuation output.
    pub control: ControlConfig,
    /// Measurement session timing.
    pub session: SessionConfig,
    /// Actuator link.
    pub link: LinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Constant added to the fused pitch (degrees). Accounts for how the phone is mounted.
    pub pitch_bias_deg: f32,
    /// Pitch magnitudes below this (radians) are reported as exactly zero.
    pub drift_floor_rad: f32,
    /// Complementary filter weight of the gyroscope orientation (0.0-1.0).
    /// The remainder comes from the accelerometer/magnetometer orientation.
    pub gyro_weight: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            pitch_bias_deg: 90.0,
            drift_floor_rad: 0.001,
            gyro_weight: 0.98,
        }
    }
}

/// What the periodic actuation loop sends to the motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuationSource {
    /// The latest captured angle, scaled by `gain`.
    Angle,
    /// The PID control signal for the latest captured angle, scaled by `gain`.
    Pid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Controller target (degrees, same frame as the captured angle).
    pub set_point: f32,
    pub use_p: bool,
    pub use_i: bool,
    pub use_d: bool,
    /// Period of the actuation send loop in milliseconds.
    pub send_period_ms: u64,
    pub source: ActuationSource,
    /// Scale applied to the actuation value before it is encoded.
    pub gain: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            set_point: 0.0,
            use_p: true,
            use_i: true,
            use_d: true,
            send_period_ms: 500,
            source: ActuationSource::Angle,
            gain: 2.0,
        }
    }
}

impl ControlConfig {
    pub fn send_period(&self) -> Duration {
        Duration::from_millis(self.send_period_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Length of the zero-offset calibration window in milliseconds.
    pub calibration_window_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            calibration_window_ms: 2000,
        }
    }
}

impl SessionConfig {
    pub fn calibration_window(&self) -> Duration {
        Duration::from_millis(self.calibration_window_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial device of the motor controller. `None` logs commands instead of sending them.
    pub serial_port: Option<String>,
    pub baud_rate: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            serial_port: None,
            baud_rate: 115_200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementType {
    /// Stops by itself after `duration_ms`.
    Defined,
    /// Runs until stopped explicitly.
    #[default]
    Undefined,
}

/// Parameters of one measurement session. Fixed once the session starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// User offset (degrees) subtracted from every captured angle after the zero offset.
    pub offset: f32,
    pub measurement_type: MeasurementType,
    /// Session length in milliseconds, only meaningful for `Defined`.
    pub duration_ms: Option<u64>,
}

impl MeasurementConfig {
    pub fn undefined(offset: f32) -> Self {
        Self {
            offset,
            measurement_type: MeasurementType::Undefined,
            duration_ms: None,
        }
    }

    pub fn defined(offset: f32, duration: Duration) -> Self {
        Self {
            offset,
            measurement_type: MeasurementType::Defined,
            duration_ms: Some(duration.as_millis() as u64),
        }
    }

    /// How long the running phase lasts before stopping on its own, if at all.
    pub fn auto_stop_after(&self) -> Option<Duration> {
        match (self.measurement_type, self.duration_ms) {
            (MeasurementType::Defined, Some(ms)) => Some(Duration::from_millis(ms)),
            _ => None,
        }
    }
}
