use crate::clock::Clock;
use pendulum_config::ControlConfig;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

/// Result of one controller step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlOutcome {
    pub signal: f32,
    /// `set_point - measured`, 0 when there was no measurement.
    pub error: f32,
    /// Wall-clock time since the last state-advancing step (ms).
    pub delta_time_ms: i64,
}

/// PID controller with individually switchable terms.
///
/// Not internally synchronized: one caller at a time, or wrap it in a lock.
pub struct PidController {
    gains: PidGains,
    set_point: f32,
    integral: f32,
    previous_error: f32,
    previous_time_ms: i64,
    use_p: bool,
    use_i: bool,
    use_d: bool,
    clock: Arc<dyn Clock>,
}

impl PidController {
    /// All three terms enabled, set point 0.
    pub fn new(gains: PidGains, clock: Arc<dyn Clock>) -> Self {
        let previous_time_ms = clock.now_ms();
        Self {
            gains,
            set_point: 0.0,
            integral: 0.0,
            previous_error: 0.0,
            previous_time_ms,
            use_p: true,
            use_i: true,
            use_d: true,
            clock,
        }
    }

    pub fn from_config(config: &ControlConfig, clock: Arc<dyn Clock>) -> Self {
        let gains = PidGains {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
        };
        let mut pid = Self::new(gains, clock);
        pid.set_set_point(config.set_point);
        pid.configure_terms(config.use_p, config.use_i, config.use_d);
        pid
    }

    pub fn set_set_point(&mut self, set_point: f32) {
        self.set_point = set_point;
    }

    pub fn set_point(&self) -> f32 {
        self.set_point
    }

    /// Enable or disable the P, I and D terms.
    pub fn configure_terms(&mut self, p: bool, i: bool, d: bool) {
        self.use_p = p;
        self.use_i = i;
        self.use_d = d;
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn previous_error(&self) -> f32 {
        self.previous_error
    }

    /// Compute the control signal for `measured`.
    ///
    /// Without a measurement the set point is returned and no state moves.
    /// With every term disabled the raw error is returned, also without
    /// touching the integral, previous error or previous time.
    pub fn calculate_control_signal(&mut self, measured: Option<f32>) -> ControlOutcome {
        let now_ms = self.clock.now_ms();
        let delta_time_ms = now_ms - self.previous_time_ms;

        let Some(measured) = measured else {
            return ControlOutcome {
                signal: self.set_point,
                error: 0.0,
                delta_time_ms,
            };
        };

        let error = self.set_point - measured;

        if !self.use_p && !self.use_i && !self.use_d {
            return ControlOutcome {
                signal: error,
                error,
                delta_time_ms,
            };
        }

        let dt = delta_time_ms as f32 / 1000.0;

        let proportional = if self.use_p { self.gains.kp * error } else { 0.0 };

        let integral_term = if self.use_i {
            self.integral += error * dt;
            self.gains.ki * self.integral
        } else {
            0.0
        };

        let derivative = if dt > 0.0 {
            (error - self.previous_error) / dt
        } else {
            0.0
        };
        let derivative_term = if self.use_d { self.gains.kd * derivative } else { 0.0 };

        self.previous_error = error;
        self.previous_time_ms = now_ms;

        ControlOutcome {
            signal: proportional + integral_term + derivative_term,
            error,
            delta_time_ms,
        }
    }

    /// Clear the integral and previous error and restart timing from now.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
        self.previous_time_ms = self.clock.now_ms();
    }
}
