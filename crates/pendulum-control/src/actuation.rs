//! Turning the latest captured angle into motor command bytes.

use crate::pid::PidController;
use pendulum_config::ActuationSource;

/// Value to send for the latest captured `angle`, before encoding.
///
/// `Angle` has nothing to send until a sample exists; `Pid` falls back to the
/// controller's set point in that case.
pub fn command_value(
    source: ActuationSource,
    gain: f32,
    angle: Option<f32>,
    pid: &mut PidController,
) -> Option<f32> {
    match source {
        ActuationSource::Angle => angle.map(|a| a * gain),
        ActuationSource::Pid => {
            let outcome = pid.calculate_control_signal(angle);
            tracing::trace!(
                signal = outcome.signal,
                error = outcome.error,
                delta_time_ms = outcome.delta_time_ms,
                "PID step"
            );
            Some(outcome.signal * gain)
        }
    }
}

/// ASCII decimal text of `value`, always with a fractional part (`12.0`, `-0.5`).
pub fn encode_command(value: f32) -> Vec<u8> {
    let mut text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        text.push_str(".0");
    }
    text.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::pid::PidGains;
    use std::sync::Arc;

    fn pid() -> PidController {
        let mut pid = PidController::new(
            PidGains {
                kp: 2.0,
                ki: 0.0,
                kd: 0.0,
            },
            Arc::new(ManualClock::starting_at(0)),
        );
        pid.configure_terms(true, false, false);
        pid.set_set_point(10.0);
        pid
    }

    #[test]
    fn angle_source_scales_the_angle() {
        let mut pid = pid();
        assert_eq!(
            command_value(ActuationSource::Angle, 2.0, Some(6.0), &mut pid),
            Some(12.0)
        );
        assert_eq!(command_value(ActuationSource::Angle, 2.0, None, &mut pid), None);
    }

    #[test]
    fn pid_source_runs_the_controller() {
        let mut pid = pid();
        assert_eq!(
            command_value(ActuationSource::Pid, 1.0, Some(4.0), &mut pid),
            Some(12.0)
        );
        assert_eq!(
            command_value(ActuationSource::Pid, 2.0, None, &mut pid),
            Some(20.0)
        );
    }

    #[test]
    fn commands_are_decimal_text() {
        assert_eq!(encode_command(12.0), b"12.0");
        assert_eq!(encode_command(90.5), b"90.5");
        assert_eq!(encode_command(-7.0), b"-7.0");
        assert_eq!(encode_command(0.25), b"0.25");
    }
}
