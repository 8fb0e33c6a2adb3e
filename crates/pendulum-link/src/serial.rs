//! Serial-port link to the motor controller board.

use crate::ActuatorLink;
use anyhow::Result;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Write timeout; a stalled board must not hold up the send loop.
const WRITE_TIMEOUT: Duration = Duration::from_millis(50);

pub struct SerialLink {
    path: String,
    port: Mutex<Box<dyn SerialPort>>,
}

impl SerialLink {
    /// Open `path` as 8N1 without flow control.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(WRITE_TIMEOUT)
            .open()?;

        tracing::info!(path, baud_rate, "Opened actuator serial port");

        Ok(Self {
            path: path.to_string(),
            port: Mutex::new(port),
        })
    }
}

impl ActuatorLink for SerialLink {
    fn send(&self, payload: &[u8]) {
        let Ok(mut port) = self.port.lock() else {
            tracing::error!(path = %self.path, "Serial port lock poisoned");
            return;
        };

        let result = port.write_all(payload).and_then(|_| port.flush());
        match result {
            Ok(()) => tracing::trace!(path = %self.path, bytes = payload.len(), "Command written"),
            Err(e) => tracing::warn!(path = %self.path, ?e, "Serial write failed"),
        }
    }
}
