pub mod serial;

use std::sync::Mutex;
use tracing::{debug, info};

pub use serial::SerialLink;

/// Outbound command channel to the motor controller.
///
/// Delivery is best effort: implementations log their own failures and never
/// report them to the caller.
pub trait ActuatorLink: Send + Sync {
    fn send(&self, payload: &[u8]);
}

/// Link that only logs what would have been sent.
pub struct LogLink;

impl ActuatorLink for LogLink {
    fn send(&self, payload: &[u8]) {
        info!(
            command = %String::from_utf8_lossy(payload),
            bytes = payload.len(),
            "Actuator command (no link attached)"
        );
    }
}

/// Link that keeps every payload in memory.
#[derive(Default)]
pub struct MemoryLink {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads sent so far, oldest first.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl ActuatorLink for MemoryLink {
    fn send(&self, payload: &[u8]) {
        if let Ok(mut sent) = self.sent.lock() {
            debug!(bytes = payload.len(), "Actuator command stored");
            sent.push(payload.to_vec());
        }
    }
}
