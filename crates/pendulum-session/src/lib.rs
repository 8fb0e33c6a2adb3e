pub mod calibration;
pub mod capture;
pub mod controller;
pub mod store;

pub use capture::{CapturedSample, MeasurementColumns};
pub use controller::{SessionController, SessionPhase, SessionStatus};
pub use store::{MemoryStore, SessionStore};
