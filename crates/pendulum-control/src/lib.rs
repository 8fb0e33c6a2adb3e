pub mod actuation;
pub mod clock;
pub mod pid;

pub use actuation::{command_value, encode_command};
pub use clock::{Clock, ManualClock, SystemClock};
pub use pid::{ControlOutcome, PidController, PidGains};
