//! Application-level orchestration.
//!
//! This module owns campaign lifecycle control (start/stop/reset) and the line
//! grammar of the control surface. Transport layers call into this module and
//! only render what it returns.

mod command;
mod controller;

pub use command::CommandOutcome;
pub use controller::ControlPlane;
