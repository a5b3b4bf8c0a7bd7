//! Robotic Pipetting Service
//!
//! Capability traits for the robot plus a strict simulated backend.

pub mod capabilities;
pub mod command;
pub mod operator;
pub mod simulated;

pub use capabilities::{Mount, Pipette, PipetteSpec, ProtocolControl, TouchTip};
pub use command::Command;
pub use operator::{AutoResumeOperator, ConsoleOperator, Operator};
pub use simulated::{SimulatedPipette, SimulatedRobot};
