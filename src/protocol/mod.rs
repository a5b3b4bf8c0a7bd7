//! Proxy viscometer protocol
//!
//! Calibration models, the sample plan, the runner that drives the robot
//! through the measurement schedule, and the report it produces.

pub mod model;
pub mod plan;
pub mod report;
pub mod runner;

pub use model::{DelayTiers, LiquidLevel, LiquidLevelModel};
pub use plan::{SampleAssignment, SampleMap, SampleWells};
pub use report::{CycleRecord, RunReport, SampleReport};
pub use runner::{Deck, ProtocolRunner, MEASURE_PROMPT};
