//! Recorded robot commands
//!
//! Every call a backend accepts is appended to its command log as one of
//! these. The log serializes to JSON for `plan` exports and run audits.

use super::capabilities::Mount;
use crate::labware::{Location, WellRef};
use serde::{Deserialize, Serialize};

/// A single command accepted by the robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Labware placed on the deck
    LoadLabware {
        /// Deck slot
        slot: u8,
        /// Load name
        load_name: String,
        /// Definition namespace
        namespace: String,
    },
    /// Pipette attached
    LoadInstrument {
        /// Pipette model
        model: String,
        /// Mount
        mount: Mount,
    },
    /// Tip picked up
    PickUpTip {
        /// Tip rack position
        tip: WellRef,
    },
    /// Tip dropped in the trash
    DropTip,
    /// Plain move
    MoveTo {
        /// Target
        location: Location,
    },
    /// Liquid drawn into the tip
    Aspirate {
        /// Volume in uL
        volume_ul: f64,
        /// Target
        location: Location,
        /// Plunger flow rate in uL/s
        flow_rate_ul_s: f64,
    },
    /// Liquid expelled from the tip
    Dispense {
        /// Requested volume in uL
        volume_ul: f64,
        /// Target
        location: Location,
        /// Plunger flow rate in uL/s
        flow_rate_ul_s: f64,
    },
    /// Tip touched against well walls
    TouchTip {
        /// Touched well
        well: WellRef,
        /// Radius fraction
        radius: f64,
        /// Height relative to the well top
        v_offset_mm: f64,
        /// Motion speed
        speed_mm_s: f64,
    },
    /// Residual liquid blown out
    BlowOut {
        /// Well blown out into
        well: WellRef,
    },
    /// Timed wait
    Delay {
        /// Duration in seconds
        seconds: f64,
    },
    /// Wait for the operator
    Pause {
        /// Message shown to the operator
        message: String,
    },
}

impl Command {
    /// Short name of the command kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::LoadLabware { .. } => "load_labware",
            Command::LoadInstrument { .. } => "load_instrument",
            Command::PickUpTip { .. } => "pick_up_tip",
            Command::DropTip => "drop_tip",
            Command::MoveTo { .. } => "move_to",
            Command::Aspirate { .. } => "aspirate",
            Command::Dispense { .. } => "dispense",
            Command::TouchTip { .. } => "touch_tip",
            Command::BlowOut { .. } => "blow_out",
            Command::Delay { .. } => "delay",
            Command::Pause { .. } => "pause",
        }
    }
}
