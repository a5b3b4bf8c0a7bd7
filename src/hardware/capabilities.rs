//! Pipetting Capabilities
//!
//! The robotic pipetting service is split into two capability traits:
//!
//! - [`ProtocolControl`]: deck setup, instrument loading, delays and operator pauses
//! - [`Pipette`]: tip handling and liquid movement on one mounted instrument
//!
//! The protocol runner only talks to these traits, so the same schedule runs
//! against the simulated robot, a recording backend in tests, or a real robot
//! driver.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors, carrying `ViscometerError` where the
//!   failure is a domain error
//!
//! # Example
//!
//! ```rust,ignore
//! let reservoir = ctx.load_labware_from_definition(falcon_tube_holder()?, 1).await?;
//! let tips = ctx.load_labware("opentrons_96_filtertiprack_1000ul", 7).await?;
//! let p1000 = ctx.load_instrument("p1000_single", Mount::Left, &[tips.clone()]).await?;
//!
//! p1000.pick_up_tip(&tips.well(&"A1".parse()?)?).await?;
//! let source = reservoir.well(&"A1".parse()?)?;
//! p1000.aspirate(375.0, &source.top(-80.0), 100.0 / 274.7).await?;
//! ```

use crate::error::{AppResult, ViscometerError};
use crate::labware::{Labware, LabwareDefinition, Location, WellRef};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Pipette mount on the gantry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mount {
    /// Left mount
    Left,
    /// Right mount
    Right,
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mount::Left => f.write_str("left"),
            Mount::Right => f.write_str("right"),
        }
    }
}

/// Static properties of a pipette model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipetteSpec {
    /// Model name, e.g. `p1000_single`
    pub model: String,
    /// Maximum volume in uL
    pub max_volume_ul: f64,
    /// Minimum volume in uL
    pub min_volume_ul: f64,
    /// Flow rate in uL/s that a `rate` of 1.0 refers to
    pub default_flow_rate_ul_s: f64,
}

impl PipetteSpec {
    /// Look up a known pipette model.
    pub fn lookup(model: &str) -> AppResult<Self> {
        let (max, min, flow) = match model {
            "p1000_single" | "p1000_single_gen2" => (1000.0, 100.0, 274.7),
            "p300_single" | "p300_single_gen2" => (300.0, 30.0, 92.86),
            "p20_single_gen2" => (20.0, 1.0, 7.56),
            other => return Err(ViscometerError::UnknownInstrument(other.to_string())),
        };
        Ok(Self {
            model: model.to_string(),
            max_volume_ul: max,
            min_volume_ul: min,
            default_flow_rate_ul_s: flow,
        })
    }

    /// Relative `rate` argument that produces `flow_rate_ul_s`.
    pub fn rate_for(&self, flow_rate_ul_s: f64) -> f64 {
        flow_rate_ul_s / self.default_flow_rate_ul_s
    }

    /// Absolute flow rate for a relative `rate`.
    pub fn flow_rate(&self, rate: f64) -> f64 {
        rate * self.default_flow_rate_ul_s
    }
}

/// Parameters of a touch-tip motion.
///
/// Defaults match the robot's: radius 1.0, 1 mm below the top, 60 mm/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchTip {
    /// Well to touch; `None` touches the well the pipette is currently in
    pub well: Option<WellRef>,
    /// Fraction of the well radius to travel
    pub radius: f64,
    /// Height relative to the well top in mm
    pub v_offset_mm: f64,
    /// Motion speed in mm/s
    pub speed_mm_s: f64,
}

impl Default for TouchTip {
    fn default() -> Self {
        Self {
            well: None,
            radius: 1.0,
            v_offset_mm: -1.0,
            speed_mm_s: 60.0,
        }
    }
}

impl TouchTip {
    /// Touch at `v_offset_mm` relative to the top of the current well.
    pub fn at_offset(v_offset_mm: f64) -> Self {
        Self {
            v_offset_mm,
            ..Self::default()
        }
    }

    /// Target a specific well.
    pub fn in_well(mut self, well: WellRef) -> Self {
        self.well = Some(well);
        self
    }

    /// Set the radius fraction.
    pub fn radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    /// Set the motion speed.
    pub fn speed(mut self, speed_mm_s: f64) -> Self {
        self.speed_mm_s = speed_mm_s;
        self
    }
}

/// Capability: Liquid Handling
///
/// One mounted pipette.
///
/// # Contract
/// - Volumes are in uL, offsets in mm
/// - `rate` multiplies the pipette's default flow rate
/// - Every liquid-handling call requires an attached tip
/// - Calls complete before returning; the runner never overlaps them
#[async_trait]
pub trait Pipette: Send + Sync {
    /// Model properties
    fn spec(&self) -> &PipetteSpec;

    /// Mount the pipette is attached to
    fn mount(&self) -> Mount;

    /// Pick up the tip at `tip` in an assigned tip rack
    async fn pick_up_tip(&self, tip: &WellRef) -> Result<()>;

    /// Drop the attached tip into the trash
    async fn drop_tip(&self) -> Result<()>;

    /// Move the tip to `location` without liquid handling
    async fn move_to(&self, location: &Location) -> Result<()>;

    /// Draw `volume_ul` at `location`
    async fn aspirate(&self, volume_ul: f64, location: &Location, rate: f64) -> Result<()>;

    /// Expel `volume_ul` at `location`
    ///
    /// Dispensing more than the tip holds expels what is held.
    async fn dispense(&self, volume_ul: f64, location: &Location, rate: f64) -> Result<()>;

    /// Touch the tip against the well walls
    async fn touch_tip(&self, touch: TouchTip) -> Result<()>;

    /// Blow out residual liquid at the top of `well`
    async fn blow_out(&self, well: &WellRef) -> Result<()>;
}

/// Capability: Protocol Control
///
/// Deck setup and run-level commands.
///
/// # Contract
/// - Each deck slot holds at most one labware
/// - `delay` blocks for the given duration (or records it in simulation)
/// - `pause` blocks until the operator resumes the run
#[async_trait]
pub trait ProtocolControl: Send + Sync {
    /// Load a built-in labware by load name into `slot`
    async fn load_labware(&self, load_name: &str, slot: u8) -> Result<Labware>;

    /// Load labware from an explicit definition into `slot`
    async fn load_labware_from_definition(
        &self,
        definition: LabwareDefinition,
        slot: u8,
    ) -> Result<Labware>;

    /// Attach a pipette using `tip_racks` as its tip source
    async fn load_instrument(
        &self,
        model: &str,
        mount: Mount,
        tip_racks: &[Labware],
    ) -> Result<Arc<dyn Pipette>>;

    /// Wait for `duration`
    async fn delay(&self, duration: Duration) -> Result<()>;

    /// Pause until the operator resumes
    async fn pause(&self, message: &str) -> Result<()>;
}
