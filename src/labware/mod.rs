//! Labware and deck locations
//!
//! - [`definition`]: the JSON definition schema and validated [`WellName`]s
//! - [`builtin`]: generated definitions for standard plates and tip racks
//!
//! A [`Labware`] is a definition placed in a deck slot. Wells are addressed
//! through [`WellRef`], and commands target a [`Location`] relative to a
//! well's top or bottom.

pub mod builtin;
pub mod definition;

pub use definition::{LabwareDefinition, WellDefinition, WellName, WellRow, WellShape};

use crate::error::{AppResult, ViscometerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Embedded definition of the 12-position 50 mL falcon tube holder.
pub const FALCON_TUBE_HOLDER_JSON: &str =
    include_str!("../../labware/amdm_12_50ml_falcon_tube.json");

/// Definition of the 12-position 50 mL falcon tube holder.
pub fn falcon_tube_holder() -> AppResult<LabwareDefinition> {
    LabwareDefinition::from_json_str(FALCON_TUBE_HOLDER_JSON, "amdm_12_50ml_falcon_tube")
}

/// Load a definition from `path`, or fall back to the embedded tube holder.
pub fn reservoir_definition(path: Option<&Path>) -> AppResult<LabwareDefinition> {
    match path {
        Some(path) => LabwareDefinition::from_file(path),
        None => falcon_tube_holder(),
    }
}

/// A labware definition loaded into a deck slot.
#[derive(Debug, Clone)]
pub struct Labware {
    slot: u8,
    definition: Arc<LabwareDefinition>,
}

impl Labware {
    /// Place `definition` in `slot`.
    pub fn new(slot: u8, definition: Arc<LabwareDefinition>) -> Self {
        Self { slot, definition }
    }

    /// Deck slot holding this labware.
    pub fn slot(&self) -> u8 {
        self.slot
    }

    /// Load name from the definition.
    pub fn load_name(&self) -> &str {
        self.definition.load_name()
    }

    /// Underlying definition.
    pub fn definition(&self) -> &LabwareDefinition {
        &self.definition
    }

    /// Whether this labware is a tip rack.
    pub fn is_tiprack(&self) -> bool {
        self.definition.parameters.is_tiprack
    }

    /// Reference a well, failing if it is not defined.
    pub fn well(&self, name: &WellName) -> AppResult<WellRef> {
        if !self.definition.has_well(name) {
            return Err(ViscometerError::UnknownWell {
                labware: self.load_name().to_string(),
                well: name.to_string(),
            });
        }
        Ok(WellRef {
            slot: self.slot,
            labware: self.load_name().to_string(),
            name: name.clone(),
        })
    }
}

/// A specific well of a loaded labware.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WellRef {
    /// Deck slot
    pub slot: u8,
    /// Labware load name
    pub labware: String,
    /// Well name
    pub name: WellName,
}

impl WellRef {
    /// Location `z` mm above the well top (negative is inside the well).
    pub fn top(&self, z: f64) -> Location {
        Location {
            well: self.clone(),
            anchor: Anchor::Top,
            offset_mm: z,
        }
    }

    /// Location `z` mm above the well bottom.
    pub fn bottom(&self, z: f64) -> Location {
        Location {
            well: self.clone(),
            anchor: Anchor::Bottom,
            offset_mm: z,
        }
    }
}

impl fmt::Display for WellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} on {}", self.name, self.labware, self.slot)
    }
}

/// Reference point within a well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    /// Well top
    Top,
    /// Well bottom
    Bottom,
}

/// Target position for a pipette command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Well the location is relative to
    pub well: WellRef,
    /// Reference point
    pub anchor: Anchor,
    /// Vertical offset from the anchor in mm
    pub offset_mm: f64,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let anchor = match self.anchor {
            Anchor::Top => "top",
            Anchor::Bottom => "bottom",
        };
        write!(f, "{} ({anchor} {:+.2} mm)", self.well, self.offset_mm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservoir() -> Labware {
        Labware::new(1, Arc::new(falcon_tube_holder().unwrap()))
    }

    #[test]
    fn well_lookup_and_locations() {
        let labware = reservoir();
        let well = labware.well(&"C1".parse().unwrap()).unwrap();
        assert_eq!(well.slot, 1);

        let location = well.top(-80.0);
        assert_eq!(location.anchor, Anchor::Top);
        assert_eq!(location.offset_mm, -80.0);
        assert_eq!(
            location.to_string(),
            "C1 of amdm_12_50ml_falcon_tube on 1 (top -80.00 mm)"
        );
    }

    #[test]
    fn unknown_well_is_rejected() {
        let labware = reservoir();
        let err = labware.well(&"D1".parse().unwrap()).unwrap_err();
        assert!(matches!(err, ViscometerError::UnknownWell { .. }));
    }

    #[test]
    fn reservoir_definition_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holder.json");
        std::fs::write(&path, FALCON_TUBE_HOLDER_JSON).unwrap();

        let from_file = reservoir_definition(Some(&path)).unwrap();
        let embedded = reservoir_definition(None).unwrap();
        assert_eq!(from_file, embedded);
    }

    #[test]
    fn missing_definition_file_is_io_error() {
        let err = reservoir_definition(Some(Path::new("/nonexistent/holder.json"))).unwrap_err();
        assert!(matches!(err, ViscometerError::Io(_)));
    }
}
