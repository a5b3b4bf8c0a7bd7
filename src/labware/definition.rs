//! Labware definition schema (version 2).
//!
//! Mirrors the JSON produced by the Opentrons custom labware creator so that
//! definitions can be dropped into `labware/` unchanged.

use crate::error::{AppResult, ViscometerError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::num::NonZeroU32;
use std::path::Path;
use std::str::FromStr;

/// Schema version understood by this crate.
pub const SUPPORTED_SCHEMA_VERSION: u32 = 2;

/// Complete labware definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabwareDefinition {
    /// Wells grouped by column, in pipetting order
    pub ordering: Vec<Vec<String>>,
    /// Manufacturer information
    pub brand: Brand,
    /// Display metadata
    pub metadata: LabwareMetadata,
    /// Outer dimensions in mm
    pub dimensions: Dimensions,
    /// Well geometry keyed by well name
    pub wells: BTreeMap<String, WellDefinition>,
    /// Well groups sharing metadata
    #[serde(default)]
    pub groups: Vec<WellGroup>,
    /// Load parameters
    pub parameters: LabwareParameters,
    /// Definition namespace (`opentrons`, `custom_beta`, ...)
    pub namespace: String,
    /// Definition revision
    pub version: u32,
    /// Schema version, must be 2
    pub schema_version: u32,
    /// Offset of the labware origin from the slot corner
    pub corner_offset_from_slot: Offset,
}

/// Manufacturer information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    /// Brand name
    pub brand: String,
    /// Catalogue identifiers
    #[serde(default)]
    pub brand_id: Vec<String>,
}

/// Display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabwareMetadata {
    /// Human-readable name
    pub display_name: String,
    /// Category (`reservoir`, `wellPlate`, `tipRack`, ...)
    pub display_category: String,
    /// Units shown for volumes
    pub display_volume_units: String,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Outer dimensions in mm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    /// Footprint length
    pub x_dimension: f64,
    /// Footprint width
    pub y_dimension: f64,
    /// Height
    pub z_dimension: f64,
}

/// Cartesian offset in mm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    /// X offset
    pub x: f64,
    /// Y offset
    pub y: f64,
    /// Z offset
    pub z: f64,
}

/// Cross-section of a well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WellShape {
    /// Round well, uses `diameter`
    Circular,
    /// Square well, uses `x_dimension` and `y_dimension`
    Rectangular,
}

/// Geometry of a single well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellDefinition {
    /// Depth from top to bottom in mm
    pub depth: f64,
    /// Nominal capacity in uL
    pub total_liquid_volume: f64,
    /// Cross-section
    pub shape: WellShape,
    /// Diameter for circular wells
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter: Option<f64>,
    /// X size for rectangular wells
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_dimension: Option<f64>,
    /// Y size for rectangular wells
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_dimension: Option<f64>,
    /// Well centre X
    pub x: f64,
    /// Well centre Y
    pub y: f64,
    /// Well bottom Z
    pub z: f64,
}

impl WellDefinition {
    /// Z coordinate of the well top relative to the labware origin.
    pub fn top_z(&self) -> f64 {
        self.z + self.depth
    }
}

/// Group of wells sharing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellGroup {
    /// Group metadata
    #[serde(default)]
    pub metadata: WellGroupMetadata,
    /// Member wells
    pub wells: Vec<String>,
}

/// Metadata attached to a well group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellGroupMetadata {
    /// Bottom shape (`flat`, `u`, `v`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub well_bottom_shape: Option<String>,
    /// Optional group display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Load parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabwareParameters {
    /// Layout format (`irregular`, `96Standard`, ...)
    pub format: String,
    /// Behaviour quirks
    #[serde(default)]
    pub quirks: Vec<String>,
    /// Whether the labware holds pipette tips
    pub is_tiprack: bool,
    /// Tip length for tip racks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip_length: Option<f64>,
    /// Magnetic module compatibility
    #[serde(default)]
    pub is_magnetic_module_compatible: bool,
    /// Name used to load this labware
    pub load_name: String,
}

impl LabwareDefinition {
    /// Parse and validate a definition from JSON text.
    pub fn from_json_str(content: &str, source: &str) -> AppResult<Self> {
        let definition: Self =
            serde_json::from_str(content).map_err(|e| ViscometerError::LabwareDefinition {
                name: source.to_string(),
                reason: e.to_string(),
            })?;
        definition.validate()?;
        Ok(definition)
    }

    /// Load and validate a definition from a JSON file.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content, &path.display().to_string())
    }

    /// Name used to load this labware.
    pub fn load_name(&self) -> &str {
        &self.parameters.load_name
    }

    /// Whether `well` is defined.
    pub fn has_well(&self, well: &WellName) -> bool {
        self.wells.contains_key(well.as_str())
    }

    /// Geometry of `well`.
    pub fn well(&self, well: &WellName) -> AppResult<&WellDefinition> {
        self.wells
            .get(well.as_str())
            .ok_or_else(|| ViscometerError::UnknownWell {
                labware: self.load_name().to_string(),
                well: well.to_string(),
            })
    }

    /// Wells in pipetting order (column by column).
    pub fn wells_in_order(&self) -> impl Iterator<Item = &str> {
        self.ordering.iter().flatten().map(String::as_str)
    }

    /// Check internal consistency of the definition.
    pub fn validate(&self) -> AppResult<()> {
        let fail = |reason: String| ViscometerError::LabwareDefinition {
            name: self.parameters.load_name.clone(),
            reason,
        };

        if self.schema_version != SUPPORTED_SCHEMA_VERSION {
            return Err(fail(format!(
                "unsupported schemaVersion {} (expected {})",
                self.schema_version, SUPPORTED_SCHEMA_VERSION
            )));
        }
        if self.parameters.load_name.trim().is_empty() {
            return Err(fail("loadName is empty".to_string()));
        }
        if self.wells.is_empty() {
            return Err(fail("no wells defined".to_string()));
        }

        let mut ordered = HashSet::new();
        for name in self.wells_in_order() {
            if !self.wells.contains_key(name) {
                return Err(fail(format!("ordering references undefined well {name}")));
            }
            if !ordered.insert(name) {
                return Err(fail(format!("well {name} appears twice in ordering")));
            }
        }
        if let Some(missing) = self.wells.keys().find(|k| !ordered.contains(k.as_str())) {
            return Err(fail(format!("well {missing} is missing from ordering")));
        }

        for group in &self.groups {
            if let Some(unknown) = group.wells.iter().find(|w| !self.wells.contains_key(*w)) {
                return Err(fail(format!("group references undefined well {unknown}")));
            }
        }

        for (name, well) in &self.wells {
            if well.depth <= 0.0 || well.total_liquid_volume <= 0.0 {
                return Err(fail(format!("well {name} has non-positive depth or volume")));
            }
            let sized = match well.shape {
                WellShape::Circular => well.diameter.is_some(),
                WellShape::Rectangular => well.x_dimension.is_some() && well.y_dimension.is_some(),
            };
            if !sized {
                return Err(fail(format!("well {name} is missing its cross-section size")));
            }
        }

        if self.parameters.is_tiprack && self.parameters.tip_length.is_none() {
            return Err(fail("tip rack is missing tipLength".to_string()));
        }

        Ok(())
    }
}

// =============================================================================
// Well names
// =============================================================================

/// Row of a well grid, up to the eight rows of a 96-well footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellRow {
    /// Row A
    A,
    /// Row B
    B,
    /// Row C
    C,
    /// Row D
    D,
    /// Row E
    E,
    /// Row F
    F,
    /// Row G
    G,
    /// Row H
    H,
}

impl WellRow {
    /// Row letter as used in well names.
    pub fn letter(self) -> char {
        match self {
            WellRow::A => 'A',
            WellRow::B => 'B',
            WellRow::C => 'C',
            WellRow::D => 'D',
            WellRow::E => 'E',
            WellRow::F => 'F',
            WellRow::G => 'G',
            WellRow::H => 'H',
        }
    }
}

/// Validated well name such as `A1` or `C4`: one row letter and a column number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WellName(String);

impl WellName {
    /// Build a well name from its row letter and 1-based column.
    pub fn new(row: char, column: u32) -> AppResult<Self> {
        format!("{row}{column}").parse()
    }

    /// Well `column` of `row`. Always a valid name.
    pub fn at(row: WellRow, column: NonZeroU32) -> Self {
        WellName(format!("{}{column}", row.letter()))
    }

    /// The well name as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Row letter.
    pub fn row(&self) -> char {
        self.0.chars().next().unwrap_or('A')
    }

    /// 1-based column number.
    pub fn column(&self) -> u32 {
        self.0[1..].parse().unwrap_or(1)
    }

    /// Same row, different column.
    pub fn with_column(&self, column: u32) -> AppResult<Self> {
        Self::new(self.row(), column)
    }
}

impl FromStr for WellName {
    type Err = ViscometerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ViscometerError::Configuration(format!("invalid well name '{s}'"));
        let mut chars = s.chars();
        let row = chars.next().ok_or_else(invalid)?;
        let digits = chars.as_str();
        if !row.is_ascii_uppercase() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let column: u32 = digits.parse().map_err(|_| invalid())?;
        if column == 0 || digits.starts_with('0') {
            return Err(invalid());
        }
        Ok(WellName(s.to_string()))
    }
}

impl TryFrom<String> for WellName {
    type Error = ViscometerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WellName> for String {
    fn from(value: WellName) -> Self {
        value.0
    }
}

impl fmt::Display for WellName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tube_holder() -> LabwareDefinition {
        LabwareDefinition::from_json_str(super::super::FALCON_TUBE_HOLDER_JSON, "embedded")
            .unwrap()
    }

    #[test]
    fn parses_embedded_tube_holder() {
        let def = tube_holder();
        assert_eq!(def.load_name(), "amdm_12_50ml_falcon_tube");
        assert_eq!(def.wells.len(), 12);
        assert_eq!(def.namespace, "custom_beta");
        assert!(!def.parameters.is_tiprack);

        let a1 = def.well(&"A1".parse().unwrap()).unwrap();
        assert_eq!(a1.shape, WellShape::Circular);
        assert_eq!(a1.total_liquid_volume, 50000.0);
        assert!((a1.top_z() - 121.4).abs() < 1e-9);
    }

    #[test]
    fn typed_rows_always_give_parseable_names() {
        let rows = [
            WellRow::A,
            WellRow::B,
            WellRow::C,
            WellRow::D,
            WellRow::E,
            WellRow::F,
            WellRow::G,
            WellRow::H,
        ];
        for row in rows {
            for column in [NonZeroU32::MIN, NonZeroU32::new(12).unwrap(), NonZeroU32::MAX] {
                let name = WellName::at(row, column);
                assert_eq!(name.as_str().parse::<WellName>().unwrap(), name);
                assert_eq!(name.row(), row.letter());
                assert_eq!(name.column(), column.get());
            }
        }
    }

    #[test]
    fn ordering_is_column_major() {
        let def = tube_holder();
        let order: Vec<_> = def.wells_in_order().take(4).collect();
        assert_eq!(order, vec!["A1", "B1", "C1", "A2"]);
    }

    #[test]
    fn rejects_ordering_with_unknown_well() {
        let mut def = tube_holder();
        def.ordering[0].push("Z9".to_string());
        assert!(matches!(
            def.validate(),
            Err(ViscometerError::LabwareDefinition { .. })
        ));
    }

    #[test]
    fn rejects_wrong_schema_version() {
        let mut def = tube_holder();
        def.schema_version = 1;
        assert!(def.validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = LabwareDefinition::from_json_str("{\"ordering\": []", "broken").unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn well_name_parsing() {
        let well: WellName = "C4".parse().unwrap();
        assert_eq!(well.row(), 'C');
        assert_eq!(well.column(), 4);
        assert_eq!(well.with_column(1).unwrap().as_str(), "C1");

        assert!("".parse::<WellName>().is_err());
        assert!("a1".parse::<WellName>().is_err());
        assert!("A0".parse::<WellName>().is_err());
        assert!("A01".parse::<WellName>().is_err());
        assert!("AB".parse::<WellName>().is_err());
    }

    #[test]
    fn well_name_serde_validates() {
        let ok: WellName = serde_json::from_str("\"B12\"").unwrap();
        assert_eq!(ok.column(), 12);
        assert!(serde_json::from_str::<WellName>("\"12B\"").is_err());
    }
}
