//! Built-in labware definitions
//!
//! Standard plates and tip racks are regular grids, so they are generated
//! from a compact `GridSpec` instead of being shipped as JSON.

use super::definition::{
    Brand, Dimensions, LabwareDefinition, LabwareMetadata, LabwareParameters, Offset,
    WellDefinition, WellGroup, WellGroupMetadata, WellShape, SUPPORTED_SCHEMA_VERSION,
};
use crate::error::{AppResult, ViscometerError};
use std::collections::BTreeMap;

/// Load names resolvable without a definition file.
pub const BUILTIN_LOAD_NAMES: &[&str] = &[
    "corning_6_wellplate_16.8ml_flat",
    "opentrons_96_filtertiprack_1000ul",
    "opentrons_96_tiprack_1000ul",
];

struct GridSpec {
    load_name: String,
    display_name: &'static str,
    brand: &'static str,
    category: &'static str,
    format: &'static str,
    rows: u8,
    columns: u32,
    /// Centre of A1 (x, y) and well bottom z
    origin: (f64, f64, f64),
    /// Column and row pitch
    pitch: (f64, f64),
    well_depth: f64,
    well_volume: f64,
    well_diameter: f64,
    bottom_shape: &'static str,
    dimensions: Dimensions,
    tip_length: Option<f64>,
}

/// Resolve a built-in definition by load name.
pub fn definition(load_name: &str) -> AppResult<LabwareDefinition> {
    let spec = match load_name {
        "corning_6_wellplate_16.8ml_flat" => GridSpec {
            load_name: load_name.to_string(),
            display_name: "Corning 6 Well Plate 16.8 mL Flat",
            brand: "Corning",
            category: "wellPlate",
            format: "irregular",
            rows: 2,
            columns: 3,
            origin: (24.76, 62.28, 2.87),
            pitch: (39.12, 39.12),
            well_depth: 17.4,
            well_volume: 16800.0,
            well_diameter: 35.43,
            bottom_shape: "flat",
            dimensions: Dimensions {
                x_dimension: 127.76,
                y_dimension: 85.47,
                z_dimension: 20.27,
            },
            tip_length: None,
        },
        "opentrons_96_filtertiprack_1000ul" | "opentrons_96_tiprack_1000ul" => GridSpec {
            load_name: load_name.to_string(),
            display_name: "Opentrons 96 Tip Rack 1000 uL",
            brand: "Opentrons",
            category: "tipRack",
            format: "96Standard",
            rows: 8,
            columns: 12,
            origin: (14.38, 74.38, 9.47),
            pitch: (9.0, 9.0),
            well_depth: 88.0,
            well_volume: 1000.0,
            well_diameter: 7.62,
            bottom_shape: "u",
            dimensions: Dimensions {
                x_dimension: 127.76,
                y_dimension: 85.48,
                z_dimension: 97.47,
            },
            tip_length: Some(88.0),
        },
        other => return Err(ViscometerError::UnknownLabware(other.to_string())),
    };

    Ok(build_grid(&spec))
}

fn build_grid(spec: &GridSpec) -> LabwareDefinition {
    let mut wells = BTreeMap::new();
    let mut ordering = Vec::with_capacity(spec.columns as usize);

    for column in 1..=spec.columns {
        let mut column_wells = Vec::with_capacity(spec.rows as usize);
        for row_index in 0..spec.rows {
            let name = format!("{}{}", char::from(b'A' + row_index), column);
            wells.insert(
                name.clone(),
                WellDefinition {
                    depth: spec.well_depth,
                    total_liquid_volume: spec.well_volume,
                    shape: WellShape::Circular,
                    diameter: Some(spec.well_diameter),
                    x_dimension: None,
                    y_dimension: None,
                    x: spec.origin.0 + f64::from(column - 1) * spec.pitch.0,
                    y: spec.origin.1 - f64::from(row_index) * spec.pitch.1,
                    z: spec.origin.2,
                },
            );
            column_wells.push(name);
        }
        ordering.push(column_wells);
    }

    let all_wells = ordering.iter().flatten().cloned().collect();

    LabwareDefinition {
        ordering,
        brand: Brand {
            brand: spec.brand.to_string(),
            brand_id: Vec::new(),
        },
        metadata: LabwareMetadata {
            display_name: spec.display_name.to_string(),
            display_category: spec.category.to_string(),
            display_volume_units: "µL".to_string(),
            tags: Vec::new(),
        },
        dimensions: spec.dimensions,
        wells,
        groups: vec![WellGroup {
            metadata: WellGroupMetadata {
                well_bottom_shape: Some(spec.bottom_shape.to_string()),
                display_name: None,
            },
            wells: all_wells,
        }],
        parameters: LabwareParameters {
            format: spec.format.to_string(),
            quirks: Vec::new(),
            is_tiprack: spec.tip_length.is_some(),
            tip_length: spec.tip_length,
            is_magnetic_module_compatible: false,
            load_name: spec.load_name.clone(),
        },
        namespace: "opentrons".to_string(),
        version: 1,
        schema_version: SUPPORTED_SCHEMA_VERSION,
        corner_offset_from_slot: Offset::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtins_validate() {
        for name in BUILTIN_LOAD_NAMES {
            let def = definition(name).unwrap();
            assert_eq!(def.load_name(), *name);
            def.validate().unwrap();
        }
    }

    #[test]
    fn six_well_plate_layout() {
        let def = definition("corning_6_wellplate_16.8ml_flat").unwrap();
        assert_eq!(def.wells.len(), 6);
        let order: Vec<_> = def.wells_in_order().collect();
        assert_eq!(order, vec!["A1", "B1", "A2", "B2", "A3", "B3"]);
        assert!(def.wells["B1"].y < def.wells["A1"].y);
    }

    #[test]
    fn tip_rack_is_flagged() {
        let def = definition("opentrons_96_filtertiprack_1000ul").unwrap();
        assert_eq!(def.wells.len(), 96);
        assert!(def.parameters.is_tiprack);
        assert!(def.wells.contains_key("H12"));
    }

    #[test]
    fn unknown_load_name() {
        assert!(matches!(
            definition("nest_12_reservoir_15ml"),
            Err(ViscometerError::UnknownLabware(_))
        ));
    }
}
