//! Sample plan
//!
//! Maps each sample index to the tip it uses and the wells it visits. The
//! map is validated when the run is configured and again once labware is on
//! the deck, so the runner never indexes past the end of it.

use crate::error::{AppResult, ViscometerError};
use crate::labware::{Labware, WellName, WellRef, WellRow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::num::NonZeroU32;

/// Positions used by one sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleAssignment {
    /// Tip rack position
    pub tip: WellName,
    /// Reservoir tube holding the sample
    pub source: WellName,
    /// Reservoir position the arm rests over during mass readings
    pub park: WellName,
    /// Plate well receiving the dispensed liquid
    pub destination: WellName,
}

impl SampleAssignment {
    /// Assignment using tip `A{tip_column}`, reservoir row `reservoir_row`
    /// (source column 1, park column 4) and plate well `{plate_row}1`.
    pub fn from_rows(tip_column: NonZeroU32, reservoir_row: WellRow, plate_row: WellRow) -> Self {
        let first = NonZeroU32::MIN;
        Self {
            tip: WellName::at(WellRow::A, tip_column),
            source: WellName::at(reservoir_row, first),
            park: WellName::at(reservoir_row, first.saturating_add(3)),
            destination: WellName::at(plate_row, first),
        }
    }
}

/// Default two-sample layout: tubes A and C into plate wells A1 and B1.
pub fn default_assignments() -> Vec<SampleAssignment> {
    let first = NonZeroU32::MIN;
    vec![
        SampleAssignment::from_rows(first, WellRow::A, WellRow::A),
        SampleAssignment::from_rows(first.saturating_add(1), WellRow::C, WellRow::B),
    ]
}

/// Wells of one assignment resolved against loaded labware.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWells {
    /// Tip to pick up
    pub tip: WellRef,
    /// Reservoir tube
    pub source: WellRef,
    /// Rest position for mass readings
    pub park: WellRef,
    /// Plate well
    pub destination: WellRef,
}

/// Validated sample-index to assignment mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleMap {
    assignments: Vec<SampleAssignment>,
}

impl SampleMap {
    /// Keep the first `sample_count` assignments.
    ///
    /// Fails when fewer assignments than samples are configured or when two
    /// samples would share a tip.
    pub fn new(assignments: &[SampleAssignment], sample_count: usize) -> AppResult<Self> {
        if sample_count > assignments.len() {
            return Err(ViscometerError::Configuration(format!(
                "sample_count is {sample_count} but only {} sample assignments are configured",
                assignments.len()
            )));
        }
        let assignments = assignments[..sample_count].to_vec();

        let mut tips = HashSet::new();
        if let Some(shared) = assignments.iter().find(|a| !tips.insert(&a.tip)) {
            return Err(ViscometerError::Configuration(format!(
                "tip {} is assigned to more than one sample",
                shared.tip
            )));
        }

        Ok(Self { assignments })
    }

    /// Number of samples to run.
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Whether no samples are planned.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Assignment of sample `index`.
    pub fn get(&self, index: usize) -> Option<&SampleAssignment> {
        self.assignments.get(index)
    }

    /// Assignments in run order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SampleAssignment)> {
        self.assignments.iter().enumerate()
    }

    /// Resolve sample `index` against the loaded labware.
    pub fn resolve(
        &self,
        index: usize,
        tips: &Labware,
        reservoir: &Labware,
        plate: &Labware,
    ) -> AppResult<SampleWells> {
        let assignment = self.get(index).ok_or_else(|| {
            ViscometerError::Configuration(format!(
                "sample {index} is outside the {}-sample plan",
                self.len()
            ))
        })?;
        Ok(SampleWells {
            tip: tips.well(&assignment.tip)?,
            source: reservoir.well(&assignment.source)?,
            park: reservoir.well(&assignment.park)?,
            destination: plate.well(&assignment.destination)?,
        })
    }

    /// Resolve every sample, surfacing the first well that does not exist.
    pub fn resolve_all(
        &self,
        tips: &Labware,
        reservoir: &Labware,
        plate: &Labware,
    ) -> AppResult<Vec<SampleWells>> {
        (0..self.len())
            .map(|i| self.resolve(i, tips, reservoir, plate))
            .collect()
    }
}
