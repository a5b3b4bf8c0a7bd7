//! Run reports
//!
//! Structured record of what a run executed: one entry per sample with its
//! viscous cycles, plus run identity and timing.

use crate::error::AppResult;
use crate::labware::WellName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// One aspirate/dispense replicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// Flow rate under test (uL/s)
    pub flow_rate_ul_s: f64,
    /// 1-based replicate number within the flow rate
    pub replicate: u32,
    /// Volume aspirated from the reservoir (uL)
    pub aspirated_ul: f64,
    /// Volume dispensed into the plate (uL)
    pub dispensed_ul: f64,
    /// Aspiration height relative to the tube top (mm)
    pub aspiration_depth_mm: f64,
    /// Wait after aspiration (s)
    pub aspiration_delay_s: f64,
}

/// Everything done for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleReport {
    /// 0-based sample index
    pub index: usize,
    /// Tip used
    pub tip: WellName,
    /// Reservoir tube
    pub source: WellName,
    /// Plate well
    pub destination: WellName,
    /// Viscous cycles in execution order
    pub cycles: Vec<CycleRecord>,
    /// Reservoir touch-tip sequences performed
    pub touch_sequences: u32,
    /// Operator pauses
    pub pauses: u32,
    /// Tips picked up
    pub tips_picked: u32,
    /// Tips dropped
    pub tips_dropped: u32,
}

impl SampleReport {
    /// Empty report for a sample about to run.
    pub fn new(index: usize, tip: WellName, source: WellName, destination: WellName) -> Self {
        Self {
            index,
            tip,
            source,
            destination,
            cycles: Vec::new(),
            touch_sequences: 0,
            pauses: 0,
            tips_picked: 0,
            tips_dropped: 0,
        }
    }

    /// Volume dispensed into the plate over all cycles.
    pub fn dispensed_total_ul(&self) -> f64 {
        self.cycles.iter().map(|c| c.dispensed_ul).sum()
    }
}

/// Result of a complete protocol run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run ID
    pub run_id: Uuid,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall-clock end
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Per-sample breakdown
    pub samples: Vec<SampleReport>,
    /// Commands accepted by the robot, when the backend reports it
    #[serde(default)]
    pub commands_issued: Option<usize>,
}

impl RunReport {
    /// Start a new report stamped with the current time.
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            samples: Vec::new(),
            commands_issued: None,
        }
    }

    /// Stamp the end time.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Viscous cycles across all samples.
    pub fn total_cycles(&self) -> usize {
        self.samples.iter().map(|s| s.cycles.len()).sum()
    }

    /// Operator pauses across all samples.
    pub fn total_pauses(&self) -> u32 {
        self.samples.iter().map(|s| s.pauses).sum()
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        let duration = self
            .finished_at
            .map(|end| format!("{:.1}s", (end - self.started_at).num_milliseconds() as f64 / 1000.0))
            .unwrap_or_else(|| "unfinished".to_string());
        format!(
            "run {} - {} samples, {} cycles, {} pauses - {}",
            self.run_id,
            self.samples.len(),
            self.total_cycles(),
            self.total_pauses(),
            duration
        )
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> AppResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
