//! Proxy Viscometer Protocol Runner
//!
//! Replays the measurement choreography against a [`ProtocolControl`]
//! backend. For every sample:
//! 1. Dummy run: pick up the tip and exercise the touch/measure pattern
//! 2. Viscous cycles: for each flow rate, `replicates` aspirate/dispense
//!    measurements with an operator mass reading after each
//! 3. Closure: the touch/measure pattern at the last aspiration depth,
//!    purge and drop the tip
//!
//! Any backend error aborts the run and is returned unchanged; nothing is
//! retried or rolled back.
//!
//! # Configuration
//!
//! ```toml
//! [protocol]
//! flow_rates_ul_s = [50.0]
//! sample_count = 2
//! asp_time_s = 7.5
//! disp_time_s = 5.0
//! ```

use super::model::{volume_for, LiquidLevel};
use super::plan::{SampleMap, SampleWells};
use super::report::{CycleRecord, RunReport, SampleReport};
use crate::config::RunnerConfig;
use crate::error::AppResult;
use crate::hardware::capabilities::{Pipette, ProtocolControl, TouchTip};
use crate::labware::{reservoir_definition, Labware, WellRef};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Message shown to the operator before each mass reading.
pub const MEASURE_PROMPT: &str = "Time to measure.";

/// Passes of the touch/measure pattern in the dummy run and the closure.
const MEASURE_PASSES: u32 = 3;

/// Wait over the source before the reservoir touch sequence.
const RESERVOIR_SETTLE: Duration = Duration::from_secs(10);

/// Wait over the destination before touching the plate well.
const PLATE_SETTLE: Duration = Duration::from_secs(5);

/// Plate touch-tip speed (mm/s).
const PLATE_TOUCH_SPEED_MM_S: f64 = 400.0;

/// Dispense height above the destination well top (mm).
const DISPENSE_HEIGHT_MM: f64 = 10.0;

/// Touch-tip height inside the reservoir tube (mm).
const TUBE_TOUCH_DEPTH_MM: f64 = -10.0;

/// Cleanup volumes and waits.
const FLUSH_VOLUME_UL: f64 = 1000.0;
const FLUSH_SETTLE: Duration = Duration::from_secs(20);
const RINSE_VOLUME_UL: f64 = 400.0;
const RINSE_SETTLE: Duration = Duration::from_secs(10);

/// Labware and instrument in place for a run.
pub struct Deck {
    /// Falcon tube holder
    pub reservoir: Labware,
    /// Destination plate
    pub plate: Labware,
    /// Tip rack
    pub tips: Labware,
    /// Mounted pipette
    pub pipette: Arc<dyn Pipette>,
}

/// Drives one complete run.
pub struct ProtocolRunner {
    ctx: Arc<dyn ProtocolControl>,
    config: RunnerConfig,
    samples: SampleMap,
}

impl ProtocolRunner {
    /// Validate `config` and bind it to a backend.
    pub fn new(ctx: Arc<dyn ProtocolControl>, config: RunnerConfig) -> AppResult<Self> {
        config.validate()?;
        let samples = config.sample_map()?;
        Ok(Self {
            ctx,
            config,
            samples,
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Load labware and the pipette.
    pub async fn setup(&self) -> Result<Deck> {
        let labware = &self.config.labware;

        let definition = reservoir_definition(labware.reservoir_definition.as_deref())?;
        let reservoir = self
            .ctx
            .load_labware_from_definition(definition, labware.reservoir_slot)
            .await?;
        let plate = self
            .ctx
            .load_labware(&labware.plate, labware.plate_slot)
            .await?;
        let tips = self
            .ctx
            .load_labware(&labware.tip_rack, labware.tip_rack_slot)
            .await?;
        let pipette = self
            .ctx
            .load_instrument(&labware.pipette, labware.mount, std::slice::from_ref(&tips))
            .await?;

        Ok(Deck {
            reservoir,
            plate,
            tips,
            pipette,
        })
    }

    /// Set up the deck and run every sample.
    pub async fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::start();
        tracing::info!(
            run_id = %report.run_id,
            samples = self.samples.len(),
            flow_rates = ?self.config.protocol.flow_rates_ul_s,
            "starting proxy viscometer run"
        );

        let deck = self.setup().await?;
        let wells = self
            .samples
            .resolve_all(&deck.tips, &deck.reservoir, &deck.plate)?;

        for (index, sample) in wells.iter().enumerate() {
            let span = tracing::info_span!("sample", index, source = %sample.source.name);
            let sample_report = self
                .run_sample(deck.pipette.as_ref(), index, sample)
                .instrument(span)
                .await?;
            report.samples.push(sample_report);
        }

        report.finish();
        tracing::info!(summary = %report.summary(), "run complete");
        Ok(report)
    }

    /// Dummy run, viscous cycles and closure for one sample.
    ///
    /// The liquid level starts fresh for every sample.
    pub async fn run_sample(
        &self,
        pipette: &dyn Pipette,
        index: usize,
        wells: &SampleWells,
    ) -> Result<SampleReport> {
        let mut report = SampleReport::new(
            index,
            wells.tip.name.clone(),
            wells.source.name.clone(),
            wells.destination.name.clone(),
        );
        let model = self.config.calibration.liquid_level;
        let mut level = LiquidLevel::default();

        self.dummy_run(pipette, wells, &mut report).await?;

        let mut last_depth = model.depth(level);
        for &flow_rate in &self.config.protocol.flow_rates_ul_s {
            for replicate in 1..=self.config.protocol.replicates {
                let span = tracing::debug_span!("cycle", flow_rate, replicate);
                let (record, next) = self
                    .viscous_cycle(pipette, wells, flow_rate, replicate, level, &mut report)
                    .instrument(span)
                    .await?;
                last_depth = record.aspiration_depth_mm;
                level = next;
                report.cycles.push(record);
            }
        }

        self.closure(pipette, wells, last_depth, &mut report).await?;

        tracing::info!(
            cycles = report.cycles.len(),
            dispensed_ul = report.dispensed_total_ul(),
            "sample complete"
        );
        Ok(report)
    }

    // =========================================================================
    // Steps
    // =========================================================================

    /// Step 1: pick up the tip and rehearse the measurement pattern dry.
    async fn dummy_run(
        &self,
        pipette: &dyn Pipette,
        wells: &SampleWells,
        report: &mut SampleReport,
    ) -> Result<()> {
        tracing::debug!(tip = %wells.tip, "dummy run");
        pipette.pick_up_tip(&wells.tip).await?;
        report.tips_picked += 1;

        let depth = self.config.calibration.liquid_level.start_depth_mm;
        for _ in 0..MEASURE_PASSES {
            self.measure_pattern(pipette, wells, depth, report).await?;
        }
        self.purge(pipette, &wells.source).await
    }

    /// Step 2: one aspirate/dispense replicate at `flow_rate`.
    ///
    /// Aspirates at the depth implied by `level` and returns the level after
    /// the dispensed volume has left the reservoir.
    async fn viscous_cycle(
        &self,
        pipette: &dyn Pipette,
        wells: &SampleWells,
        flow_rate: f64,
        replicate: u32,
        level: LiquidLevel,
        report: &mut SampleReport,
    ) -> Result<(CycleRecord, LiquidLevel)> {
        let protocol = &self.config.protocol;
        let calibration = &self.config.calibration;
        let spec = pipette.spec();
        let slow = spec.rate_for(protocol.aspirate_flow_rate_ul_s);

        let aspirated = volume_for(flow_rate, protocol.asp_time_s);
        let dispensed = volume_for(flow_rate, protocol.disp_time_s);
        let depth = calibration.liquid_level.depth(level);
        let delay = calibration.delay_tiers.delay_for(aspirated)?;

        tracing::debug!(aspirated, depth, delay_s = delay.as_secs_f64(), "aspirate");
        pipette
            .aspirate(aspirated, &wells.source.top(depth), slow)
            .await?;
        self.ctx.delay(delay).await?;
        self.reservoir_touch_sequence(pipette, report).await?;

        pipette
            .dispense(
                dispensed,
                &wells.destination.top(DISPENSE_HEIGHT_MM),
                spec.rate_for(flow_rate),
            )
            .await?;
        pipette
            .touch_tip(
                TouchTip::at_offset(protocol.well_touch_depth_mm).speed(PLATE_TOUCH_SPEED_MM_S),
            )
            .await?;

        pipette.move_to(&wells.park.top(0.0)).await?;
        self.measure(report).await?;

        // Return the remainder to the tube and rinse the tip
        pipette
            .dispense(FLUSH_VOLUME_UL, &wells.source.top(0.0), slow)
            .await?;
        self.ctx.delay(FLUSH_SETTLE).await?;
        pipette
            .aspirate(RINSE_VOLUME_UL, &wells.source.top(0.0), slow)
            .await?;
        self.ctx.delay(RINSE_SETTLE).await?;
        pipette
            .dispense(RINSE_VOLUME_UL, &wells.source.top(0.0), slow)
            .await?;
        pipette
            .touch_tip(TouchTip::at_offset(TUBE_TOUCH_DEPTH_MM))
            .await?;
        self.purge(pipette, &wells.source).await?;

        let record = CycleRecord {
            flow_rate_ul_s: flow_rate,
            replicate,
            aspirated_ul: aspirated,
            dispensed_ul: dispensed,
            aspiration_depth_mm: depth,
            aspiration_delay_s: delay.as_secs_f64(),
        };
        Ok((record, level.after_dispense(dispensed)))
    }

    /// Step 3: final measurement passes, purge and release the tip.
    async fn closure(
        &self,
        pipette: &dyn Pipette,
        wells: &SampleWells,
        depth: f64,
        report: &mut SampleReport,
    ) -> Result<()> {
        tracing::debug!(depth, "closure");
        for _ in 0..MEASURE_PASSES {
            self.measure_pattern(pipette, wells, depth, report).await?;
        }
        self.purge(pipette, &wells.source).await?;
        pipette.drop_tip().await?;
        report.tips_dropped += 1;
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Dry pass over source and destination ending in a mass reading.
    async fn measure_pattern(
        &self,
        pipette: &dyn Pipette,
        wells: &SampleWells,
        depth: f64,
        report: &mut SampleReport,
    ) -> Result<()> {
        pipette.move_to(&wells.source.top(depth)).await?;
        self.ctx.delay(RESERVOIR_SETTLE).await?;
        self.reservoir_touch_sequence(pipette, report).await?;

        pipette.move_to(&wells.destination.top(0.0)).await?;
        self.ctx.delay(PLATE_SETTLE).await?;
        pipette
            .touch_tip(
                TouchTip::at_offset(self.config.protocol.well_touch_depth_mm)
                    .in_well(wells.destination.clone())
                    .speed(PLATE_TOUCH_SPEED_MM_S),
            )
            .await?;

        pipette.move_to(&wells.source.top(0.0)).await?;
        self.measure(report).await?;
        pipette
            .touch_tip(TouchTip::at_offset(TUBE_TOUCH_DEPTH_MM))
            .await
    }

    /// Wipe the tip on the tube walls: twice 10 mm in, once 1 mm in, once
    /// at the rim with a wider sweep.
    async fn reservoir_touch_sequence(
        &self,
        pipette: &dyn Pipette,
        report: &mut SampleReport,
    ) -> Result<()> {
        for _ in 0..2 {
            pipette
                .touch_tip(TouchTip::at_offset(TUBE_TOUCH_DEPTH_MM))
                .await?;
        }
        pipette.touch_tip(TouchTip::at_offset(-1.0)).await?;
        pipette
            .touch_tip(TouchTip::at_offset(0.0).radius(1.2))
            .await?;
        report.touch_sequences += 1;
        Ok(())
    }

    async fn measure(&self, report: &mut SampleReport) -> Result<()> {
        self.ctx.pause(MEASURE_PROMPT).await?;
        report.pauses += 1;
        Ok(())
    }

    async fn purge(&self, pipette: &dyn Pipette, well: &WellRef) -> Result<()> {
        for _ in 0..self.config.protocol.blow_out_cycles {
            pipette.blow_out(well).await?;
        }
        Ok(())
    }
}
