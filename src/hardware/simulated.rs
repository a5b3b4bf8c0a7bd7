//! Simulated Pipetting Robot
//!
//! Provides a simulated robot for dry runs and testing without hardware.
//! All waits use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! The simulation is strict: it enforces the same preconditions the real
//! robot would refuse to execute, so a schedule that passes here does not
//! fail on the deck for bookkeeping reasons.
//!
//! - Deck slots 1-11, one labware per slot
//! - Locations must name a loaded labware and one of its wells, and stay
//!   above the well bottom
//! - One tip at a time, tips taken only from assigned racks, never reused
//! - Held volume is tracked against the pipette capacity
//!
//! Every accepted call is appended to an ordered [`Command`] log.
//!
//! # Timing
//!
//! With `realtime` disabled (the default) delays and plunger moves are only
//! recorded. With it enabled they sleep for their nominal duration.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;

use super::capabilities::{Mount, Pipette, PipetteSpec, ProtocolControl, TouchTip};
use super::command::Command;
use super::operator::Operator;
use crate::error::ViscometerError;
use crate::labware::{builtin, Anchor, Labware, LabwareDefinition, Location, WellDefinition, WellRef};

/// Highest deck slot number.
pub const DECK_SLOTS: u8 = 11;

struct Shared {
    deck: RwLock<BTreeMap<u8, Labware>>,
    mounts: Mutex<BTreeMap<Mount, String>>,
    log: Mutex<Vec<Command>>,
    operator: Arc<dyn Operator>,
    realtime: bool,
}

impl Shared {
    async fn record(&self, command: Command) {
        tracing::trace!(command = command.kind(), "recorded");
        self.log.lock().await.push(command);
    }

    async fn wait(&self, duration: Duration) {
        if self.realtime && !duration.is_zero() {
            sleep(duration).await;
        }
    }

    /// Geometry of `well`, checking it is on the deck.
    async fn resolve(&self, well: &WellRef) -> Result<WellDefinition, ViscometerError> {
        let deck = self.deck.read().await;
        let labware = deck
            .get(&well.slot)
            .ok_or(ViscometerError::EmptySlot(well.slot))?;
        if labware.load_name() != well.labware {
            return Err(ViscometerError::UnknownWell {
                labware: well.labware.clone(),
                well: well.name.to_string(),
            });
        }
        labware.definition().well(&well.name).cloned()
    }

    async fn check_location(&self, location: &Location) -> Result<(), ViscometerError> {
        let geometry = self.resolve(&location.well).await?;
        let height_above_bottom = match location.anchor {
            Anchor::Top => geometry.depth + location.offset_mm,
            Anchor::Bottom => location.offset_mm,
        };
        if height_above_bottom < 0.0 {
            return Err(ViscometerError::Unreachable {
                location: location.to_string(),
                reason: format!(
                    "{:.2} mm below the bottom of a {:.2} mm deep well",
                    -height_above_bottom, geometry.depth
                ),
            });
        }
        Ok(())
    }
}

// =============================================================================
// SimulatedRobot - protocol-level control
// =============================================================================

/// Simulated robot implementing [`ProtocolControl`].
///
/// # Example
///
/// ```rust,ignore
/// let robot = SimulatedRobot::new(Arc::new(AutoResumeOperator::new()));
/// let plate = robot.load_labware("corning_6_wellplate_16.8ml_flat", 2).await?;
/// assert_eq!(robot.commands().await.len(), 1);
/// ```
#[derive(Clone)]
pub struct SimulatedRobot {
    shared: Arc<Shared>,
}

impl SimulatedRobot {
    /// Create a robot with an empty deck that records delays without waiting.
    pub fn new(operator: Arc<dyn Operator>) -> Self {
        Self::with_realtime(operator, false)
    }

    /// Create a robot that optionally performs delays in real time.
    pub fn with_realtime(operator: Arc<dyn Operator>, realtime: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                deck: RwLock::new(BTreeMap::new()),
                mounts: Mutex::new(BTreeMap::new()),
                log: Mutex::new(Vec::new()),
                operator,
                realtime,
            }),
        }
    }

    /// Snapshot of the command log.
    pub async fn commands(&self) -> Vec<Command> {
        self.shared.log.lock().await.clone()
    }

    /// Number of commands accepted so far.
    pub async fn command_count(&self) -> usize {
        self.shared.log.lock().await.len()
    }

    /// Labware currently on the deck.
    pub async fn deck(&self) -> Vec<Labware> {
        self.shared.deck.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl ProtocolControl for SimulatedRobot {
    async fn load_labware(&self, load_name: &str, slot: u8) -> Result<Labware> {
        let definition = builtin::definition(load_name)?;
        self.load_labware_from_definition(definition, slot).await
    }

    async fn load_labware_from_definition(
        &self,
        definition: LabwareDefinition,
        slot: u8,
    ) -> Result<Labware> {
        if slot == 0 || slot > DECK_SLOTS {
            return Err(ViscometerError::InvalidSlot(slot).into());
        }
        definition.validate()?;

        let labware = {
            let mut deck = self.shared.deck.write().await;
            if let Some(occupant) = deck.get(&slot) {
                return Err(ViscometerError::SlotOccupied {
                    slot,
                    occupant: occupant.load_name().to_string(),
                }
                .into());
            }
            let labware = Labware::new(slot, Arc::new(definition));
            deck.insert(slot, labware.clone());
            labware
        };

        tracing::info!(slot, load_name = labware.load_name(), "labware loaded");
        self.shared
            .record(Command::LoadLabware {
                slot,
                load_name: labware.load_name().to_string(),
                namespace: labware.definition().namespace.clone(),
            })
            .await;
        Ok(labware)
    }

    async fn load_instrument(
        &self,
        model: &str,
        mount: Mount,
        tip_racks: &[Labware],
    ) -> Result<Arc<dyn Pipette>> {
        let spec = PipetteSpec::lookup(model)?;

        for rack in tip_racks {
            if !rack.is_tiprack() {
                return Err(ViscometerError::Configuration(format!(
                    "{} in slot {} is not a tip rack",
                    rack.load_name(),
                    rack.slot()
                ))
                .into());
            }
            let deck = self.shared.deck.read().await;
            let on_deck = deck
                .get(&rack.slot())
                .is_some_and(|l| l.load_name() == rack.load_name());
            if !on_deck {
                return Err(ViscometerError::EmptySlot(rack.slot()).into());
            }
        }

        {
            let mut mounts = self.shared.mounts.lock().await;
            if let Some(existing) = mounts.get(&mount) {
                return Err(ViscometerError::Configuration(format!(
                    "{mount} mount already carries {existing}"
                ))
                .into());
            }
            mounts.insert(mount, spec.model.clone());
        }

        tracing::info!(model, %mount, tip_racks = tip_racks.len(), "instrument loaded");
        self.shared
            .record(Command::LoadInstrument {
                model: spec.model.clone(),
                mount,
            })
            .await;

        Ok(Arc::new(SimulatedPipette {
            spec,
            mount,
            tip_racks: tip_racks.to_vec(),
            state: Mutex::new(PipetteState::default()),
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn delay(&self, duration: Duration) -> Result<()> {
        tracing::debug!(seconds = duration.as_secs_f64(), "delay");
        self.shared
            .record(Command::Delay {
                seconds: duration.as_secs_f64(),
            })
            .await;
        self.shared.wait(duration).await;
        Ok(())
    }

    async fn pause(&self, message: &str) -> Result<()> {
        tracing::info!(%message, "paused for operator");
        self.shared
            .record(Command::Pause {
                message: message.to_string(),
            })
            .await;
        self.shared.operator.pause(message).await
    }
}

// =============================================================================
// SimulatedPipette - liquid handling
// =============================================================================

#[derive(Debug, Default)]
struct PipetteState {
    tip: Option<WellRef>,
    used_tips: HashSet<WellRef>,
    held_ul: f64,
    current_well: Option<WellRef>,
}

impl PipetteState {
    fn require_tip(&self) -> Result<(), ViscometerError> {
        if self.tip.is_none() {
            return Err(ViscometerError::NoTipAttached);
        }
        Ok(())
    }
}

/// Simulated pipette returned by [`SimulatedRobot::load_instrument`].
pub struct SimulatedPipette {
    spec: PipetteSpec,
    mount: Mount,
    tip_racks: Vec<Labware>,
    state: Mutex<PipetteState>,
    shared: Arc<Shared>,
}

impl SimulatedPipette {
    /// Volume currently held in the tip.
    pub async fn held_volume(&self) -> f64 {
        self.state.lock().await.held_ul
    }

    /// Whether a tip is attached.
    pub async fn has_tip(&self) -> bool {
        self.state.lock().await.tip.is_some()
    }

    fn flow_rate(&self, volume_ul: f64, rate: f64) -> Result<f64, ViscometerError> {
        if !volume_ul.is_finite() || volume_ul < 0.0 {
            return Err(ViscometerError::InvalidCommand(format!(
                "volume must be non-negative, got {volume_ul}"
            )));
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ViscometerError::InvalidCommand(format!(
                "rate must be positive, got {rate}"
            )));
        }
        Ok(self.spec.flow_rate(rate))
    }
}

/// Time the plunger takes to move `volume_ul` at `flow_rate_ul_s`.
fn plunger_time(volume_ul: f64, flow_rate_ul_s: f64) -> Result<Duration, ViscometerError> {
    Duration::try_from_secs_f64(volume_ul / flow_rate_ul_s).map_err(|_| {
        ViscometerError::InvalidCommand(format!(
            "moving {volume_ul} uL at {flow_rate_ul_s} uL/s does not finish in a representable time"
        ))
    })
}

#[async_trait]
impl Pipette for SimulatedPipette {
    fn spec(&self) -> &PipetteSpec {
        &self.spec
    }

    fn mount(&self) -> Mount {
        self.mount
    }

    async fn pick_up_tip(&self, tip: &WellRef) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.tip.is_some() {
            return Err(ViscometerError::TipAlreadyAttached.into());
        }
        let assigned = self
            .tip_racks
            .iter()
            .any(|rack| rack.slot() == tip.slot && rack.load_name() == tip.labware);
        if !assigned || state.used_tips.contains(tip) {
            return Err(ViscometerError::TipUnavailable(tip.to_string()).into());
        }
        self.shared.resolve(tip).await?;

        state.used_tips.insert(tip.clone());
        state.tip = Some(tip.clone());
        state.held_ul = 0.0;
        state.current_well = Some(tip.clone());
        drop(state);

        tracing::debug!(tip = %tip, "tip picked up");
        self.shared.record(Command::PickUpTip { tip: tip.clone() }).await;
        Ok(())
    }

    async fn drop_tip(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let tip = state.tip.take().ok_or(ViscometerError::NoTipAttached)?;
        state.held_ul = 0.0;
        state.current_well = None;
        drop(state);

        tracing::debug!(tip = %tip, "tip dropped");
        self.shared.record(Command::DropTip).await;
        Ok(())
    }

    async fn move_to(&self, location: &Location) -> Result<()> {
        self.shared.check_location(location).await?;
        self.state.lock().await.current_well = Some(location.well.clone());
        self.shared
            .record(Command::MoveTo {
                location: location.clone(),
            })
            .await;
        Ok(())
    }

    async fn aspirate(&self, volume_ul: f64, location: &Location, rate: f64) -> Result<()> {
        let flow_rate_ul_s = self.flow_rate(volume_ul, rate)?;
        let travel = plunger_time(volume_ul, flow_rate_ul_s)?;
        {
            let mut state = self.state.lock().await;
            state.require_tip()?;
            if state.held_ul + volume_ul > self.spec.max_volume_ul {
                return Err(ViscometerError::VolumeExceeded {
                    requested_ul: volume_ul,
                    held_ul: state.held_ul,
                    max_ul: self.spec.max_volume_ul,
                }
                .into());
            }
            self.shared.check_location(location).await?;
            state.held_ul += volume_ul;
            state.current_well = Some(location.well.clone());
        }

        tracing::debug!(volume_ul, flow_rate_ul_s, location = %location, "aspirate");
        self.shared
            .record(Command::Aspirate {
                volume_ul,
                location: location.clone(),
                flow_rate_ul_s,
            })
            .await;
        self.shared.wait(travel).await;
        Ok(())
    }

    async fn dispense(&self, volume_ul: f64, location: &Location, rate: f64) -> Result<()> {
        let flow_rate_ul_s = self.flow_rate(volume_ul, rate)?;
        plunger_time(volume_ul, flow_rate_ul_s)?;
        let expelled = {
            let mut state = self.state.lock().await;
            state.require_tip()?;
            self.shared.check_location(location).await?;
            let expelled = volume_ul.min(state.held_ul);
            state.held_ul -= expelled;
            state.current_well = Some(location.well.clone());
            expelled
        };

        if expelled < volume_ul {
            tracing::debug!(
                requested_ul = volume_ul,
                expelled_ul = expelled,
                "dispense limited to held volume"
            );
        }
        tracing::debug!(volume_ul, flow_rate_ul_s, location = %location, "dispense");
        self.shared
            .record(Command::Dispense {
                volume_ul,
                location: location.clone(),
                flow_rate_ul_s,
            })
            .await;
        // Never longer than the full-volume move checked above
        self.shared
            .wait(plunger_time(expelled, flow_rate_ul_s)?)
            .await;
        Ok(())
    }

    async fn touch_tip(&self, touch: TouchTip) -> Result<()> {
        let well = {
            let mut state = self.state.lock().await;
            state.require_tip()?;
            let well = match touch.well {
                Some(well) => well,
                None => state
                    .current_well
                    .clone()
                    .ok_or(ViscometerError::NoCurrentWell("touch_tip"))?,
            };
            let location = well.top(touch.v_offset_mm);
            self.shared.check_location(&location).await?;
            state.current_well = Some(well.clone());
            well
        };

        self.shared
            .record(Command::TouchTip {
                well,
                radius: touch.radius,
                v_offset_mm: touch.v_offset_mm,
                speed_mm_s: touch.speed_mm_s,
            })
            .await;
        Ok(())
    }

    async fn blow_out(&self, well: &WellRef) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.require_tip()?;
            self.shared.resolve(well).await?;
            state.held_ul = 0.0;
            state.current_well = Some(well.clone());
        }
        self.shared.record(Command::BlowOut { well: well.clone() }).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::operator::AutoResumeOperator;
    use crate::labware::falcon_tube_holder;

    const TIPS: &str = "opentrons_96_filtertiprack_1000ul";

    struct Rig {
        robot: SimulatedRobot,
        operator: Arc<AutoResumeOperator>,
        reservoir: Labware,
        tips: Labware,
        pipette: Arc<dyn Pipette>,
    }

    async fn rig() -> Rig {
        let operator = Arc::new(AutoResumeOperator::new());
        let robot = SimulatedRobot::new(operator.clone());
        let reservoir = robot
            .load_labware_from_definition(falcon_tube_holder().unwrap(), 1)
            .await
            .unwrap();
        let tips = robot.load_labware(TIPS, 7).await.unwrap();
        let pipette = robot
            .load_instrument("p1000_single", Mount::Left, &[tips.clone()])
            .await
            .unwrap();
        Rig {
            robot,
            operator,
            reservoir,
            tips,
            pipette,
        }
    }

    fn well(labware: &Labware, name: &str) -> WellRef {
        labware.well(&name.parse().unwrap()).unwrap()
    }

    fn domain(err: &anyhow::Error) -> &ViscometerError {
        err.downcast_ref::<ViscometerError>().unwrap()
    }

    #[tokio::test]
    async fn rejects_double_slot_and_bad_slot() {
        let rig = rig().await;
        let err = rig
            .robot
            .load_labware("corning_6_wellplate_16.8ml_flat", 1)
            .await
            .unwrap_err();
        assert!(matches!(domain(&err), ViscometerError::SlotOccupied { slot: 1, .. }));

        let err = rig
            .robot
            .load_labware("corning_6_wellplate_16.8ml_flat", 12)
            .await
            .unwrap_err();
        assert!(matches!(domain(&err), ViscometerError::InvalidSlot(12)));
    }

    #[tokio::test]
    async fn tip_lifecycle_is_enforced() {
        let rig = rig().await;
        let source = well(&rig.reservoir, "A1").top(-80.0);

        let err = rig.pipette.aspirate(100.0, &source, 0.5).await.unwrap_err();
        assert!(matches!(domain(&err), ViscometerError::NoTipAttached));

        let tip = well(&rig.tips, "A1");
        rig.pipette.pick_up_tip(&tip).await.unwrap();
        let err = rig.pipette.pick_up_tip(&well(&rig.tips, "A2")).await.unwrap_err();
        assert!(matches!(domain(&err), ViscometerError::TipAlreadyAttached));

        rig.pipette.drop_tip().await.unwrap();
        let err = rig.pipette.drop_tip().await.unwrap_err();
        assert!(matches!(domain(&err), ViscometerError::NoTipAttached));

        let err = rig.pipette.pick_up_tip(&tip).await.unwrap_err();
        assert!(matches!(domain(&err), ViscometerError::TipUnavailable(_)));
    }

    #[tokio::test]
    async fn tips_only_from_assigned_racks() {
        let rig = rig().await;
        let err = rig
            .pipette
            .pick_up_tip(&well(&rig.reservoir, "A1"))
            .await
            .unwrap_err();
        assert!(matches!(domain(&err), ViscometerError::TipUnavailable(_)));
    }

    #[tokio::test]
    async fn volume_tracking() {
        let rig = rig().await;
        rig.pipette.pick_up_tip(&well(&rig.tips, "A1")).await.unwrap();
        let top = well(&rig.reservoir, "A1").top(0.0);

        rig.pipette.aspirate(375.0, &top, 0.5).await.unwrap();
        rig.pipette.dispense(1000.0, &top, 0.5).await.unwrap();
        rig.pipette.aspirate(1000.0, &top, 0.5).await.unwrap();

        let err = rig.pipette.aspirate(1.0, &top, 0.5).await.unwrap_err();
        assert!(matches!(domain(&err), ViscometerError::VolumeExceeded { .. }));

        let err = rig.pipette.dispense(10.0, &top, 0.0).await.unwrap_err();
        assert!(matches!(domain(&err), ViscometerError::InvalidCommand(_)));
    }

    #[tokio::test]
    async fn plunger_moves_too_slow_to_time_are_rejected() {
        let rig = rig().await;
        rig.pipette.pick_up_tip(&well(&rig.tips, "A1")).await.unwrap();
        let top = well(&rig.reservoir, "A1").top(0.0);
        let issued = rig.robot.command_count().await;

        let err = rig.pipette.aspirate(1000.0, &top, 1e-20).await.unwrap_err();
        assert!(matches!(domain(&err), ViscometerError::InvalidCommand(_)));
        let err = rig.pipette.dispense(1000.0, &top, 1e-20).await.unwrap_err();
        assert!(matches!(domain(&err), ViscometerError::InvalidCommand(_)));
        assert_eq!(rig.robot.command_count().await, issued);

        // Nothing was drawn up by the rejected aspirate
        rig.pipette.aspirate(1000.0, &top, 0.5).await.unwrap();
    }

    #[tokio::test]
    async fn locations_below_the_bottom_are_unreachable() {
        let rig = rig().await;
        let tube = well(&rig.reservoir, "A1");
        rig.pipette.move_to(&tube.top(-115.0)).await.unwrap();
        let err = rig.pipette.move_to(&tube.top(-120.0)).await.unwrap_err();
        assert!(matches!(domain(&err), ViscometerError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn touch_tip_uses_current_well() {
        let rig = rig().await;
        rig.pipette.pick_up_tip(&well(&rig.tips, "A1")).await.unwrap();
        rig.pipette
            .move_to(&well(&rig.reservoir, "C1").top(-80.0))
            .await
            .unwrap();
        rig.pipette
            .touch_tip(TouchTip::at_offset(-10.0))
            .await
            .unwrap();

        match rig.robot.commands().await.last() {
            Some(Command::TouchTip { well, v_offset_mm, .. }) => {
                assert_eq!(well.name.as_str(), "C1");
                assert_eq!(*v_offset_mm, -10.0);
            }
            other => panic!("unexpected last command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn pause_goes_to_operator_and_log() {
        let rig = rig().await;
        rig.robot.pause("Time to measure.").await.unwrap();
        rig.robot.delay(Duration::from_secs(20)).await.unwrap();

        assert_eq!(rig.operator.pause_count(), 1);
        let commands = rig.robot.commands().await;
        assert_eq!(
            commands[commands.len() - 2],
            Command::Pause {
                message: "Time to measure.".to_string()
            }
        );
        assert_eq!(commands[commands.len() - 1], Command::Delay { seconds: 20.0 });
    }

    #[tokio::test]
    async fn mount_can_only_be_used_once() {
        let rig = rig().await;
        let err = rig
            .robot
            .load_instrument("p300_single", Mount::Left, &[rig.tips.clone()])
            .await
            .err()
            .unwrap();
        assert!(matches!(domain(&err), ViscometerError::Configuration(_)));
    }
}
