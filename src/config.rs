//! Run Configuration using Figment
//!
//! Strongly-typed configuration for a protocol run. Values are layered:
//! 1. Built-in defaults (the bench protocol)
//! 2. A TOML file (`config/viscometer.toml` by default)
//! 3. Environment variables prefixed with `VISCO_`, nested with `__`
//!
//! # Example
//! ```no_run
//! use proxy_viscometer::config::RunnerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunnerConfig::load()?;
//! config.validate()?;
//! println!("Flow rates: {:?}", config.protocol.flow_rates_ul_s);
//! # Ok(())
//! # }
//! ```
//!
//! `VISCO_PROTOCOL__SAMPLE_COUNT=1` overrides `protocol.sample_count`.

use crate::error::{AppResult, ViscometerError};
use crate::hardware::capabilities::{Mount, PipetteSpec};
use crate::protocol::model::{DelayTiers, LiquidLevelModel};
use crate::protocol::plan::{default_assignments, SampleAssignment, SampleMap};
use crate::tracing_setup::OutputFormat;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/viscometer.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "VISCO_";

/// Top-level run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Schedule parameters
    #[serde(default)]
    pub protocol: ProtocolParams,
    /// Empirical calibration parameters
    #[serde(default)]
    pub calibration: CalibrationConfig,
    /// Deck layout
    #[serde(default)]
    pub labware: LabwareConfig,
    /// Per-sample tip and well assignments
    #[serde(default = "default_assignments")]
    pub samples: Vec<SampleAssignment>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            application: ApplicationConfig::default(),
            protocol: ProtocolParams::default(),
            calibration: CalibrationConfig::default(),
            labware: LabwareConfig::default(),
            samples: default_assignments(),
        }
    }
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: OutputFormat::default(),
        }
    }
}

/// Parameters of the measurement schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Dispense flow rates to test, in order (uL/s)
    #[serde(default = "default_flow_rates")]
    pub flow_rates_ul_s: Vec<f64>,
    /// Number of samples to run
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,
    /// Replicates per measurement block
    #[serde(default = "default_replicates")]
    pub replicates: u32,
    /// Nominal aspiration time; aspirated volume is flow rate times this (s)
    #[serde(default = "default_asp_time")]
    pub asp_time_s: f64,
    /// Nominal dispense time; dispensed volume is flow rate times this (s)
    #[serde(default = "default_disp_time")]
    pub disp_time_s: f64,
    /// Plunger flow rate for aspiration and cleanup moves (uL/s)
    #[serde(default = "default_aspirate_flow_rate")]
    pub aspirate_flow_rate_ul_s: f64,
    /// Touch-tip height on the plate relative to the well top (mm)
    #[serde(default)]
    pub well_touch_depth_mm: f64,
    /// Blow-outs at the end of each purge
    #[serde(default = "default_blow_out_cycles")]
    pub blow_out_cycles: u32,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            flow_rates_ul_s: default_flow_rates(),
            sample_count: default_sample_count(),
            replicates: default_replicates(),
            asp_time_s: default_asp_time(),
            disp_time_s: default_disp_time(),
            aspirate_flow_rate_ul_s: default_aspirate_flow_rate(),
            well_touch_depth_mm: 0.0,
            blow_out_cycles: default_blow_out_cycles(),
        }
    }
}

/// Empirical calibration for the tube geometry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Aspiration delay tiers
    #[serde(default)]
    pub delay_tiers: DelayTiers,
    /// Liquid-level model
    #[serde(default)]
    pub liquid_level: LiquidLevelModel,
}

/// Deck layout and instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabwareConfig {
    /// Reservoir definition file; the embedded tube holder when unset
    #[serde(default)]
    pub reservoir_definition: Option<PathBuf>,
    /// Reservoir deck slot
    #[serde(default = "default_reservoir_slot")]
    pub reservoir_slot: u8,
    /// Destination plate load name
    #[serde(default = "default_plate")]
    pub plate: String,
    /// Plate deck slot
    #[serde(default = "default_plate_slot")]
    pub plate_slot: u8,
    /// Tip rack load name
    #[serde(default = "default_tip_rack")]
    pub tip_rack: String,
    /// Tip rack deck slot
    #[serde(default = "default_tip_rack_slot")]
    pub tip_rack_slot: u8,
    /// Pipette model
    #[serde(default = "default_pipette")]
    pub pipette: String,
    /// Pipette mount
    #[serde(default = "default_mount")]
    pub mount: Mount,
}

impl Default for LabwareConfig {
    fn default() -> Self {
        Self {
            reservoir_definition: None,
            reservoir_slot: default_reservoir_slot(),
            plate: default_plate(),
            plate_slot: default_plate_slot(),
            tip_rack: default_tip_rack(),
            tip_rack_slot: default_tip_rack_slot(),
            pipette: default_pipette(),
            mount: default_mount(),
        }
    }
}

// Default value functions
fn default_name() -> String {
    "Proxy Viscometer".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_flow_rates() -> Vec<f64> {
    vec![50.0]
}

fn default_sample_count() -> usize {
    2
}

fn default_replicates() -> u32 {
    3
}

fn default_asp_time() -> f64 {
    7.5
}

fn default_disp_time() -> f64 {
    5.0
}

fn default_aspirate_flow_rate() -> f64 {
    100.0
}

fn default_blow_out_cycles() -> u32 {
    10
}

fn default_reservoir_slot() -> u8 {
    1
}

fn default_plate() -> String {
    "corning_6_wellplate_16.8ml_flat".to_string()
}

fn default_plate_slot() -> u8 {
    2
}

fn default_tip_rack() -> String {
    "opentrons_96_filtertiprack_1000ul".to_string()
}

fn default_tip_rack_slot() -> u8 {
    7
}

fn default_pipette() -> String {
    "p1000_single".to_string()
}

fn default_mount() -> Mount {
    Mount::Left
}

impl RunnerConfig {
    /// Load from the default file (if present) and environment variables.
    pub fn load() -> AppResult<Self> {
        Ok(Self::figment(Some(Path::new(DEFAULT_CONFIG_PATH))).extract()?)
    }

    /// Load from a specific file, which must exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ViscometerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file not found: {}", path.display()),
            )));
        }
        Ok(Self::figment(Some(path)).extract()?)
    }

    /// Defaults overlaid with an optional TOML file and the environment.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(ViscometerError::Configuration(msg));

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let protocol = &self.protocol;
        if protocol.flow_rates_ul_s.is_empty() {
            return invalid("flow_rates_ul_s must list at least one flow rate".to_string());
        }
        if let Some(bad) = protocol
            .flow_rates_ul_s
            .iter()
            .find(|fr| !fr.is_finite() || **fr <= 0.0)
        {
            return invalid(format!("flow rate {bad} uL/s is not positive"));
        }
        for (name, value) in [
            ("asp_time_s", protocol.asp_time_s),
            ("disp_time_s", protocol.disp_time_s),
            ("aspirate_flow_rate_ul_s", protocol.aspirate_flow_rate_ul_s),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return invalid(format!("{name} must be positive (got {value})"));
            }
        }
        if protocol.replicates == 0 {
            return invalid("replicates must be at least 1".to_string());
        }
        if !protocol.well_touch_depth_mm.is_finite() {
            return invalid("well_touch_depth_mm must be a number".to_string());
        }

        self.calibration.delay_tiers.validate()?;
        self.calibration.liquid_level.validate()?;

        // Every aspiration must fit in the pipette
        let spec = PipetteSpec::lookup(&self.labware.pipette)?;
        for fr in &protocol.flow_rates_ul_s {
            let volume = fr * protocol.asp_time_s;
            if volume > spec.max_volume_ul {
                return invalid(format!(
                    "flow rate {fr} uL/s aspirates {volume} uL, more than the {} holds ({} uL)",
                    spec.model, spec.max_volume_ul
                ));
            }
        }

        // Plunger moves at every configured rate must be timeable
        for rate in protocol
            .flow_rates_ul_s
            .iter()
            .chain([&protocol.aspirate_flow_rate_ul_s])
        {
            if Duration::try_from_secs_f64(spec.max_volume_ul / rate).is_err() {
                return invalid(format!(
                    "flow rate {rate} uL/s is too slow to move {} uL",
                    spec.max_volume_ul
                ));
            }
        }

        // Validate slots are distinct
        let slots = [
            self.labware.reservoir_slot,
            self.labware.plate_slot,
            self.labware.tip_rack_slot,
        ];
        if slots[0] == slots[1] || slots[0] == slots[2] || slots[1] == slots[2] {
            return invalid(format!("labware slots must be distinct (got {slots:?})"));
        }

        self.sample_map().map(|_| ())
    }

    /// Effective configuration rendered as TOML.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ViscometerError::Configuration(format!("cannot render config: {e}")))
    }

    /// Sample map for the configured sample count.
    pub fn sample_map(&self) -> AppResult<SampleMap> {
        SampleMap::new(&self.samples, self.protocol.sample_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_reproduce_bench_protocol() {
        let config = RunnerConfig::default();
        assert_eq!(config.protocol.flow_rates_ul_s, vec![50.0]);
        assert_eq!(config.protocol.sample_count, 2);
        assert_eq!(config.protocol.asp_time_s, 7.5);
        assert_eq!(config.protocol.disp_time_s, 5.0);
        assert_eq!(config.calibration.liquid_level.start_depth_mm, -80.0);
        assert_eq!(config.labware.mount, Mount::Left);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rates_too_slow_to_time_are_rejected() {
        let mut config = RunnerConfig::default();
        config.protocol.aspirate_flow_rate_ul_s = 1e-18;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("too slow"));

        let mut config = RunnerConfig::default();
        config.protocol.flow_rates_ul_s = vec![50.0, 1e-18];
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[application]
log_level = "debug"

[protocol]
flow_rates_ul_s = [20.0, 50.0]
sample_count = 1

[calibration.liquid_level]
mm_per_ml = 2.0

[[samples]]
tip = "B1"
source = "B1"
park = "B4"
destination = "A2"
"#
        )
        .unwrap();

        let config = RunnerConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.protocol.flow_rates_ul_s, vec![20.0, 50.0]);
        assert_eq!(config.protocol.replicates, 3);
        assert_eq!(config.calibration.liquid_level.mm_per_ml, 2.0);
        assert_eq!(config.calibration.liquid_level.start_depth_mm, -80.0);
        assert_eq!(config.samples.len(), 1);
        assert_eq!(config.samples[0].destination.as_str(), "A2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rendered_toml_loads_back() {
        let mut config = RunnerConfig::default();
        config.protocol.flow_rates_ul_s = vec![20.0, 80.0];
        config.labware.reservoir_definition = Some(PathBuf::from("labware/tubes.json"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();
        assert_eq!(RunnerConfig::load_from(file.path()).unwrap(), config);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = RunnerConfig::load_from("/nonexistent/viscometer.toml").unwrap_err();
        assert!(matches!(err, ViscometerError::Io(_)));
    }

    #[test]
    fn invalid_well_name_fails_extraction() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[samples]]
tip = "A1"
source = "1A"
park = "A4"
destination = "A1"
"#
        )
        .unwrap();
        assert!(matches!(
            RunnerConfig::load_from(file.path()),
            Err(ViscometerError::Figment(_))
        ));
    }

    #[test]
    fn too_many_samples() {
        let mut config = RunnerConfig::default();
        config.protocol.sample_count = 3;
        assert!(matches!(
            config.validate(),
            Err(ViscometerError::Configuration(_))
        ));
    }

    #[test]
    fn invalid_log_level() {
        let mut config = RunnerConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn flow_rate_checks() {
        let mut config = RunnerConfig::default();
        config.protocol.flow_rates_ul_s.clear();
        assert!(config.validate().is_err());

        config.protocol.flow_rates_ul_s = vec![50.0, -5.0];
        assert!(config.validate().is_err());

        // 150 uL/s * 7.5 s = 1125 uL, over the p1000 capacity
        config.protocol.flow_rates_ul_s = vec![150.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn slots_must_be_distinct() {
        let mut config = RunnerConfig::default();
        config.labware.plate_slot = config.labware.reservoir_slot;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_replicates() {
        let mut config = RunnerConfig::default();
        config.protocol.replicates = 0;
        assert!(config.validate().is_err());
    }
}
