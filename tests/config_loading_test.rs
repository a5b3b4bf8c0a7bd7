//! Tests for layered run configuration: defaults, TOML file, environment.

use proxy_viscometer::config::RunnerConfig;
use proxy_viscometer::hardware::Mount;
use proxy_viscometer::tracing_setup::OutputFormat;
use serial_test::serial;
use std::io::Write;
use std::path::Path;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_shipped_config_matches_defaults() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/viscometer.toml");
    let config = RunnerConfig::load_from(&path).unwrap();
    assert_eq!(config, RunnerConfig::default());
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_env_overrides_file() {
    let file = write_config(
        r#"
[protocol]
sample_count = 2
flow_rates_ul_s = [50.0]
"#,
    );

    std::env::set_var("VISCO_PROTOCOL__SAMPLE_COUNT", "1");
    std::env::set_var("VISCO_APPLICATION__LOG_FORMAT", "json");
    let result = RunnerConfig::load_from(file.path());
    std::env::remove_var("VISCO_PROTOCOL__SAMPLE_COUNT");
    std::env::remove_var("VISCO_APPLICATION__LOG_FORMAT");

    let config = result.unwrap();
    assert_eq!(config.protocol.sample_count, 1);
    assert_eq!(config.application.log_format, OutputFormat::Json);
    assert_eq!(config.protocol.flow_rates_ul_s, vec![50.0]);
}

#[test]
#[serial]
fn test_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
[labware]
mount = "right"
plate_slot = 3
"#,
    );

    let config = RunnerConfig::load_from(file.path()).unwrap();
    assert_eq!(config.labware.mount, Mount::Right);
    assert_eq!(config.labware.plate_slot, 3);
    assert_eq!(config.labware.tip_rack_slot, 7);
    assert_eq!(config.protocol.replicates, 3);
    assert_eq!(config.samples.len(), 2);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_wrong_type_is_rejected() {
    let file = write_config(
        r#"
[protocol]
sample_count = "two"
"#,
    );
    let err = RunnerConfig::load_from(file.path()).unwrap_err();
    assert!(err.to_string().contains("sample_count"));
}

#[test]
#[serial]
fn test_non_monotonic_delay_tiers_rejected() {
    let file = write_config(
        r#"
[calibration.delay_tiers]
low_max_ul = 600.0
high_max_ul = 100.0
"#,
    );
    let config = RunnerConfig::load_from(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("delay tiers"));
}

#[test]
#[serial]
fn test_non_positive_mm_per_ml_rejected() {
    let file = write_config(
        r#"
[calibration.liquid_level]
mm_per_ml = -1.8
"#,
    );
    let config = RunnerConfig::load_from(file.path()).unwrap();
    assert!(config.validate().is_err());
}
