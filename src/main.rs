//! CLI Entry Point for proxy_viscometer
//!
//! Provides command-line interface for:
//! - Running the protocol against the simulated robot, pausing for mass readings
//! - Dry-running the schedule and emitting the command log
//! - Printing the effective configuration
//! - Validating labware definitions
//!
//! # Usage
//!
//! Run with console prompts:
//! ```bash
//! proxy_viscometer run --config config/viscometer.toml --report run.json
//! ```
//!
//! Print the planned command sequence:
//! ```bash
//! proxy_viscometer plan --output plan.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proxy_viscometer::config::RunnerConfig;
use proxy_viscometer::hardware::{AutoResumeOperator, ConsoleOperator, Operator, SimulatedRobot};
use proxy_viscometer::labware::{reservoir_definition, LabwareDefinition};
use proxy_viscometer::protocol::ProtocolRunner;
use proxy_viscometer::tracing_setup;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "proxy_viscometer")]
#[command(about = "Proxy viscometer protocol runner for liquid-handling robots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the protocol, pausing for each mass reading
    Run {
        /// Configuration file (defaults to config/viscometer.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Perform delays and plunger moves in real time
        #[arg(long)]
        realtime: bool,

        /// Resume pauses automatically instead of waiting for Enter
        #[arg(long)]
        auto_resume: bool,

        /// Write the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Dry-run the schedule and emit the command log as JSON
    Plan {
        /// Configuration file (defaults to config/viscometer.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the command log here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Configuration file (defaults to config/viscometer.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate and summarise a labware definition
    Labware {
        /// Definition file (defaults to the embedded tube holder)
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            realtime,
            auto_resume,
            report,
        } => run(config, realtime, auto_resume, report).await,
        Commands::Plan { config, output } => plan(config, output).await,
        Commands::Config { config } => {
            print!("{}", load_config(config.as_deref())?.to_toml()?);
            Ok(())
        }
        Commands::Labware { path } => describe_labware(path.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<RunnerConfig> {
    let config = match path {
        Some(path) => RunnerConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RunnerConfig::load()?,
    };
    config.validate()?;
    tracing_setup::init_from_config(&config)?;
    Ok(config)
}

async fn run(
    config: Option<PathBuf>,
    realtime: bool,
    auto_resume: bool,
    report_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config.as_deref())?;

    let operator: Arc<dyn Operator> = if auto_resume {
        Arc::new(AutoResumeOperator::new())
    } else {
        Arc::new(ConsoleOperator::new())
    };
    let robot = SimulatedRobot::with_realtime(operator, realtime);
    let runner = ProtocolRunner::new(Arc::new(robot.clone()), config)?;

    let mut report = runner.run().await?;
    report.commands_issued = Some(robot.command_count().await);

    println!("{}", report.summary());
    if let Some(path) = report_path {
        report
            .write_json(&path)
            .with_context(|| format!("writing report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

async fn plan(config: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(config.as_deref())?;

    let robot = SimulatedRobot::new(Arc::new(AutoResumeOperator::new()));
    let runner = ProtocolRunner::new(Arc::new(robot.clone()), config)?;
    runner.run().await?;

    let json = serde_json::to_string_pretty(&robot.commands().await)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("writing command log to {}", path.display()))?;
            println!(
                "{} commands written to {}",
                robot.command_count().await,
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn describe_labware(path: Option<&Path>) -> Result<()> {
    let definition: LabwareDefinition = reservoir_definition(path)?;
    definition.validate()?;

    let params = &definition.parameters;
    println!("{} ({})", definition.metadata.display_name, params.load_name);
    println!("  namespace:  {}", definition.namespace);
    println!("  version:    {}", definition.version);
    println!("  format:     {}", params.format);
    println!(
        "  footprint:  {:.2} x {:.2} x {:.2} mm",
        definition.dimensions.x_dimension,
        definition.dimensions.y_dimension,
        definition.dimensions.z_dimension
    );
    println!(
        "  wells:      {} in {} columns",
        definition.wells.len(),
        definition.ordering.len()
    );
    if let Some(first) = definition.wells_in_order().next() {
        if let Some(well) = definition.wells.get(first) {
            println!(
                "  well depth: {:.2} mm, {:.0} uL",
                well.depth, well.total_liquid_volume
            );
        }
    }
    Ok(())
}
