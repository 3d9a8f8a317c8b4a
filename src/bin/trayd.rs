//! trayd - dry-run driver for the tray cell
//!
//! Runs pick/place cycles, tray scans and tester transfers against the
//! simulated cell. The outcome is the only thing written to stdout, as one
//! JSON document; logs and status events go to stderr.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, Level};
use trayd::{
    CellConfig, ConsoleStatus, GripperConfig, Joints, LogStatus, MotionConfig, SimulatedCell, SiteId,
    SlotIndex, StatusSink, TestVerdict, TesterId, TransferCell, TrayType,
};

#[derive(Parser)]
#[command(name = "trayd")]
#[command(about = "Tray/tester pick-and-place sequencer (simulated cell)")]
#[command(version)]
struct Args {
    /// Path to the cell configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Module resting in a tray slot before the run, e.g. `input:17`
    #[arg(long = "occupied", global = true)]
    occupied: Vec<SlotRef>,

    /// Module resting in a tester site before the run, e.g. `2:3`
    #[arg(long = "fixture", global = true)]
    fixtures: Vec<SiteRef>,

    /// Skip valve and sensor settle delays
    #[arg(long, global = true)]
    fast: bool,

    /// Print status events as JSON lines instead of log lines
    #[arg(long, global = true)]
    json_status: bool,

    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print approach/hover/plunge poses for every slot of a tray
    Positions { tray: TrayType },
    /// Print approach/hover/plunge poses for every site of a tester
    Sites { tester: TesterId },
    /// Pick from one tray slot
    Pick { tray: TrayType, slot: SlotIndex },
    /// Place into one tray slot
    Place { tray: TrayType, slot: SlotIndex },
    /// Scan a tray from slot 1 and pick the first module found
    Find { tray: TrayType },
    /// Pick from a tester site
    PickTester { tester: TesterId, site: SiteId },
    /// Place into a tester site
    PlaceTester { tester: TesterId, site: SiteId },
    /// Move the next input module into a tester site
    LoadTester { tester: TesterId, site: SiteId },
    /// Move a tested module into the pass or fail tray
    UnloadTester {
        tester: TesterId,
        site: SiteId,
        verdict: TestVerdict,
        slot: SlotIndex,
    },
    /// Joint move to the configured home position
    Home,
    /// Report the TCP pose for six joint values
    Fk {
        #[arg(num_args = 6, allow_negative_numbers = true)]
        joints: Vec<f64>,
    },
}

/// `<tray>:<slot>`
#[derive(Debug, Clone)]
struct SlotRef {
    tray: TrayType,
    slot: SlotIndex,
}

impl FromStr for SlotRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (tray, slot) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("expected <tray>:<slot>, got '{}'", s))?;
        Ok(Self {
            tray: tray.parse()?,
            slot: slot.parse()?,
        })
    }
}

/// `<tester>:<site>`
#[derive(Debug, Clone)]
struct SiteRef {
    tester: TesterId,
    site: SiteId,
}

impl FromStr for SiteRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (tester, site) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("expected <tester>:<site>, got '{}'", s))?;
        Ok(Self {
            tester: tester.parse()?,
            site: site.parse()?,
        })
    }
}

impl Args {
    fn get_config_path(&self) -> Option<String> {
        self.config
            .clone()
            .or_else(|| std::env::var("TRAYD_CONFIG").ok())
    }

    fn load_config(&self) -> Result<CellConfig> {
        let mut config = match self.get_config_path() {
            Some(path) => {
                info!("Using config: {}", path);
                CellConfig::load_from_path(&path).context("Failed to load configuration")?
            }
            None if std::path::Path::new(trayd::config::DEFAULT_CONFIG_PATH).exists() => {
                info!("Using config: {}", trayd::config::DEFAULT_CONFIG_PATH);
                CellConfig::load_from_path(trayd::config::DEFAULT_CONFIG_PATH)
                    .context("Failed to load configuration")?
            }
            None => {
                info!("No config file found, using built-in calibration");
                CellConfig::default()
            }
        };

        if self.fast {
            let gripper = config.gripper();
            config.gripper = Some(GripperConfig {
                settle_ms: Some(0),
                led_settle_ms: Some(0),
                sensor_retry_ms: Some(0),
                ..gripper
            });
            let motion = config.motion();
            config.motion = Some(MotionConfig {
                poll_interval_ms: Some(0),
                ..motion
            });
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    info!("Tray cell sequencer (simulated)");
    info!("{}", "=".repeat(50));

    let config = args.load_config()?;
    let status: Arc<dyn StatusSink> = if args.json_status {
        Arc::new(ConsoleStatus::new())
    } else {
        Arc::new(LogStatus)
    };

    let sim = Arc::new(SimulatedCell::new(config.gripper()));
    let mut cell = TransferCell::new(&config, sim.clone(), sim.clone(), status)
        .context("Failed to create transfer cell")?;

    for entry in &args.occupied {
        sim.add_module(cell.calculator().position(entry.tray, entry.slot)).await;
    }
    for entry in &args.fixtures {
        sim.add_module(cell.calculator().tester_position(entry.tester, entry.site)).await;
    }

    match run(&mut cell, &args.command).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            info!("Done after {} simulated moves", sim.move_count().await);
            Ok(())
        }
        Err(e) => {
            error!("Cycle failed: {:#}", e);
            error!("Gripper left as-is for inspection");
            Err(e)
        }
    }
}

async fn run(cell: &mut TransferCell, command: &Commands) -> Result<serde_json::Value> {
    let output = match command {
        Commands::Positions { tray } => {
            let rows: Vec<_> = SlotIndex::all()
                .map(|slot| {
                    let poses = cell.calculator().slot_poses(*tray, slot);
                    serde_json::json!({
                        "slot": slot,
                        "approach": poses.approach.rounded(3),
                        "hover": poses.hover.rounded(3),
                        "plunge": poses.plunge.rounded(3),
                    })
                })
                .collect();
            serde_json::json!({ "tray": tray, "slots": rows })
        }
        Commands::Sites { tester } => {
            let mut rows = Vec::new();
            for id in 1..=trayd::geometry::SITES_PER_TESTER {
                let site = SiteId::new(id)?;
                let poses = cell.calculator().tester_poses(*tester, site);
                rows.push(serde_json::json!({
                    "site": site,
                    "approach": poses.approach.rounded(3),
                    "hover": poses.hover.rounded(3),
                    "plunge": poses.plunge.rounded(3),
                }));
            }
            serde_json::json!({ "tester": tester, "sites": rows })
        }
        Commands::Pick { tray, slot } => {
            let state = cell.sequencer().pick(*tray, *slot).await?;
            serde_json::json!({ "found": state.module_held(), "sensor_state": state })
        }
        Commands::Place { tray, slot } => {
            cell.sequencer().place(*tray, *slot).await?;
            serde_json::json!({ "placed": true })
        }
        Commands::Find { tray } => serde_json::to_value(cell.find_and_pick(*tray).await?)?,
        Commands::PickTester { tester, site } => {
            let state = cell.sequencer().pick_tester(*tester, *site).await?;
            serde_json::json!({ "found": state.module_held(), "sensor_state": state })
        }
        Commands::PlaceTester { tester, site } => {
            cell.sequencer().place_tester(*tester, *site).await?;
            serde_json::json!({ "placed": true })
        }
        Commands::LoadTester { tester, site } => {
            serde_json::to_value(cell.load_tester(*tester, *site).await?)?
        }
        Commands::UnloadTester { tester, site, verdict, slot } => {
            serde_json::to_value(cell.unload_tester(*tester, *site, *verdict, *slot).await?)?
        }
        Commands::Home => {
            cell.home().await?;
            serde_json::json!({ "homed": true })
        }
        Commands::Fk { joints } => {
            let joints: Joints = joints
                .as_slice()
                .try_into()
                .map_err(|_| anyhow!("expected 6 joint values, got {}", joints.len()))?;
            let pose = cell.sequencer().pose_for_joints(&joints).await?;
            serde_json::json!({ "joints": joints, "pose": pose.rounded(3) })
        }
    };
    Ok(output)
}
