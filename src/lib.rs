//! trayd - Tray/tester pick-and-place sequencing for a gripper-equipped arm
//!
//! This library decides *where* the arm goes and *whether* a grip worked.
//! Motion planning, the digital I/O link and the operator UI are external
//! collaborators injected through traits, so the same sequencing runs
//! against a real controller or the bundled simulator.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trayd::{CellConfig, LogStatus, SimulatedCell, TransferCell, TrayType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CellConfig::load_from_path("config/default_config.yaml")?;
//!     let sim = Arc::new(SimulatedCell::new(config.gripper()));
//!     let mut cell = TransferCell::new(&config, sim.clone(), sim, Arc::new(LogStatus))?;
//!
//!     let outcome = cell.find_and_pick(TrayType::Input).await?;
//!     println!("Search result: {:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **TransferCell**: wires everything together, runs load/unload transfers
//! - **TraySearchEngine**: scans a tray slot by slot for the next module
//! - **PickPlaceSequencer**: one approach/plunge/actuate/retreat cycle
//! - **GripperController**: valve sequencing, sensor classification, retry
//! - **OutputRegister**: 16-bit shadow of the controller outputs
//! - **SlotPositionCalculator**: slot and tester-site geometry

pub mod cell;
pub mod config;
pub mod error;
pub mod geometry;
pub mod gripper;
pub mod io;
pub mod motion;
pub mod pose;
pub mod search;
pub mod sequencer;
pub mod sim;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

// High-level exports for easy usage
pub use cell::{LoadOutcome, TestVerdict, TransferCell, UnloadOutcome};
pub use config::{CalibrationConfig, CellConfig, GripperConfig, MotionConfig};
pub use error::{CellError, Result};
pub use geometry::{SiteId, SlotIndex, SlotPoses, SlotPositionCalculator, TesterId, TrayType};
pub use pose::{Joints, Pose};
pub use search::{SearchOutcome, TraySearchEngine};
pub use sim::SimulatedCell;
pub use status::{ConsoleStatus, LogStatus, NoOpStatus, StatusSink};

// Core component exports for advanced usage
pub use gripper::{GripPhase, GripperController, GripperSensorState, SensorReading};
pub use io::{DigitalIoTransport, LedColor, OutputRegister};
pub use motion::{MotionProvider, MotionTarget};
pub use sequencer::PickPlaceSequencer;
