//! Transfer cell - wires the components together and runs whole transfers
//!
//! Provides a simple interface for embedding tray handling in an operator
//! application, regardless of which robot driver or I/O link backs it.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use crate::{
    config::CellConfig,
    geometry::{SiteId, SlotIndex, SlotPositionCalculator, TesterId, TrayType},
    gripper::{GripperController, GripperSensorState},
    io::DigitalIoTransport,
    motion::MotionProvider,
    search::{SearchOutcome, TraySearchEngine},
    sequencer::PickPlaceSequencer,
    status::StatusSink,
    CellError, Result,
};

/// Test result deciding which tray an unloaded module goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestVerdict {
    Pass,
    Fail,
}

impl TestVerdict {
    pub fn tray(&self) -> TrayType {
        match self {
            TestVerdict::Pass => TrayType::Pass,
            TestVerdict::Fail => TrayType::Fail,
        }
    }
}

impl std::str::FromStr for TestVerdict {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" => Ok(TestVerdict::Pass),
            "fail" => Ok(TestVerdict::Fail),
            other => Err(CellError::Config(format!("unknown verdict '{}'", other))),
        }
    }
}

/// Result of moving a module from the input tray into a tester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    Loaded { from: SlotIndex },
    InputEmpty,
}

/// Result of moving a module from a tester into a result tray
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnloadOutcome {
    Unloaded { to: TrayType, slot: SlotIndex },
    /// The fixture grip failed; nothing was placed
    NotPicked(GripperSensorState),
}

/// Tray handling cell built from configuration and injected collaborators
pub struct TransferCell {
    sequencer: PickPlaceSequencer,
    status: Arc<dyn StatusSink>,
}

impl TransferCell {
    pub fn new(
        config: &CellConfig,
        motion: Arc<dyn MotionProvider>,
        io: Arc<dyn DigitalIoTransport>,
        status: Arc<dyn StatusSink>,
    ) -> Result<Self> {
        info!("Initializing transfer cell");
        config.validate()?;

        let calculator = SlotPositionCalculator::new(config.calibration.clone())?;
        let gripper = GripperController::new(io, config.gripper());
        let sequencer = PickPlaceSequencer::new(
            motion,
            gripper,
            calculator,
            config.motion(),
            Arc::clone(&status),
        );

        info!("Transfer cell ready");
        Ok(Self { sequencer, status })
    }

    pub fn sequencer(&mut self) -> &mut PickPlaceSequencer {
        &mut self.sequencer
    }

    pub fn calculator(&self) -> &SlotPositionCalculator {
        self.sequencer.calculator()
    }

    pub async fn home(&mut self) -> Result<()> {
        self.sequencer.home().await
    }

    pub async fn find_and_pick(&mut self, tray: TrayType) -> Result<SearchOutcome> {
        let outcome = TraySearchEngine::new(&mut self.sequencer).find_and_pick(tray).await?;
        if outcome == SearchOutcome::Empty {
            self.status.report(&format!("{} tray is empty", tray));
        }
        Ok(outcome)
    }

    /// Take the next module from the input tray and put it into a tester site
    pub async fn load_tester(&mut self, tester: TesterId, site: SiteId) -> Result<LoadOutcome> {
        info!("Loading tester {} site {}", tester, site);
        match self.find_and_pick(TrayType::Input).await? {
            SearchOutcome::Found(slot) => {
                self.sequencer.place_tester(tester, site).await?;
                Ok(LoadOutcome::Loaded { from: slot })
            }
            SearchOutcome::Empty => Ok(LoadOutcome::InputEmpty),
        }
    }

    /// Take the module out of a tester site and sort it by verdict
    pub async fn unload_tester(
        &mut self,
        tester: TesterId,
        site: SiteId,
        verdict: TestVerdict,
        slot: SlotIndex,
    ) -> Result<UnloadOutcome> {
        info!("Unloading tester {} site {} ({:?})", tester, site, verdict);
        let state = self.sequencer.pick_tester(tester, site).await?;
        if !state.module_held() {
            warn!("Tester {} site {} not unloaded: {}", tester, site, state.describe());
            return Ok(UnloadOutcome::NotPicked(state));
        }

        let tray = verdict.tray();
        self.sequencer.place(tray, slot).await?;
        Ok(UnloadOutcome::Unloaded { to: tray, slot })
    }
}
