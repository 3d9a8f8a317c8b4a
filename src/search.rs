//! Linear tray scan for the next module

use serde::{Deserialize, Serialize};
use tracing::info;
use crate::{
    geometry::{SlotIndex, TrayType},
    sequencer::PickPlaceSequencer,
    Result,
};

/// Result of scanning a tray
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    /// A module was picked from this slot and is now held
    Found(SlotIndex),
    /// Every slot was tried without a successful grip
    Empty,
}

impl SearchOutcome {
    pub fn slot(&self) -> Option<SlotIndex> {
        match self {
            SearchOutcome::Found(slot) => Some(*slot),
            SearchOutcome::Empty => None,
        }
    }
}

/// Scans tray slots in index order until a pick succeeds
pub struct TraySearchEngine<'a> {
    sequencer: &'a mut PickPlaceSequencer,
}

impl<'a> TraySearchEngine<'a> {
    pub fn new(sequencer: &'a mut PickPlaceSequencer) -> Self {
        Self { sequencer }
    }

    /// Pick the first module found, scanning from slot 1.
    ///
    /// Makes at most one pick attempt per slot. Errors abort the scan.
    pub async fn find_and_pick(&mut self, tray: TrayType) -> Result<SearchOutcome> {
        for slot in SlotIndex::all() {
            let state = self.sequencer.pick(tray, slot).await?;
            if state.module_held() {
                info!("Found module in {} tray slot {}", tray, slot);
                return Ok(SearchOutcome::Found(slot));
            }
        }

        info!("{} tray is empty", tray);
        Ok(SearchOutcome::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CalibrationConfig, GripperConfig, MotionConfig};
    use crate::geometry::SlotPositionCalculator;
    use crate::gripper::GripperController;
    use crate::status::NoOpStatus;
    use crate::testing::{RecordingMotion, ScriptedIo};
    use crate::CellError;
    use std::sync::Arc;

    fn sequencer(io: &Arc<ScriptedIo>, motion: &Arc<RecordingMotion>) -> PickPlaceSequencer {
        PickPlaceSequencer::new(
            motion.clone(),
            GripperController::new(io.clone(), GripperConfig::immediate()),
            SlotPositionCalculator::new(CalibrationConfig::default()).unwrap(),
            MotionConfig::immediate(),
            Arc::new(NoOpStatus),
        )
    }

    #[tokio::test]
    async fn test_finds_first_occupied_slot() {
        let io = Arc::new(ScriptedIo::new());
        io.set_input(12, "0");
        io.set_input(13, "0");
        // Slots 1..=16 close empty on both attempts
        for _ in 0..32 {
            io.push_input(12, "1");
        }
        let motion = Arc::new(RecordingMotion::new());
        let mut sequencer = sequencer(&io, &motion);

        let outcome = TraySearchEngine::new(&mut sequencer)
            .find_and_pick(TrayType::Input)
            .await
            .unwrap();
        assert_eq!(outcome, SearchOutcome::Found(SlotIndex::try_from(17).unwrap()));
        assert_eq!(motion.joint_moves(), 17);
    }

    #[tokio::test]
    async fn test_exhausted_tray_is_empty_after_fifty_attempts() {
        let io = Arc::new(ScriptedIo::new());
        io.set_input(12, "1");
        io.set_input(13, "0");
        let motion = Arc::new(RecordingMotion::new());
        let mut sequencer = sequencer(&io, &motion);

        let outcome = TraySearchEngine::new(&mut sequencer)
            .find_and_pick(TrayType::Pass)
            .await
            .unwrap();
        assert_eq!(outcome, SearchOutcome::Empty);
        assert_eq!(outcome.slot(), None);
        assert_eq!(motion.joint_moves(), 50);
        assert_eq!(io.reads(12), 100);
    }

    #[tokio::test]
    async fn test_mechanism_fault_does_not_stop_scan() {
        let io = Arc::new(ScriptedIo::new());
        io.set_input(12, "0");
        io.set_input(13, "0");
        io.push_input(13, "1");
        let motion = Arc::new(RecordingMotion::new());
        let mut sequencer = sequencer(&io, &motion);

        let outcome = TraySearchEngine::new(&mut sequencer)
            .find_and_pick(TrayType::Fail)
            .await
            .unwrap();
        assert_eq!(outcome.slot().map(|s| s.get()), Some(2));
    }

    #[tokio::test]
    async fn test_sensor_failure_aborts_scan() {
        let io = Arc::new(ScriptedIo::new());
        io.set_input(12, "");
        let motion = Arc::new(RecordingMotion::new());
        let mut sequencer = sequencer(&io, &motion);

        let err = TraySearchEngine::new(&mut sequencer)
            .find_and_pick(TrayType::Input)
            .await
            .unwrap_err();
        assert!(matches!(err, CellError::SensorReadFailure { channel: 12, .. }));
        assert_eq!(motion.joint_moves(), 1);
    }
}
