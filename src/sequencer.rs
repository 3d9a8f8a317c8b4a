//! Pick and place cycles
//!
//! Every cycle has the same shape: joint move to the approach pose, linear
//! move down to hover, slow linear plunge, actuate, slow retreat to hover,
//! then fast linear move back up to the approach pose.

use std::sync::Arc;
use tracing::{debug, info, warn};
use crate::{
    config::MotionConfig,
    geometry::{SiteId, SlotIndex, SlotPoses, SlotPositionCalculator, TesterId, TrayType},
    gripper::{GripperController, GripperSensorState},
    motion::{wait_until_idle, MotionProvider, MotionTarget},
    pose::{Joints, Pose},
    status::StatusSink,
    CellError, Result,
};

/// Linear speed for the plunge and the retreat from it, mm/s
pub const PLUNGE_SPEED_MM_S: f64 = 30.0;
/// Linear speed for transit moves, mm/s
pub const TRANSIT_SPEED_MM_S: f64 = 10_000.0;

/// Runs single pick/place cycles against one robot
pub struct PickPlaceSequencer {
    motion: Arc<dyn MotionProvider>,
    gripper: GripperController,
    calculator: SlotPositionCalculator,
    config: MotionConfig,
    status: Arc<dyn StatusSink>,
}

impl PickPlaceSequencer {
    pub fn new(
        motion: Arc<dyn MotionProvider>,
        gripper: GripperController,
        calculator: SlotPositionCalculator,
        config: MotionConfig,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            motion,
            gripper,
            calculator,
            config,
            status,
        }
    }

    pub fn calculator(&self) -> &SlotPositionCalculator {
        &self.calculator
    }

    pub fn gripper(&self) -> &GripperController {
        &self.gripper
    }

    /// Try to pick a module from a tray slot.
    ///
    /// The returned state tells "slot empty" (`ClosedDetected`) apart from
    /// a mechanism fault (`OpenDetected`); only `Indeterminate` means a
    /// module is now held.
    pub async fn pick(&mut self, tray: TrayType, slot: SlotIndex) -> Result<GripperSensorState> {
        info!("Picking from {} tray slot {}", tray, slot);
        let poses = self.calculator.slot_poses(tray, slot);
        let state = self.pick_at(&poses).await?;

        if state.module_held() {
            self.status.report(&format!("Picked module from {} tray slot {}", tray, slot));
        } else {
            self.status.report(&format!("No module at {} tray slot {}: {}", tray, slot, state.describe()));
        }
        Ok(state)
    }

    /// Put the held module into a tray slot. Not verified.
    pub async fn place(&mut self, tray: TrayType, slot: SlotIndex) -> Result<()> {
        info!("Placing into {} tray slot {}", tray, slot);
        let poses = self.calculator.slot_poses(tray, slot);
        self.place_at(&poses).await?;
        self.status.report(&format!("Placed module into {} tray slot {}", tray, slot));
        Ok(())
    }

    pub async fn pick_tester(&mut self, tester: TesterId, site: SiteId) -> Result<GripperSensorState> {
        info!("Picking from tester {} site {}", tester, site);
        let poses = self.calculator.tester_poses(tester, site);
        let state = self.pick_at(&poses).await?;

        if state.module_held() {
            self.status.report(&format!("Picked module from tester {} site {}", tester, site));
        } else {
            self.status.report(&format!(
                "No module at tester {} site {}: {}",
                tester,
                site,
                state.describe()
            ));
        }
        Ok(state)
    }

    pub async fn place_tester(&mut self, tester: TesterId, site: SiteId) -> Result<()> {
        info!("Placing into tester {} site {}", tester, site);
        let poses = self.calculator.tester_poses(tester, site);
        self.place_at(&poses).await?;
        self.status.report(&format!("Placed module into tester {} site {}", tester, site));
        Ok(())
    }

    /// Joint move to the configured home position
    pub async fn home(&mut self) -> Result<()> {
        let joints = self.config.home_joints();
        info!("Moving to home joints {:?}", joints);
        self.set_speed(TRANSIT_SPEED_MM_S).await?;
        self.move_joint(MotionTarget::Joints(joints)).await?;
        self.status.report("Robot at home position");
        Ok(())
    }

    /// TCP pose for a joint vector, from the provider's kinematics
    pub async fn pose_for_joints(&self, joints: &Joints) -> Result<Pose> {
        self.motion
            .solve_forward_kinematics(joints)
            .await
            .map_err(CellError::motion)
    }

    async fn pick_at(&mut self, poses: &SlotPoses) -> Result<GripperSensorState> {
        self.gripper.open().await?;
        self.descend(poses).await?;
        let state = self.gripper.close(true).await?;
        self.retreat(poses).await?;
        Ok(state)
    }

    async fn place_at(&mut self, poses: &SlotPoses) -> Result<()> {
        self.descend(poses).await?;
        self.gripper.open().await?;
        self.retreat(poses).await
    }

    /// Approach, hover, then slow plunge
    async fn descend(&mut self, poses: &SlotPoses) -> Result<()> {
        if self.config.check_reachability() {
            self.check_reachable(poses).await?;
        }
        debug!("Descending to {}", poses.plunge);
        self.move_joint(MotionTarget::Pose(poses.approach)).await?;
        self.move_linear(&poses.hover).await?;
        self.set_speed(PLUNGE_SPEED_MM_S).await?;
        self.move_linear(&poses.plunge).await
    }

    /// Slow retreat to hover, then fast back to approach
    async fn retreat(&mut self, poses: &SlotPoses) -> Result<()> {
        self.move_linear(&poses.hover).await?;
        self.set_speed(TRANSIT_SPEED_MM_S).await?;
        self.move_linear(&poses.approach).await
    }

    async fn check_reachable(&self, poses: &SlotPoses) -> Result<()> {
        for pose in poses.iter() {
            if let Err(e) = self.motion.solve_inverse_kinematics(pose).await {
                warn!("Pose {} is unreachable: {}", pose, e);
                return Err(CellError::MotionFault(format!("unreachable pose {}: {:#}", pose, e)));
            }
        }
        Ok(())
    }

    async fn move_joint(&self, target: MotionTarget) -> Result<()> {
        self.motion.move_joint(target).await.map_err(CellError::motion)?;
        self.settle().await
    }

    async fn move_linear(&self, pose: &Pose) -> Result<()> {
        self.motion.move_linear(pose).await.map_err(CellError::motion)?;
        self.settle().await
    }

    async fn set_speed(&self, mm_per_sec: f64) -> Result<()> {
        self.motion.set_speed(mm_per_sec).await.map_err(CellError::motion)
    }

    async fn settle(&self) -> Result<()> {
        wait_until_idle(
            self.motion.as_ref(),
            self.config.poll_interval(),
            self.config.settle_timeout(),
        )
        .await
    }
}
