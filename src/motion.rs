//! Motion/kinematics provider abstraction

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;
use crate::{
    pose::{Joints, Pose},
    CellError, Result,
};

/// Target of a joint-space move
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionTarget {
    Pose(Pose),
    Joints(Joints),
}

/// Trait for the external motion planner / robot driver
///
/// Moves are fire-and-continue: they return once the command is accepted,
/// and callers poll [`MotionProvider::is_busy`] until the arm settles.
#[async_trait]
pub trait MotionProvider: Send + Sync {
    /// Joint-interpolated move
    async fn move_joint(&self, target: MotionTarget) -> anyhow::Result<()>;

    /// Straight-line Cartesian move
    async fn move_linear(&self, pose: &Pose) -> anyhow::Result<()>;

    /// Linear speed for subsequent moves, mm/s
    async fn set_speed(&self, mm_per_sec: f64) -> anyhow::Result<()>;

    async fn is_busy(&self) -> anyhow::Result<bool>;

    async fn solve_forward_kinematics(&self, joints: &Joints) -> anyhow::Result<Pose>;

    async fn solve_inverse_kinematics(&self, pose: &Pose) -> anyhow::Result<Joints>;
}

/// Poll the provider until it reports idle, bounded by `limit`
pub async fn wait_until_idle(
    motion: &dyn MotionProvider,
    poll_interval: Duration,
    limit: Duration,
) -> Result<()> {
    let started = Instant::now();
    match timeout(limit, poll_until_idle(motion, poll_interval)).await {
        Ok(result) => {
            debug!("Motion settled after {:?}", started.elapsed());
            result
        }
        Err(_) => Err(CellError::MotionTimeout(limit)),
    }
}

async fn poll_until_idle(motion: &dyn MotionProvider, poll_interval: Duration) -> Result<()> {
    loop {
        if !motion.is_busy().await.map_err(CellError::motion)? {
            return Ok(());
        }
        if poll_interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingMotion;

    #[tokio::test]
    async fn test_wait_returns_once_idle() {
        let motion = RecordingMotion::new();
        motion.busy_for(3);
        wait_until_idle(&motion, Duration::ZERO, Duration::from_secs(1)).await.unwrap();
        assert_eq!(motion.busy_polls(), 4);
    }

    #[tokio::test]
    async fn test_wait_times_out_when_never_idle() {
        let motion = RecordingMotion::new();
        motion.busy_for(u32::MAX);
        let err = wait_until_idle(&motion, Duration::from_millis(1), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, CellError::MotionTimeout(_)));
    }
}
