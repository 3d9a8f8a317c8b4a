//! In-memory robot cell for dry runs
//!
//! One world state backs both the motion provider and the I/O transport:
//! the TCP follows every commanded move, and switching the hold output on
//! while the TCP sits on a resting module grips it. Sensors are derived
//! from that state the way the real proximity switches would read.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use crate::{
    config::GripperConfig,
    io::DigitalIoTransport,
    motion::{MotionProvider, MotionTarget},
    pose::{Joints, Pose},
};

/// How close the TCP must be to a module to grip it, mm
pub const GRIP_TOLERANCE_MM: f64 = 1.0;
/// Horizontal reach used by the simulated inverse kinematics, mm
pub const DEFAULT_REACH_MM: f64 = 1000.0;

#[derive(Debug, Clone)]
struct World {
    tcp: Pose,
    speed: f64,
    busy_polls: u32,
    outputs: u16,
    modules: Vec<Pose>,
    held: bool,
    moves: u32,
}

/// Simulated robot, gripper and trays
#[derive(Clone)]
pub struct SimulatedCell {
    world: Arc<Mutex<World>>,
    gripper: GripperConfig,
    reach_mm: f64,
    /// `is_busy` polls reported after each move
    settle_polls: u32,
}

impl SimulatedCell {
    pub fn new(gripper: GripperConfig) -> Self {
        Self {
            world: Arc::new(Mutex::new(World {
                tcp: Pose::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0),
                speed: 0.0,
                busy_polls: 0,
                outputs: 0,
                modules: Vec::new(),
                held: false,
                moves: 0,
            })),
            gripper,
            reach_mm: DEFAULT_REACH_MM,
            settle_polls: 1,
        }
    }

    pub fn with_reach(mut self, reach_mm: f64) -> Self {
        self.reach_mm = reach_mm;
        self
    }

    /// Leave a module resting at a plunge pose
    pub async fn add_module(&self, at: Pose) {
        self.world.lock().await.modules.push(at);
    }

    pub async fn modules(&self) -> Vec<Pose> {
        self.world.lock().await.modules.clone()
    }

    pub async fn has_module_at(&self, at: &Pose) -> bool {
        self.world
            .lock()
            .await
            .modules
            .iter()
            .any(|m| m.distance_to(at) <= GRIP_TOLERANCE_MM)
    }

    pub async fn holding(&self) -> bool {
        self.world.lock().await.held
    }

    pub async fn tcp(&self) -> Pose {
        self.world.lock().await.tcp
    }

    pub async fn speed(&self) -> f64 {
        self.world.lock().await.speed
    }

    pub async fn move_count(&self) -> u32 {
        self.world.lock().await.moves
    }

    async fn move_to(&self, pose: Pose) {
        let mut world = self.world.lock().await;
        world.tcp = pose;
        world.busy_polls = self.settle_polls;
        world.moves += 1;
    }

    fn forward(joints: &Joints) -> Pose {
        Pose::from(*joints)
    }
}

fn bit(value: u16, bit: u8) -> bool {
    bit < 16 && value & (1 << bit) != 0
}

#[async_trait]
impl MotionProvider for SimulatedCell {
    async fn move_joint(&self, target: MotionTarget) -> anyhow::Result<()> {
        let pose = match target {
            MotionTarget::Pose(pose) => pose,
            MotionTarget::Joints(joints) => Self::forward(&joints),
        };
        self.move_to(pose).await;
        Ok(())
    }

    async fn move_linear(&self, pose: &Pose) -> anyhow::Result<()> {
        self.move_to(*pose).await;
        Ok(())
    }

    async fn set_speed(&self, mm_per_sec: f64) -> anyhow::Result<()> {
        if mm_per_sec <= 0.0 {
            anyhow::bail!("speed must be positive, got {}", mm_per_sec);
        }
        self.world.lock().await.speed = mm_per_sec;
        Ok(())
    }

    async fn is_busy(&self) -> anyhow::Result<bool> {
        let mut world = self.world.lock().await;
        if world.busy_polls > 0 {
            world.busy_polls -= 1;
            return Ok(true);
        }
        Ok(false)
    }

    async fn solve_forward_kinematics(&self, joints: &Joints) -> anyhow::Result<Pose> {
        Ok(Self::forward(joints))
    }

    async fn solve_inverse_kinematics(&self, pose: &Pose) -> anyhow::Result<Joints> {
        let radius = (pose.x * pose.x + pose.y * pose.y).sqrt();
        if radius > self.reach_mm {
            anyhow::bail!("pose {} is {:.1} mm out, beyond reach {:.1} mm", pose, radius, self.reach_mm);
        }
        Ok(pose.to_array())
    }
}

#[async_trait]
impl DigitalIoTransport for SimulatedCell {
    async fn write_output_register(&self, value: u16) -> anyhow::Result<()> {
        let mut world = self.world.lock().await;
        let hold = self.gripper.hold_output();
        let release = self.gripper.release_output();

        let hold_rising = !bit(world.outputs, hold) && bit(value, hold);
        let release_rising = !bit(world.outputs, release) && bit(value, release);
        world.outputs = value;

        if hold_rising && !world.held {
            let tcp = world.tcp;
            if let Some(index) = world
                .modules
                .iter()
                .position(|m| m.distance_to(&tcp) <= GRIP_TOLERANCE_MM)
            {
                world.modules.remove(index);
                world.held = true;
                debug!("Simulated gripper picked module at {}", tcp);
            }
        }
        if release_rising && world.held {
            let tcp = world.tcp;
            world.modules.push(tcp);
            world.held = false;
            debug!("Simulated gripper released module at {}", tcp);
        }
        Ok(())
    }

    async fn read_input(&self, channel: u8) -> anyhow::Result<String> {
        let world = self.world.lock().await;
        let hold_on = bit(world.outputs, self.gripper.hold_output());

        let level = if channel == self.gripper.closed_sensor_input() {
            hold_on && !world.held
        } else if channel == self.gripper.open_sensor_input() {
            !hold_on
        } else {
            false
        };
        Ok(if level { "1" } else { "0" }.to_string())
    }
}
