//! Test doubles for the I/O transport and the motion provider

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use crate::{
    io::DigitalIoTransport,
    motion::{MotionProvider, MotionTarget},
    pose::{Joints, Pose},
};

#[derive(Default)]
struct InputScript {
    queued: VecDeque<String>,
    steady: String,
    reads: u32,
}

/// I/O transport answering inputs from per-channel scripts
#[derive(Default)]
pub struct ScriptedIo {
    inputs: Mutex<HashMap<u8, InputScript>>,
    writes: Mutex<Vec<u16>>,
    fail_writes: AtomicBool,
}

impl ScriptedIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value returned once the queued responses are used up
    pub fn set_input(&self, channel: u8, value: &str) {
        self.inputs.lock().unwrap().entry(channel).or_default().steady = value.to_string();
    }

    /// One-shot response served before the steady value
    pub fn push_input(&self, channel: u8, value: &str) {
        self.inputs
            .lock()
            .unwrap()
            .entry(channel)
            .or_default()
            .queued
            .push_back(value.to_string());
    }

    pub fn reads(&self, channel: u8) -> u32 {
        self.inputs.lock().unwrap().get(&channel).map(|s| s.reads).unwrap_or(0)
    }

    pub fn writes(&self) -> Vec<u16> {
        self.writes.lock().unwrap().clone()
    }

    pub fn last_write(&self) -> Option<u16> {
        self.writes.lock().unwrap().last().copied()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl DigitalIoTransport for ScriptedIo {
    async fn write_output_register(&self, value: u16) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            anyhow::bail!("controller rejected output write");
        }
        self.writes.lock().unwrap().push(value);
        Ok(())
    }

    async fn read_input(&self, channel: u8) -> anyhow::Result<String> {
        let mut inputs = self.inputs.lock().unwrap();
        let script = inputs.entry(channel).or_default();
        script.reads += 1;
        Ok(script.queued.pop_front().unwrap_or_else(|| script.steady.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MotionCommand {
    Joint(MotionTarget),
    Linear(Pose),
    Speed(f64),
}

/// Motion provider that records every command
#[derive(Default)]
pub struct RecordingMotion {
    commands: Mutex<Vec<MotionCommand>>,
    busy_remaining: AtomicU32,
    busy_polls: AtomicU32,
    fail_linear_at: Mutex<Option<usize>>,
    unreachable: AtomicBool,
}

impl RecordingMotion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report busy for the next `polls` calls to `is_busy`
    pub fn busy_for(&self, polls: u32) {
        self.busy_remaining.store(polls, Ordering::Relaxed);
    }

    pub fn busy_polls(&self) -> u32 {
        self.busy_polls.load(Ordering::Relaxed)
    }

    /// Fail the n-th linear move (0-based)
    pub fn fail_linear_at(&self, index: usize) {
        *self.fail_linear_at.lock().unwrap() = Some(index);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Relaxed);
    }

    pub fn commands(&self) -> Vec<MotionCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn joint_moves(&self) -> usize {
        self.commands()
            .iter()
            .filter(|c| matches!(c, MotionCommand::Joint(_)))
            .count()
    }

    fn linear_moves(&self) -> usize {
        self.commands()
            .iter()
            .filter(|c| matches!(c, MotionCommand::Linear(_)))
            .count()
    }
}

#[async_trait]
impl MotionProvider for RecordingMotion {
    async fn move_joint(&self, target: MotionTarget) -> anyhow::Result<()> {
        self.commands.lock().unwrap().push(MotionCommand::Joint(target));
        Ok(())
    }

    async fn move_linear(&self, pose: &Pose) -> anyhow::Result<()> {
        if *self.fail_linear_at.lock().unwrap() == Some(self.linear_moves()) {
            anyhow::bail!("target out of reach");
        }
        self.commands.lock().unwrap().push(MotionCommand::Linear(*pose));
        Ok(())
    }

    async fn set_speed(&self, mm_per_sec: f64) -> anyhow::Result<()> {
        self.commands.lock().unwrap().push(MotionCommand::Speed(mm_per_sec));
        Ok(())
    }

    async fn is_busy(&self) -> anyhow::Result<bool> {
        self.busy_polls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.busy_remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.busy_remaining.store(remaining - 1, Ordering::Relaxed);
            return Ok(true);
        }
        Ok(false)
    }

    async fn solve_forward_kinematics(&self, joints: &Joints) -> anyhow::Result<Pose> {
        Ok(Pose::from(*joints))
    }

    async fn solve_inverse_kinematics(&self, pose: &Pose) -> anyhow::Result<Joints> {
        if self.unreachable.load(Ordering::Relaxed) {
            anyhow::bail!("no kinematic solution for {}", pose);
        }
        Ok(pose.to_array())
    }
}
