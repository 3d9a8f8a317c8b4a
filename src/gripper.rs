//! Pneumatic gripper control
//!
//! Drives the two valve outputs (hold / release), reads the two proximity
//! sensors and decides whether a module ended up between the jaws. The
//! status LED is updated as a side effect of every close.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use crate::{
    config::GripperConfig,
    io::{DigitalIoTransport, LedColor, OutputRegister, LED_BIT_A, LED_BIT_B},
    CellError, Result,
};

/// Physical state of the gripper after a close, derived from both sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GripperSensorState {
    /// Jaws closed all the way: nothing was picked up
    ClosedDetected,
    /// Open sensor still asserted after closing; mechanism fault
    OpenDetected,
    /// Neither sensor asserted: a module is held
    Indeterminate,
}

impl GripperSensorState {
    pub fn module_held(&self) -> bool {
        matches!(self, GripperSensorState::Indeterminate)
    }

    pub fn led(&self) -> LedColor {
        match self {
            GripperSensorState::ClosedDetected => LedColor::Red,
            GripperSensorState::OpenDetected => LedColor::Yellow,
            GripperSensorState::Indeterminate => LedColor::Green,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            GripperSensorState::ClosedDetected => "gripper closed empty",
            GripperSensorState::OpenDetected => "open sensor asserted after close",
            GripperSensorState::Indeterminate => "module held",
        }
    }
}

/// Raw sensor levels after one actuation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorReading {
    pub closed: bool,
    pub open: bool,
}

impl SensorReading {
    pub fn classify(&self) -> GripperSensorState {
        if self.closed {
            GripperSensorState::ClosedDetected
        } else if self.open {
            GripperSensorState::OpenDetected
        } else {
            GripperSensorState::Indeterminate
        }
    }
}

/// Progress of one close request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripPhase {
    FirstAttempt,
    Retrying,
    Failed,
    Succeeded,
}

impl GripPhase {
    /// Next phase after an attempt classified as `state`.
    ///
    /// Only a first attempt that closed empty may retry, so at most two
    /// actuations happen per close.
    pub fn after(self, state: GripperSensorState, allow_retry: bool) -> GripPhase {
        match (self, state) {
            (_, GripperSensorState::Indeterminate) => GripPhase::Succeeded,
            (GripPhase::FirstAttempt, GripperSensorState::ClosedDetected) if allow_retry => {
                GripPhase::Retrying
            }
            _ => GripPhase::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GripPhase::Failed | GripPhase::Succeeded)
    }
}

/// Gripper controller owning the output register
pub struct GripperController {
    transport: Arc<dyn DigitalIoTransport>,
    register: OutputRegister,
    config: GripperConfig,
    last_close_attempts: u32,
}

impl GripperController {
    pub fn new(transport: Arc<dyn DigitalIoTransport>, config: GripperConfig) -> Self {
        Self {
            register: OutputRegister::new(Arc::clone(&transport)),
            transport,
            config,
            last_close_attempts: 0,
        }
    }

    pub fn register(&self) -> &OutputRegister {
        &self.register
    }

    pub fn led(&self) -> LedColor {
        self.register.led()
    }

    /// Number of physical actuations the most recent close needed
    pub fn last_close_attempts(&self) -> u32 {
        self.last_close_attempts
    }

    /// Open the jaws. Not verified: opening always succeeds.
    pub async fn open(&mut self) -> Result<()> {
        debug!("Opening gripper");
        self.register.clear_bit(self.config.hold_output()).await?;
        pause(self.config.settle()).await;
        self.register.clear_bit(self.config.release_output()).await?;
        pause(self.config.settle()).await;
        self.register.set_bit(self.config.release_output()).await?;
        pause(self.config.settle()).await;
        self.set_led(LedColor::None).await
    }

    /// Close the jaws and classify the result.
    ///
    /// A close that ends fully shut is retried once when `allow_retry` is
    /// set. The LED shows the final classification.
    pub async fn close(&mut self, allow_retry: bool) -> Result<GripperSensorState> {
        let mut phase = GripPhase::FirstAttempt;
        let mut attempts = 0;

        let state = loop {
            attempts += 1;
            let state = self.actuate_close().await?.classify();
            phase = phase.after(state, allow_retry);
            if phase.is_terminal() {
                break state;
            }
            warn!("Gripper closed empty on attempt {}, retrying", attempts);
        };
        self.last_close_attempts = attempts;

        self.set_led(state.led()).await?;
        match phase {
            GripPhase::Succeeded => info!("Grip confirmed after {} attempt(s)", attempts),
            _ => warn!("Grip failed after {} attempt(s): {}", attempts, state.describe()),
        }
        Ok(state)
    }

    /// One physical close: release off, hold on, then sample both sensors
    async fn actuate_close(&mut self) -> Result<SensorReading> {
        self.register.clear_bit(self.config.hold_output()).await?;
        pause(self.config.settle()).await;
        self.register.clear_bit(self.config.release_output()).await?;
        pause(self.config.settle()).await;
        self.register.set_bit(self.config.hold_output()).await?;
        pause(self.config.settle()).await;

        let closed = self.read_sensor(self.config.closed_sensor_input()).await?;
        let open = self.read_sensor(self.config.open_sensor_input()).await?;
        debug!("Gripper sensors: closed={} open={}", closed as u8, open as u8);
        Ok(SensorReading { closed, open })
    }

    /// Read one sensor, re-polling while the transport answers with junk
    async fn read_sensor(&self, channel: u8) -> Result<bool> {
        let attempts = self.config.sensor_read_attempts().max(1);
        let mut attempt = 1;

        loop {
            let raw = self
                .transport
                .read_input(channel)
                .await
                .map_err(CellError::transport)?;
            if let Some(level) = parse_level(&raw) {
                return Ok(level);
            }
            warn!("Unreadable value {:?} from input {} (attempt {}/{})", raw, channel, attempt, attempts);
            if attempt >= attempts {
                return Err(CellError::SensorReadFailure { channel, raw });
            }
            attempt += 1;
            pause(self.config.sensor_retry()).await;
        }
    }

    async fn set_led(&mut self, color: LedColor) -> Result<()> {
        let (a, b) = color.bits();
        self.register.write_bit(LED_BIT_A, a).await?;
        pause(self.config.led_settle()).await;
        self.register.write_bit(LED_BIT_B, b).await
    }
}

fn parse_level(raw: &str) -> Option<bool> {
    match raw.trim() {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedIo;

    const CLOSED: u8 = 12;
    const OPEN: u8 = 13;

    fn gripper(io: &Arc<ScriptedIo>) -> GripperController {
        GripperController::new(io.clone(), GripperConfig::immediate())
    }

    fn sensors(io: &ScriptedIo, closed: &str, open: &str) {
        io.set_input(CLOSED, closed);
        io.set_input(OPEN, open);
    }

    #[tokio::test]
    async fn test_closed_sensor_retries_once_then_fails_red() {
        let io = Arc::new(ScriptedIo::new());
        sensors(&io, "1", "0");
        let mut gripper = gripper(&io);

        let state = gripper.close(true).await.unwrap();
        assert_eq!(state, GripperSensorState::ClosedDetected);
        assert_eq!(gripper.last_close_attempts(), 2);
        assert_eq!(io.reads(CLOSED), 2);
        assert_eq!(gripper.led(), LedColor::Red);
        assert!(!state.module_held());
    }

    #[tokio::test]
    async fn test_closed_sensor_without_retry_fails_immediately() {
        let io = Arc::new(ScriptedIo::new());
        sensors(&io, "1", "0");
        let mut gripper = gripper(&io);

        assert_eq!(gripper.close(false).await.unwrap(), GripperSensorState::ClosedDetected);
        assert_eq!(gripper.last_close_attempts(), 1);
    }

    #[tokio::test]
    async fn test_neither_sensor_means_module_held() {
        let io = Arc::new(ScriptedIo::new());
        sensors(&io, "0", "0");
        let mut gripper = gripper(&io);

        let state = gripper.close(true).await.unwrap();
        assert_eq!(state, GripperSensorState::Indeterminate);
        assert!(state.module_held());
        assert_eq!(gripper.last_close_attempts(), 1);
        assert_eq!(gripper.led(), LedColor::Green);
    }

    #[tokio::test]
    async fn test_open_sensor_after_close_is_fault() {
        let io = Arc::new(ScriptedIo::new());
        sensors(&io, "0", "1");
        let mut gripper = gripper(&io);

        assert_eq!(gripper.close(true).await.unwrap(), GripperSensorState::OpenDetected);
        assert_eq!(gripper.last_close_attempts(), 1);
        assert_eq!(gripper.led(), LedColor::Yellow);
    }

    #[tokio::test]
    async fn test_retry_can_recover_a_grip() {
        let io = Arc::new(ScriptedIo::new());
        sensors(&io, "0", "0");
        io.push_input(CLOSED, "1");
        let mut gripper = gripper(&io);

        assert_eq!(gripper.close(true).await.unwrap(), GripperSensorState::Indeterminate);
        assert_eq!(gripper.last_close_attempts(), 2);
        assert_eq!(gripper.led(), LedColor::Green);
    }

    #[tokio::test]
    async fn test_close_leaves_hold_on_release_off() {
        let io = Arc::new(ScriptedIo::new());
        sensors(&io, "0", "0");
        let mut gripper = gripper(&io);
        gripper.open().await.unwrap();
        gripper.close(true).await.unwrap();

        assert!(gripper.register().is_set(15));
        assert!(!gripper.register().is_set(14));
        assert_eq!(io.last_write(), Some(gripper.register().value()));
    }

    #[tokio::test]
    async fn test_empty_sensor_read_is_retried() {
        let io = Arc::new(ScriptedIo::new());
        sensors(&io, "0", "0");
        io.push_input(CLOSED, "");
        let mut gripper = gripper(&io);

        assert_eq!(gripper.close(true).await.unwrap(), GripperSensorState::Indeterminate);
        assert_eq!(io.reads(CLOSED), 2);
    }

    #[tokio::test]
    async fn test_unparseable_sensor_after_retry_is_error() {
        let io = Arc::new(ScriptedIo::new());
        sensors(&io, "garbage", "0");
        let mut gripper = gripper(&io);

        let err = gripper.close(true).await.unwrap_err();
        assert!(matches!(err, CellError::SensorReadFailure { channel: CLOSED, .. }));
        assert_eq!(io.reads(CLOSED), 2);
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let io = Arc::new(ScriptedIo::new());
        sensors(&io, "0", "0");
        let mut gripper = gripper(&io);
        gripper.close(true).await.unwrap();

        gripper.open().await.unwrap();
        let once = gripper.register().value();
        gripper.open().await.unwrap();
        assert_eq!(gripper.register().value(), once);

        assert!(gripper.register().is_set(14));
        assert!(!gripper.register().is_set(15));
        assert_eq!(gripper.led(), LedColor::None);
    }

    #[test]
    fn test_phase_bound() {
        use GripperSensorState::*;
        assert_eq!(GripPhase::FirstAttempt.after(ClosedDetected, true), GripPhase::Retrying);
        assert_eq!(GripPhase::FirstAttempt.after(ClosedDetected, false), GripPhase::Failed);
        assert_eq!(GripPhase::Retrying.after(ClosedDetected, true), GripPhase::Failed);
        assert_eq!(GripPhase::Retrying.after(Indeterminate, true), GripPhase::Succeeded);
        assert_eq!(GripPhase::FirstAttempt.after(OpenDetected, true), GripPhase::Failed);
    }

    #[test]
    fn test_sensor_classification() {
        let r = |closed, open| SensorReading { closed, open }.classify();
        assert_eq!(r(true, false), GripperSensorState::ClosedDetected);
        assert_eq!(r(true, true), GripperSensorState::ClosedDetected);
        assert_eq!(r(false, true), GripperSensorState::OpenDetected);
        assert_eq!(r(false, false), GripperSensorState::Indeterminate);
    }
}
