//! Configuration loading for the tray cell

use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use crate::{pose::{Joints, Pose}, CellError, Result};

/// Default configuration file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/default_config.yaml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CellConfig {
    #[serde(default)]
    pub calibration: CalibrationConfig,
    pub gripper: Option<GripperConfig>,
    pub motion: Option<MotionConfig>,
}

/// Taught reference poses for every tray and tester fixture
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CalibrationConfig {
    pub input: TrayCalibration,
    pub fail: TrayCalibration,
    pub pass: TrayCalibration,
    /// Tester fixtures 1..=3, in order
    pub testers: Vec<TesterCalibration>,
}

/// Plunge poses of the first and last slot of a tray's first row
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TrayCalibration {
    pub slot_1: Pose,
    pub slot_25: Pose,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TesterCalibration {
    pub site_a: Pose,
    pub site_c: Pose,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GripperConfig {
    pub hold_output: Option<u8>,
    pub release_output: Option<u8>,
    pub closed_sensor_input: Option<u8>,
    pub open_sensor_input: Option<u8>,
    pub settle_ms: Option<u64>,
    pub led_settle_ms: Option<u64>,
    pub sensor_retry_ms: Option<u64>,
    pub sensor_read_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MotionConfig {
    pub settle_timeout_seconds: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub check_reachability: Option<bool>,
    pub home_joints: Option<Joints>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            input: TrayCalibration {
                slot_1: Pose::new(178.02, 536.38, 213.98, -179.31, -0.71, 133.68),
                slot_25: Pose::new(417.98, 539.99, 214.00, -179.30, -0.71, 133.68),
            },
            fail: TrayCalibration {
                slot_1: Pose::new(179.00, 97.00, 217.00, -179.31, -0.71, 133.68),
                slot_25: Pose::new(419.00, 100.00, 217.04, -179.31, -0.71, 133.68),
            },
            pass: TrayCalibration {
                slot_1: Pose::new(180.04, -344.97, 216.05, -179.32, -0.71, 133.67),
                slot_25: Pose::new(419.99, -342.50, 214.66, -179.31, -0.71, 133.68),
            },
            testers: vec![
                TesterCalibration {
                    site_a: Pose::new(707.38, 469.52, 250.00, -179.57, -0.87, 42.95),
                    site_c: Pose::new(706.08, 342.82, 149.99, 179.09, 0.45, -136.54),
                },
                TesterCalibration {
                    site_a: Pose::new(712.40, 68.40, 149.99, -179.57, -0.87, 42.95),
                    site_c: Pose::new(710.49, -58.00, 149.99, 179.09, 0.45, -136.88),
                },
                TesterCalibration {
                    site_a: Pose::new(716.71, -328.41, 250.00, -180.00, -0.96, -135.40),
                    site_c: Pose::new(715.71, -455.35, 250.00, 180.00, 0.96, 44.49),
                },
            ],
        }
    }
}

impl CalibrationConfig {
    /// One reference pair per tester fixture
    pub fn validate(&self) -> Result<()> {
        let expected = crate::geometry::TESTER_COUNT as usize;
        if self.testers.len() != expected {
            return Err(CellError::Config(format!(
                "expected {} tester calibrations, found {}",
                expected,
                self.testers.len()
            )));
        }
        Ok(())
    }
}

impl CellConfig {
    pub fn load_from_path(config_path: &str) -> Result<Self> {
        let contents = fs::read_to_string(config_path)
            .map_err(|e| CellError::Config(format!("Failed to read {}: {}", config_path, e)))?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: CellConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject tables the geometry layer cannot address
    pub fn validate(&self) -> Result<()> {
        self.calibration.validate()?;

        let gripper = self.gripper();
        let bits = [gripper.hold_output(), gripper.release_output()];
        if let Some(bit) = bits.iter().find(|b| **b > 15) {
            return Err(CellError::InvalidOutputBit(*bit));
        }
        if bits.iter().any(|b| crate::io::LED_BITS.contains(b)) {
            return Err(CellError::Config("gripper outputs overlap the LED bits".to_string()));
        }
        if gripper.hold_output() == gripper.release_output() {
            return Err(CellError::Config("hold and release outputs must differ".to_string()));
        }
        if gripper.sensor_read_attempts() == 0 {
            return Err(CellError::Config("sensor_read_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Get gripper configuration with defaults
    pub fn gripper(&self) -> GripperConfig {
        self.gripper.clone().unwrap_or_default()
    }

    /// Get motion configuration with defaults
    pub fn motion(&self) -> MotionConfig {
        self.motion.clone().unwrap_or_default()
    }
}

impl GripperConfig {
    /// Zero settle delays, for simulation and tests
    pub fn immediate() -> Self {
        Self {
            settle_ms: Some(0),
            led_settle_ms: Some(0),
            sensor_retry_ms: Some(0),
            ..Self::default()
        }
    }

    pub fn hold_output(&self) -> u8 {
        self.hold_output.unwrap_or(15)
    }

    pub fn release_output(&self) -> u8 {
        self.release_output.unwrap_or(14)
    }

    pub fn closed_sensor_input(&self) -> u8 {
        self.closed_sensor_input.unwrap_or(12)
    }

    pub fn open_sensor_input(&self) -> u8 {
        self.open_sensor_input.unwrap_or(13)
    }

    /// Pause after each valve output change
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms.unwrap_or(150))
    }

    /// Pause between the two LED bit writes
    pub fn led_settle(&self) -> Duration {
        Duration::from_millis(self.led_settle_ms.unwrap_or(30))
    }

    /// Backoff before re-reading an empty sensor response
    pub fn sensor_retry(&self) -> Duration {
        Duration::from_millis(self.sensor_retry_ms.unwrap_or(100))
    }

    pub fn sensor_read_attempts(&self) -> u32 {
        self.sensor_read_attempts.unwrap_or(2)
    }
}

impl MotionConfig {
    /// Zero poll interval, for simulation and tests
    pub fn immediate() -> Self {
        Self {
            poll_interval_ms: Some(0),
            ..Self::default()
        }
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs(self.settle_timeout_seconds.unwrap_or(60))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(20))
    }

    pub fn check_reachability(&self) -> bool {
        self.check_reachability.unwrap_or(false)
    }

    pub fn home_joints(&self) -> Joints {
        self.home_joints.unwrap_or([0.0, 0.0, 90.0, 0.0, 90.0, 0.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let yaml = r#"
calibration:
  input:
    slot_1: [178.02, 536.38, 213.98, -179.31, -0.71, 133.68]
    slot_25: [417.98, 539.99, 214.00, -179.30, -0.71, 133.68]
  fail:
    slot_1: [179.00, 97.00, 217.00, -179.31, -0.71, 133.68]
    slot_25: [419.00, 100.00, 217.04, -179.31, -0.71, 133.68]
  pass:
    slot_1: [180.04, -344.97, 216.05, -179.32, -0.71, 133.67]
    slot_25: [419.99, -342.50, 214.66, -179.31, -0.71, 133.68]
  testers:
    - site_a: [707.38, 469.52, 250.00, -179.57, -0.87, 42.95]
      site_c: [706.08, 342.82, 149.99, 179.09, 0.45, -136.54]
    - site_a: [712.40, 68.40, 149.99, -179.57, -0.87, 42.95]
      site_c: [710.49, -58.00, 149.99, 179.09, 0.45, -136.88]
    - site_a: [716.71, -328.41, 250.00, -180.00, -0.96, -135.40]
      site_c: [715.71, -455.35, 250.00, 180.00, 0.96, 44.49]
"#;
        let config = CellConfig::load_from_str(yaml).unwrap();
        assert_eq!(config.calibration, CalibrationConfig::default());
        assert_eq!(config.gripper().hold_output(), 15);
        assert_eq!(config.gripper().release_output(), 14);
        assert_eq!(config.gripper().settle(), Duration::from_millis(150));
        assert_eq!(config.motion().poll_interval(), Duration::from_millis(20));
        assert!(!config.motion().check_reachability());
    }

    #[test]
    fn test_missing_tester_is_rejected() {
        let mut config = CellConfig::default();
        config.calibration.testers.pop();
        assert!(matches!(config.validate(), Err(CellError::Config(_))));
    }

    #[test]
    fn test_gripper_bits_must_not_overlap_led() {
        let config = CellConfig {
            gripper: Some(GripperConfig { hold_output: Some(10), ..GripperConfig::default() }),
            ..CellConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CellConfig {
            gripper: Some(GripperConfig { release_output: Some(16), ..GripperConfig::default() }),
            ..CellConfig::default()
        };
        assert!(matches!(config.validate(), Err(CellError::InvalidOutputBit(16))));
    }

    #[test]
    fn test_shipped_config_parses() {
        let contents = include_str!("../config/default_config.yaml");
        let config = CellConfig::load_from_str(contents).unwrap();
        assert_eq!(config.calibration, CalibrationConfig::default());
    }
}
