//! Error types for tray cell operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CellError>;

#[derive(Error, Debug)]
pub enum CellError {
    #[error("Geometry contract violation: {0}")]
    GeometryContractViolation(String),

    #[error("Sensor read failure on input {channel}: got {raw:?}")]
    SensorReadFailure { channel: u8, raw: String },

    #[error("Motion fault: {0}")]
    MotionFault(String),

    #[error("Motion did not settle within {0:?}")]
    MotionTimeout(std::time::Duration),

    #[error("I/O transport error: {0}")]
    Transport(String),

    #[error("Output bit {0} is outside the 16-bit register")]
    InvalidOutputBit(u8),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CellError {
    pub(crate) fn motion(err: anyhow::Error) -> Self {
        CellError::MotionFault(format!("{:#}", err))
    }

    pub(crate) fn transport(err: anyhow::Error) -> Self {
        CellError::Transport(format!("{:#}", err))
    }
}
