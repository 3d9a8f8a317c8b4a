//! Digital I/O: transport abstraction and the output shadow register

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use crate::{CellError, Result};

/// Output bit driving the first LED signal
pub const LED_BIT_A: u8 = 10;
/// Output bit driving the second LED signal
pub const LED_BIT_B: u8 = 11;
pub const LED_BITS: [u8; 2] = [LED_BIT_A, LED_BIT_B];

/// Trait for the controller-side digital I/O link
///
/// Implementations talk to the physical controller (or a simulator).
/// The shadow register in this module is the only writer of outputs.
#[async_trait]
pub trait DigitalIoTransport: Send + Sync {
    /// Write the full 16-bit output register
    async fn write_output_register(&self, value: u16) -> anyhow::Result<()>;

    /// Read one discrete input as the controller reports it.
    ///
    /// An empty string is a transient read failure, not a zero.
    async fn read_input(&self, channel: u8) -> anyhow::Result<String>;
}

/// Status LED colour, a view over bits [`LED_BIT_A`] and [`LED_BIT_B`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedColor {
    Red,
    Green,
    Yellow,
    None,
}

impl LedColor {
    /// Levels of (bit 10, bit 11)
    pub fn bits(&self) -> (bool, bool) {
        match self {
            LedColor::Red => (true, true),
            LedColor::Green => (false, true),
            LedColor::Yellow => (true, false),
            LedColor::None => (false, false),
        }
    }

    pub fn from_bits(a: bool, b: bool) -> Self {
        match (a, b) {
            (true, true) => LedColor::Red,
            (false, true) => LedColor::Green,
            (true, false) => LedColor::Yellow,
            (false, false) => LedColor::None,
        }
    }
}

/// 16-bit shadow of the controller's output register.
///
/// Each mutation is written through to the transport before returning,
/// so the shadow never silently diverges from the device.
pub struct OutputRegister {
    value: u16,
    transport: Arc<dyn DigitalIoTransport>,
}

impl OutputRegister {
    pub fn new(transport: Arc<dyn DigitalIoTransport>) -> Self {
        Self { value: 0, transport }
    }

    pub fn value(&self) -> u16 {
        self.value
    }

    pub fn is_set(&self, bit: u8) -> bool {
        bit < 16 && self.value & (1 << bit) != 0
    }

    pub async fn set_bit(&mut self, bit: u8) -> Result<()> {
        self.write_bit(bit, true).await
    }

    pub async fn clear_bit(&mut self, bit: u8) -> Result<()> {
        self.write_bit(bit, false).await
    }

    pub async fn write_bit(&mut self, bit: u8, level: bool) -> Result<()> {
        if bit > 15 {
            return Err(CellError::InvalidOutputBit(bit));
        }
        let mask = 1u16 << bit;
        let next = if level { self.value | mask } else { self.value & !mask };

        self.transport
            .write_output_register(next)
            .await
            .map_err(CellError::transport)?;
        // Only commit once the device has accepted the pattern
        self.value = next;
        debug!("Output bit {} -> {} (register 0x{:04X})", bit, level as u8, next);
        Ok(())
    }

    pub fn led(&self) -> LedColor {
        LedColor::from_bits(self.is_set(LED_BIT_A), self.is_set(LED_BIT_B))
    }
}
