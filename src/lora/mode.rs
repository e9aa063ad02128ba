//! Operating mode state machine
//!
//! The controller is the only writer of RegOpMode. Each mode carries its own
//! DIO0 routing so the completion signal means RxDone, TxDone or CadDone
//! depending on what the chip is doing.

use crate::lora::registers::{dio0, op_mode, reg};
use crate::lora::traits::{RadioError, RegisterPort};

/// Chip operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sleep,
    Idle,
    Receive,
    Transmit,
    ChannelActivityDetect,
}

impl Mode {
    /// RegOpMode value, always with the LoRa long-range bit
    pub fn op_mode(self) -> u8 {
        let bits = match self {
            Self::Sleep => op_mode::SLEEP,
            Self::Idle => op_mode::STDBY,
            Self::Receive => op_mode::RX_CONTINUOUS,
            Self::Transmit => op_mode::TX,
            Self::ChannelActivityDetect => op_mode::CAD,
        };
        op_mode::LONG_RANGE_MODE | bits
    }

    /// DIO0 mapping written alongside the mode, if the mode signals completion
    pub fn dio_mapping(self) -> Option<u8> {
        match self {
            Self::Receive => Some(dio0::RX_DONE),
            Self::Transmit => Some(dio0::TX_DONE),
            Self::ChannelActivityDetect => Some(dio0::CAD_DONE),
            Self::Sleep | Self::Idle => None,
        }
    }
}

/// Tracks the current mode and issues the register writes for transitions
#[derive(Debug, Clone)]
pub struct ModeController {
    current: Mode,
}

impl ModeController {
    /// Controller for a chip in `mode`
    pub fn new(mode: Mode) -> Self {
        Self { current: mode }
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    pub fn is(&self, mode: Mode) -> bool {
        self.current == mode
    }

    /// Move to `target`, writing the mode register only if it differs.
    ///
    /// Returns whether a transition happened.
    pub async fn transition<P: RegisterPort>(
        &mut self,
        port: &mut P,
        target: Mode,
    ) -> Result<bool, RadioError> {
        if self.current == target {
            return Ok(false);
        }
        self.write(port, target).await?;
        Ok(true)
    }

    /// Write `target` unconditionally, used when the chip state is unknown
    pub async fn force<P: RegisterPort>(
        &mut self,
        port: &mut P,
        target: Mode,
    ) -> Result<(), RadioError> {
        self.write(port, target).await
    }

    /// Read RegOpMode back and compare it with the tracked mode
    pub async fn verify<P: RegisterPort>(&self, port: &mut P) -> Result<bool, RadioError> {
        let value = port.read_register(reg::OP_MODE).await?;
        Ok(value == self.current.op_mode())
    }

    async fn write<P: RegisterPort>(&mut self, port: &mut P, target: Mode) -> Result<(), RadioError> {
        log::debug!("mode {:?} -> {:?}", self.current, target);
        port.write_register(reg::OP_MODE, target.op_mode()).await?;
        if let Some(mapping) = target.dio_mapping() {
            port.write_register(reg::DIO_MAPPING1, mapping).await?;
        }
        self.current = target;
        Ok(())
    }
}
