//! Register port trait and driver-wide error and configuration types
//!
//! The register port is the only path from the driver to the chip, so a
//! simulated register file can stand in for the SPI bus in tests.

use crate::config::radio_defaults;
use crate::lora::modem::ModemPreset;
use crate::protocol::framing::HeaderMode;
use core::future::Future;

/// Errors that can occur during radio operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// Device absent or not answering as an SX127x in LoRa mode
    InitializationFailure,
    /// Configuration argument outside the supported values
    InvalidConfig,
    /// Payload longer than the current maximum payload length
    PayloadTooLarge,
    /// Register port (SPI) failure
    Transport,
    /// Channel activity detection never completed
    CadTimeout,
    /// Channel stayed active for the whole CAD-before-transmit window
    ChannelBusy,
    /// Every slot in the signal registry is taken
    SignalLinesExhausted,
}

/// Addressed register access to the chip
///
/// Addresses are the 7-bit register numbers from the datasheet; the port adds
/// the read/write bit.
pub trait RegisterPort {
    /// Read a single register
    fn read_register(&mut self, addr: u8) -> impl Future<Output = Result<u8, RadioError>>;

    /// Write a single register
    ///
    /// Returns the status byte clocked out during the address phase. Its
    /// meaning is device specific and the driver ignores it.
    fn write_register(
        &mut self,
        addr: u8,
        value: u8,
    ) -> impl Future<Output = Result<u8, RadioError>>;

    /// Read `buf.len()` bytes starting at `addr` (the FIFO does not auto-increment the address)
    fn burst_read(
        &mut self,
        addr: u8,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(), RadioError>>;

    /// Write `data` starting at `addr`
    fn burst_write(&mut self, addr: u8, data: &[u8]) -> impl Future<Output = Result<(), RadioError>>;
}

/// Settings applied by `Rf95::init`
#[derive(Debug, Clone)]
pub struct RadioConfig {
    /// Centre frequency in Hz
    pub frequency_hz: u32,
    /// Canned bandwidth / coding rate / spreading factor
    pub preset: ModemPreset,
    /// Preamble length in symbols
    pub preamble_len: u16,
    /// Transmit power in dBm
    pub tx_power_dbm: i8,
    /// Use the RFO output instead of PA_BOOST
    pub use_rfo: bool,
    /// Addressing convention prefixed to each payload
    pub header_mode: HeaderMode,
    /// Own address for `to` filtering
    pub this_address: u8,
    /// Accept frames for any address
    pub promiscuous: bool,
    /// Treat CRC errors and CRC-less frames as bad receptions
    pub check_crc: bool,
    /// Sync word; `None` keeps the chip default (0x12)
    pub sync_word: Option<u8>,
    /// Listen-before-talk window for `send`; `None` transmits immediately
    pub cad_timeout_ms: Option<u32>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: radio_defaults::FREQUENCY_HZ,
            preset: ModemPreset::Bw125Cr45Sf128,
            preamble_len: radio_defaults::PREAMBLE_LEN,
            tx_power_dbm: radio_defaults::TX_POWER_DBM,
            use_rfo: false,
            header_mode: HeaderMode::None,
            this_address: radio_defaults::THIS_ADDRESS,
            promiscuous: false,
            check_crc: true,
            sync_word: None,
            cad_timeout_ms: None,
        }
    }
}
