//! LoRa modulation parameters and their register encoding
//!
//! Bandwidth, spreading factor and coding rate clamp to the nearest supported
//! hardware value. [`ModemConfig`] renders the three modem configuration
//! registers, deriving the low-data-rate-optimisation bit from bandwidth and
//! spreading factor so it is never set on its own. Presets go through the same
//! rendering, which keeps the preset and field-by-field paths in agreement.

use crate::config::link::LDRO_SYMBOL_TIME_MS;
use crate::lora::registers::modem;
use crate::lora::traits::RadioError;

/// Signal bandwidth
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bandwidth {
    Khz7_8,
    Khz10_4,
    Khz15_6,
    Khz20_8,
    Khz31_25,
    Khz41_7,
    Khz62_5,
    Khz125,
    Khz250,
    Khz500,
}

impl Bandwidth {
    pub const ALL: [Bandwidth; 10] = [
        Self::Khz7_8,
        Self::Khz10_4,
        Self::Khz15_6,
        Self::Khz20_8,
        Self::Khz31_25,
        Self::Khz41_7,
        Self::Khz62_5,
        Self::Khz125,
        Self::Khz250,
        Self::Khz500,
    ];

    /// Smallest supported bandwidth at or above `hz`; anything above 250 kHz is 500 kHz
    pub fn from_hz(hz: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|bw| hz <= bw.hz())
            .unwrap_or(Self::Khz500)
    }

    /// Nominal bandwidth in Hz
    pub fn hz(self) -> u32 {
        match self {
            Self::Khz7_8 => 7_800,
            Self::Khz10_4 => 10_400,
            Self::Khz15_6 => 15_600,
            Self::Khz20_8 => 20_800,
            Self::Khz31_25 => 31_250,
            Self::Khz41_7 => 41_700,
            Self::Khz62_5 => 62_500,
            Self::Khz125 => 125_000,
            Self::Khz250 => 250_000,
            Self::Khz500 => 500_000,
        }
    }

    /// Register index (bits 7..4 of RegModemConfig1)
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

/// Spreading factor, 6 to 12 chips-per-symbol exponent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpreadingFactor(u8);

impl SpreadingFactor {
    pub const MIN: u8 = 6;
    pub const MAX: u8 = 12;

    /// Clamp into SF6..=SF12
    pub fn new(sf: u8) -> Self {
        Self(sf.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Chips per symbol, `2^sf`
    pub fn chips(self) -> u32 {
        1 << self.0
    }
}

/// Coding rate 4/5 to 4/8, identified by its denominator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CodingRate(u8);

impl CodingRate {
    /// Clamp the denominator into 5..=8
    pub fn new(denominator: u8) -> Self {
        Self(denominator.clamp(5, 8))
    }

    pub fn denominator(self) -> u8 {
        self.0
    }

    /// Field value for bits 3..1 of RegModemConfig1
    fn bits(self) -> u8 {
        (self.0 - 4) << 1
    }
}

/// Symbol duration in milliseconds, `1000 * 2^sf / bw`
pub fn symbol_time_ms(bandwidth: Bandwidth, sf: SpreadingFactor) -> f32 {
    1000.0 * sf.chips() as f32 / bandwidth.hz() as f32
}

/// Low-data-rate optimisation is required once a symbol lasts longer than 16 ms
pub fn low_data_rate_optimize(bandwidth: Bandwidth, sf: SpreadingFactor) -> bool {
    symbol_time_ms(bandwidth, sf) > LDRO_SYMBOL_TIME_MS
}

/// Register image of the three modem configuration registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemRegisters {
    /// RegModemConfig1 (0x1D)
    pub config1: u8,
    /// RegModemConfig2 (0x1E)
    pub config2: u8,
    /// RegModemConfig3 (0x26)
    pub config3: u8,
}

/// Complete modem configuration
///
/// Immutable; the `with_*` methods return an updated copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemConfig {
    bandwidth: Bandwidth,
    coding_rate: CodingRate,
    spreading_factor: SpreadingFactor,
    payload_crc: bool,
    implicit_header: bool,
}

impl ModemConfig {
    /// Explicit header, payload CRC on
    pub fn new(bandwidth: Bandwidth, coding_rate: CodingRate, spreading_factor: SpreadingFactor) -> Self {
        Self {
            bandwidth,
            coding_rate,
            spreading_factor,
            payload_crc: true,
            implicit_header: false,
        }
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    pub fn coding_rate(&self) -> CodingRate {
        self.coding_rate
    }

    pub fn spreading_factor(&self) -> SpreadingFactor {
        self.spreading_factor
    }

    pub fn payload_crc(&self) -> bool {
        self.payload_crc
    }

    pub fn implicit_header(&self) -> bool {
        self.implicit_header
    }

    pub fn low_data_rate_optimize(&self) -> bool {
        low_data_rate_optimize(self.bandwidth, self.spreading_factor)
    }

    pub fn with_bandwidth(self, bandwidth: Bandwidth) -> Self {
        Self { bandwidth, ..self }
    }

    pub fn with_spreading_factor(self, spreading_factor: SpreadingFactor) -> Self {
        Self {
            spreading_factor,
            ..self
        }
    }

    pub fn with_coding_rate(self, coding_rate: CodingRate) -> Self {
        Self {
            coding_rate,
            ..self
        }
    }

    pub fn with_payload_crc(self, payload_crc: bool) -> Self {
        Self {
            payload_crc,
            ..self
        }
    }

    pub fn with_implicit_header(self, implicit_header: bool) -> Self {
        Self {
            implicit_header,
            ..self
        }
    }

    /// Render the register image; AGC auto stays on
    pub fn registers(&self) -> ModemRegisters {
        let mut config1 = ((self.bandwidth.index() << modem::BW_SHIFT) & modem::BW_MASK)
            | (self.coding_rate.bits() & modem::CODING_RATE_MASK);
        if self.implicit_header {
            config1 |= modem::IMPLICIT_HEADER_MODE_ON;
        }

        let mut config2 =
            (self.spreading_factor.value() << modem::SF_SHIFT) & modem::SPREADING_FACTOR_MASK;
        if self.payload_crc {
            config2 |= modem::PAYLOAD_CRC_ON;
        }

        let mut config3 = modem::AGC_AUTO_ON;
        if self.low_data_rate_optimize() {
            config3 |= modem::LOW_DATA_RATE_OPTIMIZE;
        }

        ModemRegisters {
            config1,
            config2,
            config3,
        }
    }
}

impl Default for ModemConfig {
    fn default() -> Self {
        ModemPreset::Bw125Cr45Sf128.config()
    }
}

/// Canned modem configurations
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemPreset {
    /// Bw 125 kHz, Cr 4/5, Sf 128 chips: the chip default, medium range
    Bw125Cr45Sf128 = 0,
    /// Bw 500 kHz, Cr 4/5, Sf 128 chips: fast, short range
    Bw500Cr45Sf128 = 1,
    /// Bw 31.25 kHz, Cr 4/8, Sf 512 chips: slow, long range
    Bw31_25Cr48Sf512 = 2,
    /// Bw 125 kHz, Cr 4/8, Sf 4096 chips: slow, long range
    Bw125Cr48Sf4096 = 3,
}

impl ModemPreset {
    pub const ALL: [ModemPreset; 4] = [
        Self::Bw125Cr45Sf128,
        Self::Bw500Cr45Sf128,
        Self::Bw31_25Cr48Sf512,
        Self::Bw125Cr48Sf4096,
    ];

    pub fn config(self) -> ModemConfig {
        let (bw, cr, sf) = match self {
            Self::Bw125Cr45Sf128 => (Bandwidth::Khz125, 5, 7),
            Self::Bw500Cr45Sf128 => (Bandwidth::Khz500, 5, 7),
            Self::Bw31_25Cr48Sf512 => (Bandwidth::Khz31_25, 8, 9),
            Self::Bw125Cr48Sf4096 => (Bandwidth::Khz125, 8, 12),
        };
        ModemConfig::new(bw, CodingRate::new(cr), SpreadingFactor::new(sf))
    }
}

impl TryFrom<u8> for ModemPreset {
    type Error = RadioError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or(RadioError::InvalidConfig)
    }
}
