//! Hardware and link configuration constants for SX1276/77/78/79 modems

/// Fixed properties of the chip
pub mod chip {
    /// FIFO bytes usable by a single frame (header + payload)
    pub const FIFO_CAPACITY: usize = 255;

    /// Crystal oscillator frequency in Hz
    pub const FXOSC_HZ: u32 = 32_000_000;

    /// FRF register is `frequency * 2^19 / FXOSC`
    pub const FRF_SHIFT: u32 = 19;

    /// Frequencies at or above this use the high-frequency port
    pub const HF_BAND_THRESHOLD_HZ: u32 = 779_000_000;

    /// RSSI offset on the high-frequency port (dBm)
    pub const RSSI_OFFSET_HF: i16 = 157;

    /// RSSI offset on the low-frequency port (dBm)
    pub const RSSI_OFFSET_LF: i16 = 164;

    /// Version register values that mean "nothing on the bus"
    pub const ABSENT_VERSIONS: [u8; 2] = [0x00, 0xFF];
}

/// Defaults applied by `Rf95::init`
pub mod radio_defaults {
    /// EU ISM band frequency
    pub const FREQUENCY_HZ: u32 = 868_000_000;
    /// Preamble length in symbols
    pub const PREAMBLE_LEN: u16 = 8;
    pub const TX_POWER_DBM: i8 = 13;
    /// Own node address for header filtering
    pub const THIS_ADDRESS: u8 = 0xFF;
}

/// Link-layer constants
pub mod link {
    /// Destination address accepted by every node
    pub const BROADCAST_ADDRESS: u8 = 0xFF;

    /// Symbol time above which low-data-rate optimisation is required
    pub const LDRO_SYMBOL_TIME_MS: f32 = 16.0;
}

/// Poll budgets for the cooperative waits
pub mod timing {
    /// Time for the chip to settle into Sleep after power-up
    pub const MODE_SETTLE_MS: u32 = 10;

    /// Interval between completion-signal polls
    pub const POLL_INTERVAL_US: u32 = 100;

    /// Two seconds of polls, enough for CAD at SF12 / 7.8 kHz
    pub const CAD_POLL_LIMIT: u32 = 20_000;

    /// Back-off between CAD attempts before a transmit
    pub const CAD_BACKOFF_MS: u32 = 10;

    /// Attempts to latch the TCXO input bit
    pub const TCXO_ATTEMPTS: u8 = 10;
}
