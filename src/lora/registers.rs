//! SX1276/77/78/79 register map (LoRa mode)
//!
//! Addresses and field masks from the SX1276/77/78/79 datasheet, pp.108-115.
//! Every other module reads these constants rather than spelling out raw
//! addresses.

use bitflags::bitflags;

/// Register addresses
pub mod reg {
    pub const FIFO: u8 = 0x00;
    pub const OP_MODE: u8 = 0x01;
    pub const FRF_MSB: u8 = 0x06;
    pub const FRF_MID: u8 = 0x07;
    pub const FRF_LSB: u8 = 0x08;
    pub const PA_CONFIG: u8 = 0x09;
    pub const FIFO_ADDR_PTR: u8 = 0x0D;
    pub const FIFO_TX_BASE_ADDR: u8 = 0x0E;
    pub const FIFO_RX_BASE_ADDR: u8 = 0x0F;
    pub const FIFO_RX_CURRENT_ADDR: u8 = 0x10;
    pub const IRQ_FLAGS: u8 = 0x12;
    pub const RX_NB_BYTES: u8 = 0x13;
    pub const PKT_SNR_VALUE: u8 = 0x19;
    pub const PKT_RSSI_VALUE: u8 = 0x1A;
    pub const RSSI_VALUE: u8 = 0x1B;
    pub const HOP_CHANNEL: u8 = 0x1C;
    pub const MODEM_CONFIG1: u8 = 0x1D;
    pub const MODEM_CONFIG2: u8 = 0x1E;
    pub const PREAMBLE_MSB: u8 = 0x20;
    pub const PREAMBLE_LSB: u8 = 0x21;
    pub const PAYLOAD_LENGTH: u8 = 0x22;
    pub const MODEM_CONFIG3: u8 = 0x26;
    pub const FEI_MSB: u8 = 0x28;
    pub const FEI_MID: u8 = 0x29;
    pub const FEI_LSB: u8 = 0x2A;
    pub const SYNC_WORD: u8 = 0x39;
    pub const DIO_MAPPING1: u8 = 0x40;
    pub const VERSION: u8 = 0x42;
    pub const TCXO: u8 = 0x4B;
    pub const PA_DAC: u8 = 0x4D;

    /// Registers included in a diagnostic snapshot
    pub const SNAPSHOT: [u8; 35] = [
        0x01, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11, 0x12,
        0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F, 0x20,
        0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27,
    ];
}

/// SPI address bit selecting a write access
pub const SPI_WRITE_MASK: u8 = 0x80;

/// RegOpMode fields
pub mod op_mode {
    pub const LONG_RANGE_MODE: u8 = 0x80;
    /// Mode bits 2..0
    pub const MODE_MASK: u8 = 0x07;

    pub const SLEEP: u8 = 0x00;
    pub const STDBY: u8 = 0x01;
    pub const TX: u8 = 0x03;
    pub const RX_CONTINUOUS: u8 = 0x05;
    pub const CAD: u8 = 0x07;
}

/// RegDioMapping1 values routing DIO0
pub mod dio0 {
    pub const RX_DONE: u8 = 0x00;
    pub const TX_DONE: u8 = 0x40;
    pub const CAD_DONE: u8 = 0x80;
}

/// RegModemConfig1 / 2 / 3 fields
pub mod modem {
    /// Bandwidth, bits 7..4 of config 1
    pub const BW_MASK: u8 = 0xF0;
    pub const BW_SHIFT: u8 = 4;
    /// Coding rate, bits 3..1 of config 1
    pub const CODING_RATE_MASK: u8 = 0x0E;
    pub const IMPLICIT_HEADER_MODE_ON: u8 = 0x01;

    /// Spreading factor, bits 7..4 of config 2
    pub const SPREADING_FACTOR_MASK: u8 = 0xF0;
    pub const SF_SHIFT: u8 = 4;
    pub const PAYLOAD_CRC_ON: u8 = 0x04;

    pub const LOW_DATA_RATE_OPTIMIZE: u8 = 0x08;
    pub const AGC_AUTO_ON: u8 = 0x04;
}

/// RegHopChannel: CRC presence signalled in the received PHY header
pub const RX_PAYLOAD_CRC_IS_ON: u8 = 0x40;

/// RegPaConfig / RegPaDac fields
pub mod pa {
    pub const PA_SELECT: u8 = 0x80;
    pub const MAX_POWER: u8 = 0x70;
    pub const DAC_ENABLE: u8 = 0x07;
    pub const DAC_DISABLE: u8 = 0x04;
}

/// RegTcxo: external clipped-sine input
pub const TCXO_INPUT_ON: u8 = 0x10;

bitflags! {
    /// RegIrqFlags; each bit is cleared by writing 1 to it
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqFlags: u8 {
        const RX_TIMEOUT = 0x80;
        const RX_DONE = 0x40;
        const PAYLOAD_CRC_ERROR = 0x20;
        const VALID_HEADER = 0x10;
        const TX_DONE = 0x08;
        const CAD_DONE = 0x04;
        const FHSS_CHANGE_CHANNEL = 0x02;
        const CAD_DETECTED = 0x01;
    }
}
