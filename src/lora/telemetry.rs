//! Link quality arithmetic on raw register readings
//!
//! Per the SX1276/77/78/79 datasheet section 5.5.5 (RSSI and SNR in LoRa mode)
//! and section 4.1.5 (frequency error indication).

use crate::config::chip;
use crate::lora::modem::Bandwidth;

/// RSSI offset for the band the radio is tuned to
pub fn rssi_offset(using_hf_port: bool) -> i16 {
    if using_hf_port {
        chip::RSSI_OFFSET_HF
    } else {
        chip::RSSI_OFFSET_LF
    }
}

/// Packet SNR in tenths of a dB from the signed RegPktSnrValue (quarter-dB steps)
pub fn snr_tenths(raw: u8) -> i16 {
    (raw as i8 as i16) * 10 / 4
}

/// Current channel RSSI in dBm from RegRssiValue
pub fn sample_rssi(raw: u8, using_hf_port: bool) -> i16 {
    raw as i16 - rssi_offset(using_hf_port)
}

/// Offset-adjusted raw packet RSSI and SNR-corrected packet RSSI, both in dBm.
///
/// Below the noise floor (negative SNR) the SNR is added to the raw reading;
/// otherwise the raw reading is scaled by 16/15.
pub fn packet_rssi(raw: u8, snr_tenths: i16, using_hf_port: bool) -> (i16, i16) {
    let raw = raw as i16;
    let corrected = if snr_tenths < 0 {
        raw + snr_tenths / 10
    } else {
        raw * 16 / 15
    };
    let offset = rssi_offset(using_hf_port);
    (raw - offset, corrected - offset)
}

/// Frequency error in Hz from the 20-bit RegFei value.
///
/// `Ferror = FreqError * 2^24 / Fxtal * BW[kHz] / 500`
pub fn frequency_error_hz(fei: [u8; 3], bandwidth: Bandwidth) -> i32 {
    let mut raw = ((fei[0] as i32 & 0x0F) << 16) | ((fei[1] as i32) << 8) | fei[2] as i32;
    if raw & 0x8_0000 != 0 {
        raw |= !0xF_FFFF;
    }

    let bw_khz = bandwidth.hz() as f32 / 1000.0;
    let ratio = (1u32 << 24) as f32 / chip::FXOSC_HZ as f32 / 500.0;
    (raw as f32 * bw_khz * ratio) as i32
}

/// Link quality of the last good reception
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkQuality {
    /// Raw packet RSSI adjusted by the band offset (dBm)
    pub raw_rssi: i16,
    /// SNR-corrected packet RSSI (dBm)
    pub rssi: i16,
    /// SNR in tenths of a dB
    pub snr_tenths: i16,
    /// The received PHY header announced a payload CRC
    pub crc_present: bool,
    /// The modem flagged a payload CRC error
    pub crc_error: bool,
}

impl LinkQuality {
    /// CRC was present and checked out
    pub fn crc_ok(&self) -> bool {
        self.crc_present && !self.crc_error
    }
}
