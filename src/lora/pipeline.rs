//! Completion signal handling
//!
//! One pass reads the interrupt flags, works out which operation finished and
//! updates the driver: a received frame is validated and parked in the pending
//! buffer, a finished transmission is counted, a finished CAD records its
//! result. Every completion returns the chip to Idle.

use crate::lora::driver::Rf95;
use crate::lora::mode::Mode;
use crate::lora::registers::{op_mode, reg, IrqFlags, RX_PAYLOAD_CRC_IS_ON};
use crate::lora::telemetry::{self, LinkQuality};
use crate::lora::traits::{RadioError, RegisterPort};
use crate::protocol::framing::{parse_frame, FrameBuffer, FrameHeader, HeaderMode, ParseOutcome};
use embedded_hal_async::delay::DelayNs;

/// What a completion signal turned out to mean
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionEvent {
    /// Receive failed CRC checking or timed out; counted, nothing stored
    BadReception,
    /// A frame arrived in the FIFO
    RxDone,
    /// The queued frame left the antenna
    TxDone,
    /// Channel activity detection finished
    CadDone { detected: bool },
    /// Nothing relevant to the current mode
    Spurious,
}

/// Classify a completion from the tracked mode and the chip state.
///
/// Receive-mode outcomes need at least one receive flag, so polling with no
/// event pending never counts a bad reception.
pub fn classify(
    mode: Mode,
    flags: IrqFlags,
    crc_present: bool,
    check_crc: bool,
    chip_in_cad: bool,
) -> CompletionEvent {
    let rx_event = flags.intersects(IrqFlags::RX_DONE | IrqFlags::RX_TIMEOUT | IrqFlags::PAYLOAD_CRC_ERROR);
    let rx_failed = flags.intersects(IrqFlags::RX_TIMEOUT | IrqFlags::PAYLOAD_CRC_ERROR) || !crc_present;

    match mode {
        Mode::Receive if rx_event && check_crc && rx_failed => CompletionEvent::BadReception,
        Mode::Receive if flags.contains(IrqFlags::RX_DONE) => CompletionEvent::RxDone,
        Mode::Transmit if flags.contains(IrqFlags::TX_DONE) => CompletionEvent::TxDone,
        Mode::ChannelActivityDetect if flags.contains(IrqFlags::CAD_DONE) || !chip_in_cad => {
            CompletionEvent::CadDone {
                detected: flags.contains(IrqFlags::CAD_DETECTED),
            }
        }
        _ => CompletionEvent::Spurious,
    }
}

/// Link statistics since the driver was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCounters {
    /// Frames accepted into the pending buffer
    pub rx_good: u32,
    /// Receptions rejected for CRC errors, missing CRC or timeout
    pub rx_bad: u32,
    /// Transmissions completed
    pub tx_good: u32,
}

/// A validated frame waiting to be received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    raw: FrameBuffer,
    header: Option<FrameHeader>,
    header_len: usize,
    quality: LinkQuality,
}

impl ReceivedFrame {
    /// Payload with the header stripped
    pub fn payload(&self) -> &[u8] {
        &self.raw[self.header_len..]
    }

    /// Frame bytes as read from the FIFO, header included
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Parsed header; `None` for headerless frames
    pub fn header(&self) -> Option<FrameHeader> {
        self.header
    }

    pub fn quality(&self) -> LinkQuality {
        self.quality
    }
}

impl<P, D> Rf95<P, D>
where
    P: RegisterPort,
    D: DelayNs,
{
    /// Service one completion signal.
    ///
    /// Safe to call with nothing pending; the flags then classify as
    /// [`CompletionEvent::Spurious`] and no register is written.
    pub async fn handle_completion_signal(&mut self) -> Result<CompletionEvent, RadioError> {
        let flags = IrqFlags::from_bits_retain(self.port.read_register(reg::IRQ_FLAGS).await?);
        let crc_present = self.port.read_register(reg::HOP_CHANNEL).await? & RX_PAYLOAD_CRC_IS_ON != 0;
        let chip_mode = self.port.read_register(reg::OP_MODE).await? & op_mode::MODE_MASK;

        let event = classify(
            self.modes.current(),
            flags,
            crc_present,
            self.check_crc,
            chip_mode == op_mode::CAD,
        );
        if event != CompletionEvent::Spurious {
            log::trace!("irq {:?} in {:?}: {:?}", flags, self.modes.current(), event);
        }

        match event {
            CompletionEvent::BadReception => {
                self.counters.rx_bad = self.counters.rx_bad.wrapping_add(1);
                self.last_quality.crc_present = crc_present;
                self.last_quality.crc_error = flags.contains(IrqFlags::PAYLOAD_CRC_ERROR);
                log::warn!("bad reception: {:?}, crc present {}", flags, crc_present);
            }
            CompletionEvent::RxDone => {
                self.take_reception(flags, crc_present).await?;
            }
            CompletionEvent::TxDone => {
                self.counters.tx_good = self.counters.tx_good.wrapping_add(1);
                self.set_mode_idle().await?;
            }
            CompletionEvent::CadDone { detected } => {
                self.cad_detected = detected;
                self.set_mode_idle().await?;
            }
            CompletionEvent::Spurious => {}
        }

        // One clear is not always honoured by the chip
        if !flags.is_empty() {
            self.port.write_register(reg::IRQ_FLAGS, flags.bits()).await?;
            self.port.write_register(reg::IRQ_FLAGS, flags.bits()).await?;
        }
        Ok(event)
    }

    /// Bytes to read for the frame just received
    fn reception_len(&self, reported: u8) -> u8 {
        match (self.implicit_len, self.header_mode) {
            (Some(expected), HeaderMode::None | HeaderMode::FromOnly) => expected,
            _ => reported,
        }
    }

    async fn take_reception(&mut self, flags: IrqFlags, crc_present: bool) -> Result<(), RadioError> {
        let reported = self.port.read_register(reg::RX_NB_BYTES).await?;
        let len = self.reception_len(reported) as usize;

        let current = self.port.read_register(reg::FIFO_RX_CURRENT_ADDR).await?;
        self.port.write_register(reg::FIFO_ADDR_PTR, current).await?;
        let mut raw = FrameBuffer::new();
        raw.resize_default(len).map_err(|_| RadioError::PayloadTooLarge)?;
        self.port.burst_read(reg::FIFO, &mut raw).await?;
        self.port.write_register(reg::IRQ_FLAGS, IrqFlags::all().bits()).await?;

        let snr_tenths = telemetry::snr_tenths(self.port.read_register(reg::PKT_SNR_VALUE).await?);
        let rssi_raw = self.port.read_register(reg::PKT_RSSI_VALUE).await?;
        let (raw_rssi, rssi) = telemetry::packet_rssi(rssi_raw, snr_tenths, self.using_hf_port);
        let quality = LinkQuality {
            raw_rssi,
            rssi,
            snr_tenths,
            crc_present,
            crc_error: flags.contains(IrqFlags::PAYLOAD_CRC_ERROR),
        };
        self.last_quality = quality;

        if self.pending.is_some() {
            log::warn!("rx {} bytes dropped, previous frame not taken", len);
            return Ok(());
        }

        match parse_frame(self.header_mode, &raw, &self.filter) {
            ParseOutcome::Accepted(header) => {
                log::debug!("rx {} bytes, rssi {} dBm, snr {}", len, rssi, snr_tenths);
                self.counters.rx_good = self.counters.rx_good.wrapping_add(1);
                self.pending = Some(ReceivedFrame {
                    raw,
                    header,
                    header_len: self.header_mode.header_len(),
                    quality,
                });
                self.set_mode_idle().await?;
            }
            ParseOutcome::TooShort => log::debug!("rx {} bytes too short for {:?}", len, self.header_mode),
            ParseOutcome::NotForUs => log::debug!("rx frame for another node"),
        }
        Ok(())
    }
}
