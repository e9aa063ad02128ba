//! SX1276/77/78/79 LoRa driver
//!
//! Owns the register port, the mode state machine and the single pending
//! receive buffer. The completion signal is serviced by
//! [`Rf95::handle_completion_signal`] (see `pipeline`), either from a signal
//! task or from the polling calls here (`available`, `wait_packet_sent`,
//! `is_channel_active`). Every method takes `&mut self`, so the pipeline and
//! application calls never overlap on one instance.

use crate::config::{chip, timing};
use crate::lora::mode::{Mode, ModeController};
use crate::lora::modem::{Bandwidth, CodingRate, ModemConfig, ModemPreset, SpreadingFactor};
use crate::lora::pipeline::{LinkCounters, ReceivedFrame};
use crate::lora::registers::{pa, reg, TCXO_INPUT_ON};
use crate::lora::telemetry::{self, LinkQuality};
use crate::lora::traits::{RadioConfig, RadioError, RegisterPort};
use crate::protocol::framing::{build_frame, AddressFilter, FrameHeader, HeaderMode};
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

/// Snapshot of the diagnostic registers as `(address, value)` pairs
pub type RegisterSnapshot = Vec<(u8, u8), { reg::SNAPSHOT.len() }>;

/// LoRa driver over a register port `P`, with `D` pacing the cooperative waits
pub struct Rf95<P, D> {
    pub(super) port: P,
    pub(super) delay: D,
    pub(super) modes: ModeController,
    pub(super) modem: ModemConfig,
    pub(super) header_mode: HeaderMode,
    /// Fixed receive length while the chip runs in implicit-header mode
    pub(super) implicit_len: Option<u8>,
    pub(super) tx_header: FrameHeader,
    pub(super) filter: AddressFilter,
    pub(super) check_crc: bool,
    pub(super) using_hf_port: bool,
    pub(super) pending: Option<ReceivedFrame>,
    pub(super) last_quality: LinkQuality,
    pub(super) cad_detected: bool,
    pub(super) cad_timeout_ms: Option<u32>,
    pub(super) counters: LinkCounters,
}

impl<P, D> Rf95<P, D> {
    /// Create a driver; nothing touches the bus until [`Rf95::init`]
    pub fn new(port: P, delay: D) -> Self {
        let defaults = RadioConfig::default();
        Self {
            port,
            delay,
            modes: ModeController::new(Mode::Sleep),
            modem: ModemConfig::default(),
            header_mode: defaults.header_mode,
            implicit_len: None,
            tx_header: FrameHeader::broadcast(defaults.this_address),
            filter: AddressFilter {
                this_address: defaults.this_address,
                promiscuous: defaults.promiscuous,
            },
            check_crc: defaults.check_crc,
            using_hf_port: defaults.frequency_hz >= chip::HF_BAND_THRESHOLD_HZ,
            pending: None,
            last_quality: LinkQuality::default(),
            cad_detected: false,
            cad_timeout_ms: defaults.cad_timeout_ms,
            counters: LinkCounters::default(),
        }
    }

    /// Release the register port and delay
    pub fn release(self) -> (P, D) {
        (self.port, self.delay)
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Mode the driver last put the chip in
    pub fn mode(&self) -> Mode {
        self.modes.current()
    }

    pub fn header_mode(&self) -> HeaderMode {
        self.header_mode
    }

    pub fn header_len(&self) -> usize {
        self.header_mode.header_len()
    }

    /// Largest payload `send` accepts under the current header mode
    pub fn max_payload_len(&self) -> usize {
        self.header_mode.max_payload_len()
    }

    /// Change the header convention; the maximum payload length follows.
    ///
    /// A raw convention number converts with `HeaderMode::try_from`, which
    /// rejects anything but 0, 1 and 2.
    pub fn set_header_mode(&mut self, mode: HeaderMode) {
        log::debug!("header mode {:?}, max payload {}", mode, mode.max_payload_len());
        self.header_mode = mode;
    }

    pub fn modem_config(&self) -> ModemConfig {
        self.modem
    }

    pub fn set_this_address(&mut self, address: u8) {
        self.filter.this_address = address;
    }

    pub fn this_address(&self) -> u8 {
        self.filter.this_address
    }

    /// Accept `ToFromIdFlags` frames addressed to any node
    pub fn set_promiscuous(&mut self, promiscuous: bool) {
        self.filter.promiscuous = promiscuous;
    }

    /// Count CRC errors, timeouts and CRC-less frames as bad receptions
    pub fn set_check_crc(&mut self, check: bool) {
        self.check_crc = check;
    }

    pub fn set_header_to(&mut self, to: u8) {
        self.tx_header.to = to;
    }

    pub fn set_header_from(&mut self, from: u8) {
        self.tx_header.from = from;
    }

    pub fn set_header_id(&mut self, id: u8) {
        self.tx_header.id = id;
    }

    pub fn set_header_flags(&mut self, flags: u8) {
        self.tx_header.flags = flags;
    }

    /// Header fields stamped on outgoing frames
    pub fn tx_header(&self) -> FrameHeader {
        self.tx_header
    }

    /// Listen-before-talk window used by `send`; `None` disables it
    pub fn set_cad_timeout(&mut self, timeout_ms: Option<u32>) {
        self.cad_timeout_ms = timeout_ms;
    }

    pub fn cad_timeout(&self) -> Option<u32> {
        self.cad_timeout_ms
    }

    pub fn counters(&self) -> LinkCounters {
        self.counters
    }

    /// SNR of the last reception, in tenths of a dB
    pub fn last_snr(&self) -> i16 {
        self.last_quality.snr_tenths
    }

    /// SNR-corrected RSSI of the last reception (dBm)
    pub fn last_rssi(&self) -> i16 {
        self.last_quality.rssi
    }

    /// Band-adjusted raw RSSI of the last reception (dBm)
    pub fn last_raw_rssi(&self) -> i16 {
        self.last_quality.raw_rssi
    }

    pub fn last_crc_ok(&self) -> bool {
        self.last_quality.crc_ok()
    }

    /// Result of the last completed channel activity detection
    pub fn channel_activity_detected(&self) -> bool {
        self.cad_detected
    }

    /// A validated frame is waiting to be received
    pub fn has_pending_frame(&self) -> bool {
        self.pending.is_some()
    }

    /// Discard the pending frame, if any
    pub fn clear_pending(&mut self) {
        self.pending = None;
    }
}

impl<P, D> Rf95<P, D>
where
    P: RegisterPort,
    D: DelayNs,
{
    /// Check the chip is present, switch it to LoRa mode and apply `config`.
    ///
    /// Fails with [`RadioError::InitializationFailure`] if the version register
    /// reads as an empty bus or the chip does not settle in LoRa sleep.
    pub async fn init(&mut self, config: &RadioConfig) -> Result<(), RadioError> {
        let version = self.port.read_register(reg::VERSION).await?;
        if chip::ABSENT_VERSIONS.contains(&version) {
            log::warn!("no SX127x on the bus (version {:#04x})", version);
            return Err(RadioError::InitializationFailure);
        }

        // The long-range bit only latches in sleep
        self.modes.force(&mut self.port, Mode::Sleep).await?;
        self.delay.delay_ms(timing::MODE_SETTLE_MS).await;
        if !self.modes.verify(&mut self.port).await? {
            log::warn!("chip did not enter LoRa sleep");
            return Err(RadioError::InitializationFailure);
        }

        // Whole FIFO for either direction, never both at once
        self.port.write_register(reg::FIFO_TX_BASE_ADDR, 0).await?;
        self.port.write_register(reg::FIFO_RX_BASE_ADDR, 0).await?;

        self.set_header_mode(config.header_mode);
        self.filter = AddressFilter {
            this_address: config.this_address,
            promiscuous: config.promiscuous,
        };
        self.tx_header = FrameHeader::broadcast(config.this_address);
        self.check_crc = config.check_crc;
        self.cad_timeout_ms = config.cad_timeout_ms;
        self.pending = None;

        self.set_mode_idle().await?;
        self.set_modem_config(config.preset).await?;
        self.set_preamble_length(config.preamble_len).await?;
        self.set_frequency(config.frequency_hz).await?;
        self.set_tx_power(config.tx_power_dbm, config.use_rfo).await?;
        if let Some(word) = config.sync_word {
            self.set_sync_word(word).await?;
        }

        log::info!(
            "SX127x version {:#04x} ready at {} Hz, {:?}",
            version,
            config.frequency_hz,
            config.preset
        );
        Ok(())
    }

    pub async fn set_mode_idle(&mut self) -> Result<(), RadioError> {
        self.modes.transition(&mut self.port, Mode::Idle).await?;
        Ok(())
    }

    pub async fn sleep(&mut self) -> Result<(), RadioError> {
        self.modes.transition(&mut self.port, Mode::Sleep).await?;
        Ok(())
    }

    pub async fn set_mode_rx(&mut self) -> Result<(), RadioError> {
        self.modes.transition(&mut self.port, Mode::Receive).await?;
        Ok(())
    }

    pub async fn set_mode_tx(&mut self) -> Result<(), RadioError> {
        self.modes.transition(&mut self.port, Mode::Transmit).await?;
        Ok(())
    }

    /// Read the mode register back and compare it with the tracked mode
    pub async fn mode_consistent(&mut self) -> Result<bool, RadioError> {
        self.modes.verify(&mut self.port).await
    }

    /// Tune to `hz`, switching RSSI offsets to the matching band
    pub async fn set_frequency(&mut self, hz: u32) -> Result<(), RadioError> {
        self.set_mode_idle().await?;
        let frf = ((hz as u64) << chip::FRF_SHIFT) / chip::FXOSC_HZ as u64;
        self.port
            .write_register(reg::FRF_MSB, (frf >> 16) as u8)
            .await?;
        self.port.write_register(reg::FRF_MID, (frf >> 8) as u8).await?;
        self.port.write_register(reg::FRF_LSB, frf as u8).await?;
        self.using_hf_port = hz >= chip::HF_BAND_THRESHOLD_HZ;
        log::debug!("frequency {} Hz (frf {:#08x})", hz, frf);
        Ok(())
    }

    /// Set output power.
    ///
    /// With `use_rfo` the RFO pin is used and power clamps to -1..=14 dBm.
    /// Otherwise PA_BOOST is used, clamped to 5..=23 dBm, with the PA DAC
    /// supplying the last 3 dB above 20 dBm.
    pub async fn set_tx_power(&mut self, dbm: i8, use_rfo: bool) -> Result<(), RadioError> {
        if use_rfo {
            let power = dbm.clamp(-1, 14);
            self.port
                .write_register(reg::PA_CONFIG, pa::MAX_POWER | (power + 1) as u8)
                .await?;
            return Ok(());
        }

        let mut power = dbm.clamp(5, 23);
        if power > 20 {
            self.port.write_register(reg::PA_DAC, pa::DAC_ENABLE).await?;
            power -= 3;
        } else {
            self.port.write_register(reg::PA_DAC, pa::DAC_DISABLE).await?;
        }
        // Pout = 2 + OutputPower, OutputPower counted from 5 dBm here
        self.port
            .write_register(reg::PA_CONFIG, pa::PA_SELECT | (power - 5) as u8)
            .await?;
        Ok(())
    }

    /// Write all three modem registers from a canned preset.
    ///
    /// Presets use explicit headers with payload CRC on, so this also leaves
    /// implicit-header mode.
    pub async fn set_modem_config(&mut self, preset: ModemPreset) -> Result<(), RadioError> {
        self.set_mode_idle().await?;
        self.implicit_len = None;
        self.apply_modem(preset.config(), true).await
    }

    /// Clamp to the nearest supported bandwidth at or above `hz`
    pub async fn set_signal_bandwidth(&mut self, hz: u32) -> Result<(), RadioError> {
        self.set_mode_idle().await?;
        let config = self.modem.with_bandwidth(Bandwidth::from_hz(hz));
        self.apply_modem(config, false).await
    }

    /// Clamp into SF6..=SF12
    pub async fn set_spreading_factor(&mut self, sf: u8) -> Result<(), RadioError> {
        self.set_mode_idle().await?;
        let config = self.modem.with_spreading_factor(SpreadingFactor::new(sf));
        self.apply_modem(config, false).await
    }

    /// Coding rate 4/`denominator`, clamped into 4/5..=4/8
    pub async fn set_coding_rate4(&mut self, denominator: u8) -> Result<(), RadioError> {
        self.set_mode_idle().await?;
        let config = self.modem.with_coding_rate(CodingRate::new(denominator));
        self.apply_modem(config, false).await
    }

    /// Enable or disable the payload CRC on transmitted frames
    pub async fn set_payload_crc(&mut self, on: bool) -> Result<(), RadioError> {
        let config = self.modem.with_payload_crc(on);
        self.apply_modem(config, false).await
    }

    /// Switch the chip to implicit-header mode with a fixed payload length,
    /// or back to explicit headers with `None`.
    pub async fn set_implicit_header_mode(&mut self, length: Option<u8>) -> Result<(), RadioError> {
        self.set_mode_idle().await?;
        let config = self.modem.with_implicit_header(length.is_some());
        self.apply_modem(config, false).await?;
        if let Some(len) = length {
            self.port.write_register(reg::PAYLOAD_LENGTH, len).await?;
        }
        self.implicit_len = length;
        Ok(())
    }

    pub fn implicit_header_len(&self) -> Option<u8> {
        self.implicit_len
    }

    /// Preamble length in symbols
    pub async fn set_preamble_length(&mut self, symbols: u16) -> Result<(), RadioError> {
        let [msb, lsb] = symbols.to_be_bytes();
        self.port.write_register(reg::PREAMBLE_MSB, msb).await?;
        self.port.write_register(reg::PREAMBLE_LSB, lsb).await?;
        Ok(())
    }

    /// Sync word; 0x00 and 0xFF are reserved
    pub async fn set_sync_word(&mut self, word: u8) -> Result<(), RadioError> {
        if word == 0x00 || word == 0xFF {
            return Err(RadioError::InvalidConfig);
        }
        self.port.write_register(reg::SYNC_WORD, word).await?;
        Ok(())
    }

    pub async fn sync_word(&mut self) -> Result<u8, RadioError> {
        self.port.read_register(reg::SYNC_WORD).await
    }

    /// Route an external TCXO to the oscillator input.
    ///
    /// The bit only latches in sleep, so the chip is put to sleep first.
    pub async fn enable_tcxo(&mut self) -> Result<(), RadioError> {
        for _ in 0..timing::TCXO_ATTEMPTS {
            let tcxo = self.port.read_register(reg::TCXO).await?;
            if tcxo & TCXO_INPUT_ON != 0 {
                return Ok(());
            }
            self.sleep().await?;
            self.port
                .write_register(reg::TCXO, tcxo | TCXO_INPUT_ON)
                .await?;
        }
        log::warn!("TCXO input bit did not latch");
        Err(RadioError::InitializationFailure)
    }

    /// Current channel RSSI in dBm
    pub async fn sample_rssi(&mut self) -> Result<i16, RadioError> {
        let raw = self.port.read_register(reg::RSSI_VALUE).await?;
        Ok(telemetry::sample_rssi(raw, self.using_hf_port))
    }

    /// Frequency error of the last reception in Hz
    pub async fn frequency_error(&mut self) -> Result<i32, RadioError> {
        let fei = [
            self.port.read_register(reg::FEI_MSB).await?,
            self.port.read_register(reg::FEI_MID).await?,
            self.port.read_register(reg::FEI_LSB).await?,
        ];
        Ok(telemetry::frequency_error_hz(fei, self.modem.bandwidth()))
    }

    /// Diagnostic dump of the main configuration registers
    pub async fn read_registers(&mut self) -> Result<RegisterSnapshot, RadioError> {
        let mut snapshot = RegisterSnapshot::new();
        for addr in reg::SNAPSHOT {
            let value = self.port.read_register(addr).await?;
            log::debug!("reg {:#04x}: {:#04x}", addr, value);
            let _ = snapshot.push((addr, value));
        }
        Ok(snapshot)
    }

    /// Queue `payload` for transmission behind the current header.
    ///
    /// Waits for a previous transmission to finish and, if a CAD timeout is
    /// configured, for the channel to go quiet. Returns once the chip is in
    /// Transmit; completion is reported through the signal.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        if payload.len() > self.max_payload_len() {
            return Err(RadioError::PayloadTooLarge);
        }

        self.wait_packet_sent().await?;
        self.set_mode_idle().await?;
        self.wait_channel_clear().await?;
        self.start_transmit(payload).await
    }

    /// Load the FIFO and switch to Transmit without any waiting
    pub async fn start_transmit(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        let frame = build_frame(self.header_mode, &self.tx_header, payload)?;

        self.set_mode_idle().await?;
        self.port.write_register(reg::FIFO_ADDR_PTR, 0).await?;
        self.port.burst_write(reg::FIFO, &frame).await?;
        self.port
            .write_register(reg::PAYLOAD_LENGTH, frame.len() as u8)
            .await?;
        self.modes.transition(&mut self.port, Mode::Transmit).await?;

        log::debug!("tx {} bytes ({} header)", frame.len(), self.header_len());
        Ok(())
    }

    /// Service the completion signal until the chip leaves Transmit
    pub async fn wait_packet_sent(&mut self) -> Result<(), RadioError> {
        while self.modes.is(Mode::Transmit) {
            self.handle_completion_signal().await?;
            if self.modes.is(Mode::Transmit) {
                self.delay.delay_us(timing::POLL_INTERVAL_US).await;
            }
        }
        Ok(())
    }

    async fn wait_channel_clear(&mut self) -> Result<(), RadioError> {
        let Some(timeout_ms) = self.cad_timeout_ms else {
            return Ok(());
        };

        let mut waited_ms = 0;
        while self.is_channel_active().await? {
            if waited_ms >= timeout_ms {
                log::warn!("channel busy for {} ms", waited_ms);
                return Err(RadioError::ChannelBusy);
            }
            self.delay.delay_ms(timing::CAD_BACKOFF_MS).await;
            waited_ms += timing::CAD_BACKOFF_MS;
        }
        Ok(())
    }

    /// Enter ChannelActivityDetect (no-op if already there)
    pub async fn begin_channel_activity_detect(&mut self) -> Result<(), RadioError> {
        self.modes
            .transition(&mut self.port, Mode::ChannelActivityDetect)
            .await?;
        Ok(())
    }

    /// Run channel activity detection and report whether a signal was seen.
    ///
    /// Polls the completion signal until the pipeline returns the chip to Idle.
    /// If CAD never completes within the poll budget the chip is put back in
    /// Idle and [`RadioError::CadTimeout`] is returned.
    pub async fn is_channel_active(&mut self) -> Result<bool, RadioError> {
        self.begin_channel_activity_detect().await?;

        for _ in 0..timing::CAD_POLL_LIMIT {
            self.handle_completion_signal().await?;
            if !self.modes.is(Mode::ChannelActivityDetect) {
                return Ok(self.cad_detected);
            }
            self.delay.delay_us(timing::POLL_INTERVAL_US).await;
        }

        log::warn!("CAD did not complete");
        self.set_mode_idle().await?;
        Err(RadioError::CadTimeout)
    }

    /// Advance the receive pipeline and report whether a frame is pending.
    ///
    /// Arms Receive when nothing is pending and the chip is neither
    /// transmitting nor detecting channel activity.
    pub async fn available(&mut self) -> Result<bool, RadioError> {
        self.handle_completion_signal().await?;

        match self.modes.current() {
            Mode::Transmit => return Ok(false),
            Mode::ChannelActivityDetect => {}
            Mode::Sleep | Mode::Idle | Mode::Receive => {
                if self.pending.is_none() {
                    self.set_mode_rx().await?;
                }
            }
        }
        Ok(self.pending.is_some())
    }

    /// Poll [`Rf95::available`] for up to `timeout_ms`
    pub async fn wait_available_timeout(&mut self, timeout_ms: u32) -> Result<bool, RadioError> {
        let polls = timeout_ms.saturating_mul(1000) / timing::POLL_INTERVAL_US;
        for _ in 0..=polls {
            if self.available().await? {
                return Ok(true);
            }
            self.delay.delay_us(timing::POLL_INTERVAL_US).await;
        }
        Ok(false)
    }

    /// Take the pending frame with its header and link quality
    pub async fn receive_frame(&mut self) -> Result<Option<ReceivedFrame>, RadioError> {
        if !self.available().await? {
            return Ok(None);
        }
        Ok(self.pending.take())
    }

    /// Copy the pending payload (header stripped) into `buf`.
    ///
    /// Returns the number of bytes copied, truncating to `buf.len()`, or
    /// `None` if nothing was pending. The pending frame is consumed either way.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>, RadioError> {
        let Some(frame) = self.receive_frame().await? else {
            return Ok(None);
        };
        let payload = frame.payload();
        let len = payload.len().min(buf.len());
        buf[..len].copy_from_slice(&payload[..len]);
        Ok(Some(len))
    }

    /// Write the modem registers for `config`; unless `all`, only those that changed
    async fn apply_modem(&mut self, config: ModemConfig, all: bool) -> Result<(), RadioError> {
        let old = self.modem.registers();
        let new = config.registers();

        if all || old.config1 != new.config1 {
            self.port.write_register(reg::MODEM_CONFIG1, new.config1).await?;
        }
        if all || old.config2 != new.config2 {
            self.port.write_register(reg::MODEM_CONFIG2, new.config2).await?;
        }
        if all || old.config3 != new.config3 {
            self.port.write_register(reg::MODEM_CONFIG3, new.config3).await?;
        }

        log::debug!(
            "modem {:?} {:?} 4/{} ldro={}",
            config.bandwidth(),
            config.spreading_factor(),
            config.coding_rate().denominator(),
            config.low_data_rate_optimize()
        );
        self.modem = config;
        Ok(())
    }
}
