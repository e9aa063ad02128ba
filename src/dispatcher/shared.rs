//! Radio shared between the signal task and application tasks
//!
//! The driver sits behind an async mutex. Each operation holds the lock only
//! for register traffic; waits for a transmission or CAD to finish release it
//! between polls so the signal task can get in and service the completion.
//! Those waits are paced by a delay of their own, kept outside the driver lock.
//! Completions are also published on a [`Signal`] so a receiver can sleep
//! until something arrives instead of polling.

use crate::config::timing;
use crate::lora::driver::Rf95;
use crate::lora::mode::Mode;
use crate::lora::pipeline::{CompletionEvent, LinkCounters, ReceivedFrame};
use crate::lora::traits::{RadioError, RegisterPort};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_sync::signal::Signal;
use embedded_hal_async::delay::DelayNs;

/// Driver guarded by an async mutex, plus a completion notification
pub struct SharedRadio<M: RawMutex, P, D> {
    radio: Mutex<M, Rf95<P, D>>,
    /// Paces the unlocked waits
    pacer: Mutex<M, D>,
    events: Signal<M, CompletionEvent>,
}

impl<M: RawMutex, P, D> SharedRadio<M, P, D> {
    /// Share `radio`; `pacer` times the polls between lock acquisitions
    pub const fn new(radio: Rf95<P, D>, pacer: D) -> Self {
        Self {
            radio: Mutex::new(radio),
            pacer: Mutex::new(pacer),
            events: Signal::new(),
        }
    }

    /// Exclusive access for anything not wrapped here
    pub async fn lock(&self) -> MutexGuard<'_, M, Rf95<P, D>> {
        self.radio.lock().await
    }

    pub fn into_inner(self) -> Rf95<P, D> {
        self.radio.into_inner()
    }

    /// Release the driver and the pacing delay
    pub fn into_parts(self) -> (Rf95<P, D>, D) {
        (self.radio.into_inner(), self.pacer.into_inner())
    }

    /// Wait for the next non-spurious completion serviced by [`SharedRadio::on_signal`]
    pub async fn wait_event(&self) -> CompletionEvent {
        self.events.wait().await
    }

    pub async fn counters(&self) -> LinkCounters {
        self.radio.lock().await.counters()
    }
}

impl<M, P, D> SharedRadio<M, P, D>
where
    M: RawMutex,
    P: RegisterPort,
    D: DelayNs,
{
    /// Service one completion signal under the lock
    pub async fn on_signal(&self) -> Result<CompletionEvent, RadioError> {
        let event = self.radio.lock().await.handle_completion_signal().await?;
        if event != CompletionEvent::Spurious {
            self.events.signal(event);
        }
        Ok(event)
    }

    pub async fn available(&self) -> Result<bool, RadioError> {
        self.radio.lock().await.available().await
    }

    pub async fn receive(&self, buf: &mut [u8]) -> Result<Option<usize>, RadioError> {
        self.radio.lock().await.receive(buf).await
    }

    pub async fn receive_frame(&self) -> Result<Option<ReceivedFrame>, RadioError> {
        self.radio.lock().await.receive_frame().await
    }

    /// Transmit `payload` once any earlier transmission has completed.
    ///
    /// With a CAD timeout configured the channel is checked once first and
    /// [`RadioError::ChannelBusy`] returned if it is active. The lock is only
    /// taken to load the frame, never to wait for the chip.
    pub async fn send(&self, payload: &[u8]) -> Result<(), RadioError> {
        let cad_timeout = {
            let radio = self.radio.lock().await;
            if payload.len() > radio.max_payload_len() {
                return Err(RadioError::PayloadTooLarge);
            }
            radio.cad_timeout()
        };

        loop {
            self.wait_packet_sent().await;
            if cad_timeout.is_some() && self.is_channel_active().await? {
                return Err(RadioError::ChannelBusy);
            }

            let mut radio = self.radio.lock().await;
            if radio.mode() == Mode::Transmit {
                // Another task got a frame out first
                log::debug!("tx deferred, chip busy transmitting");
                continue;
            }
            return radio.start_transmit(payload).await;
        }
    }

    /// Wait, without holding the lock, until the chip leaves Transmit
    pub async fn wait_packet_sent(&self) {
        while self.radio.lock().await.mode() == Mode::Transmit {
            self.pause().await;
        }
    }

    /// Run channel activity detection, relying on the signal task for completion.
    ///
    /// Polls every `POLL_INTERVAL_US` for up to `CAD_POLL_LIMIT` polls, the same
    /// window as [`Rf95::is_channel_active`], then returns the chip to Idle and
    /// reports [`RadioError::CadTimeout`].
    pub async fn is_channel_active(&self) -> Result<bool, RadioError> {
        self.radio.lock().await.begin_channel_activity_detect().await?;

        for _ in 0..timing::CAD_POLL_LIMIT {
            {
                let radio = self.radio.lock().await;
                if radio.mode() != Mode::ChannelActivityDetect {
                    return Ok(radio.channel_activity_detected());
                }
            }
            self.pause().await;
        }

        log::warn!("CAD did not complete");
        self.radio.lock().await.set_mode_idle().await?;
        Err(RadioError::CadTimeout)
    }

    /// One poll interval with the driver unlocked
    async fn pause(&self) {
        yield_now().await;
        self.pacer
            .lock()
            .await
            .delay_us(timing::POLL_INTERVAL_US)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::registers::IrqFlags;
    use crate::lora::traits::mock::{MockRegisterPort, NoopDelay};
    use crate::lora::traits::RadioConfig;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use futures::executor::block_on;
    use futures::future::join;

    type TestRadio = SharedRadio<NoopRawMutex, MockRegisterPort, NoopDelay>;

    fn shared(config: RadioConfig) -> TestRadio {
        let mut radio = Rf95::new(MockRegisterPort::new(), NoopDelay::default());
        block_on(radio.init(&config)).unwrap();
        SharedRadio::new(radio, NoopDelay::default())
    }

    /// Service the completion signal a few times, as the signal task would
    async fn signal_pump(radio: &TestRadio, rounds: usize) {
        for _ in 0..rounds {
            yield_now().await;
            radio.on_signal().await.unwrap();
        }
    }

    #[test]
    fn test_receive_through_signal() {
        let radio = shared(RadioConfig::default());
        let mut buf = [0u8; 8];

        block_on(async {
            assert!(!radio.available().await.unwrap());
            radio.lock().await.port_mut().deliver(b"data", 20, 80, true);

            assert_eq!(radio.on_signal().await.unwrap(), CompletionEvent::RxDone);
            assert_eq!(radio.wait_event().await, CompletionEvent::RxDone);
            assert_eq!(radio.receive(&mut buf).await.unwrap(), Some(4));
        });

        assert_eq!(&buf[..4], b"data");
    }

    #[test]
    fn test_send_waits_for_signal_task() {
        let radio = shared(RadioConfig::default());

        block_on(async {
            radio.send(b"one").await.unwrap();
            radio.lock().await.port_mut().raise(IrqFlags::TX_DONE);

            let (sent, _) = join(radio.send(b"two"), signal_pump(&radio, 3)).await;
            sent.unwrap();
        });

        let (inner, pacer) = radio.into_parts();
        assert_eq!(inner.counters().tx_good, 1);
        assert_eq!(inner.mode(), Mode::Transmit);
        assert_eq!(inner.port().fifo(0, 3), b"two");
        assert!(pacer.calls >= 1);
    }

    #[test]
    fn test_send_rechecks_after_unlocked_wait() {
        let radio = shared(RadioConfig {
            cad_timeout_ms: Some(50),
            ..Default::default()
        });

        let result = block_on(async {
            radio.lock().await.port_mut().set_cad_response(Some(false));

            // While our CAD runs, another task starts its own transmission
            let other_task = async {
                yield_now().await;
                radio.on_signal().await.unwrap();
                radio.lock().await.start_transmit(b"other").await.unwrap();
                yield_now().await;
                yield_now().await;
                radio.lock().await.port_mut().raise(IrqFlags::TX_DONE);
                radio.on_signal().await.unwrap();
                signal_pump(&radio, 5).await;
            };

            let (result, _) = join(radio.send(b"mine"), other_task).await;
            result
        });

        assert_eq!(result, Ok(()));
        let inner = radio.into_inner();
        assert_eq!(inner.counters().tx_good, 1);
        assert_eq!(inner.mode(), Mode::Transmit);
        assert_eq!(inner.port().fifo(0, 4), b"mine");
    }

    #[test]
    fn test_send_rejects_oversized() {
        let radio = shared(RadioConfig::default());

        let result = block_on(radio.send(&[0u8; 256]));

        assert_eq!(result, Err(RadioError::PayloadTooLarge));
    }

    #[test]
    fn test_channel_activity_through_signal() {
        let radio = shared(RadioConfig::default());

        let detected = block_on(async {
            radio.lock().await.port_mut().set_cad_response(Some(true));
            let (detected, _) = join(radio.is_channel_active(), signal_pump(&radio, 2)).await;
            detected
        });

        assert_eq!(detected, Ok(true));
    }

    #[test]
    fn test_slow_channel_activity_detect() {
        let radio = shared(RadioConfig::default());

        let detected = block_on(async {
            // Chip reports completion only after many polls
            let slow_chip = async {
                for _ in 0..500 {
                    yield_now().await;
                }
                radio
                    .lock()
                    .await
                    .port_mut()
                    .raise(IrqFlags::CAD_DONE | IrqFlags::CAD_DETECTED);
                radio.on_signal().await.unwrap();
            };
            let (detected, _) = join(radio.is_channel_active(), slow_chip).await;
            detected
        });

        assert_eq!(detected, Ok(true));
        let (inner, pacer) = radio.into_parts();
        assert_eq!(inner.mode(), Mode::Idle);
        assert!(pacer.calls >= 500);
    }

    #[test]
    fn test_channel_activity_timeout_is_paced() {
        let radio = shared(RadioConfig::default());

        let result = block_on(radio.is_channel_active());

        assert_eq!(result, Err(RadioError::CadTimeout));
        let (inner, pacer) = radio.into_parts();
        assert_eq!(inner.mode(), Mode::Idle);
        // One poll interval per attempt, the same window the driver waits
        assert_eq!(pacer.calls, timing::CAD_POLL_LIMIT);
    }

    #[test]
    fn test_send_with_busy_channel() {
        let radio = shared(RadioConfig {
            cad_timeout_ms: Some(50),
            ..Default::default()
        });

        let result = block_on(async {
            radio.lock().await.port_mut().set_cad_response(Some(true));
            let (result, _) = join(radio.send(b"x"), signal_pump(&radio, 2)).await;
            result
        });

        assert_eq!(result, Err(RadioError::ChannelBusy));
    }
}
