//! Completion signal task
//!
//! Waits on the DIO0 line of one radio and runs the completion pipeline each
//! time it goes high. The pipeline clears the interrupt flags, which drops the
//! line again before the next wait.

use crate::dispatcher::SharedRadio;
use crate::lora::traits::{RadioError, RegisterPort};
use core::convert::Infallible;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;

/// Task that services the completion signal of `radio` forever.
///
/// Returns only on a pin or register port failure.
pub async fn signal_task<W, M, P, D>(
    mut line: W,
    radio: &SharedRadio<M, P, D>,
) -> Result<Infallible, RadioError>
where
    W: Wait,
    M: RawMutex,
    P: RegisterPort,
    D: DelayNs,
{
    loop {
        line.wait_for_high().await.map_err(|_| {
            log::warn!("completion line wait failed");
            RadioError::Transport
        })?;

        let event = radio.on_signal().await.inspect_err(|e| {
            log::warn!("completion signal failed: {:?}", e);
        })?;
        log::trace!("completion: {:?}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::mode::Mode;
    use crate::lora::registers::IrqFlags;
    use crate::lora::traits::mock::{MockRegisterPort, NoopDelay};
    use crate::lora::traits::RadioConfig;
    use crate::lora::Rf95;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embedded_hal::digital::{Error, ErrorKind, ErrorType};
    use futures::executor::block_on;

    #[derive(Debug)]
    struct LineError;

    impl Error for LineError {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Line that reports high a fixed number of times, then fails
    struct ScriptedLine {
        highs: usize,
    }

    impl ErrorType for ScriptedLine {
        type Error = LineError;
    }

    impl Wait for ScriptedLine {
        async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
            if self.highs == 0 {
                return Err(LineError);
            }
            self.highs -= 1;
            Ok(())
        }

        async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
            self.wait_for_high().await
        }

        async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
            self.wait_for_high().await
        }
    }

    fn shared() -> SharedRadio<NoopRawMutex, MockRegisterPort, NoopDelay> {
        let mut radio = Rf95::new(MockRegisterPort::new(), NoopDelay::default());
        block_on(radio.init(&RadioConfig::default())).unwrap();
        SharedRadio::new(radio, NoopDelay::default())
    }

    #[test]
    fn test_services_transmit_completion() {
        let radio = shared();

        let result = block_on(async {
            radio.send(b"beacon").await.unwrap();
            radio.lock().await.port_mut().raise(IrqFlags::TX_DONE);
            signal_task(ScriptedLine { highs: 2 }, &radio).await
        });

        assert_eq!(result, Err(RadioError::Transport));
        let inner = radio.into_inner();
        assert_eq!(inner.counters().tx_good, 1);
        assert_eq!(inner.mode(), Mode::Idle);
    }

    #[test]
    fn test_stops_on_port_failure() {
        let radio = shared();

        let result = block_on(async {
            radio.lock().await.port_mut().set_failing(true);
            signal_task(ScriptedLine { highs: 5 }, &radio).await
        });

        assert_eq!(result, Err(RadioError::Transport));
    }
}
