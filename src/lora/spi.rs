//! Register port over an SPI device
//!
//! The SX127x frames every access as an address byte followed by data. Bit 7 of
//! the address selects a write; reads and writes both auto-increment the address
//! except on the FIFO register, which streams through the FIFO pointer instead.

use crate::lora::registers::SPI_WRITE_MASK;
use crate::lora::traits::{RadioError, RegisterPort};
use embedded_hal_async::spi::{Operation, SpiDevice};

/// Register port driving an SX127x through an `embedded-hal-async` SPI device.
///
/// The SPI device owns chip-select handling.
pub struct SpiRegisterPort<SPI> {
    spi: SPI,
}

impl<SPI> SpiRegisterPort<SPI> {
    /// Wrap an SPI device
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Release the underlying SPI device
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI> RegisterPort for SpiRegisterPort<SPI>
where
    SPI: SpiDevice,
{
    async fn read_register(&mut self, addr: u8) -> Result<u8, RadioError> {
        let mut frame = [addr & !SPI_WRITE_MASK, 0x00];
        self.spi
            .transfer_in_place(&mut frame)
            .await
            .map_err(|_| RadioError::Transport)?;
        Ok(frame[1])
    }

    async fn write_register(&mut self, addr: u8, value: u8) -> Result<u8, RadioError> {
        let mut frame = [addr | SPI_WRITE_MASK, value];
        self.spi
            .transfer_in_place(&mut frame)
            .await
            .map_err(|_| RadioError::Transport)?;
        Ok(frame[0])
    }

    async fn burst_read(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), RadioError> {
        let header = [addr & !SPI_WRITE_MASK];
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Read(buf)])
            .await
            .map_err(|_| RadioError::Transport)
    }

    async fn burst_write(&mut self, addr: u8, data: &[u8]) -> Result<(), RadioError> {
        let header = [addr | SPI_WRITE_MASK];
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Write(data)])
            .await
            .map_err(|_| RadioError::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal_async::spi::ErrorType;
    use heapless::Vec;

    /// SPI device recording every byte written and answering reads from a script
    struct RecordingSpi {
        written: Vec<u8, 64>,
        reply: u8,
    }

    impl ErrorType for RecordingSpi {
        type Error = Infallible;
    }

    impl SpiDevice for RecordingSpi {
        async fn transaction(
            &mut self,
            operations: &mut [Operation<'_, u8>],
        ) -> Result<(), Infallible> {
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(data) => {
                        let _ = self.written.extend_from_slice(data);
                    }
                    Operation::Read(buf) => buf.fill(self.reply),
                    Operation::Transfer(read, write) => {
                        let _ = self.written.extend_from_slice(write);
                        read.fill(self.reply);
                    }
                    Operation::TransferInPlace(buf) => {
                        let _ = self.written.extend_from_slice(buf);
                        buf.fill(self.reply);
                    }
                    Operation::DelayNs(_) => {}
                }
            }
            Ok(())
        }
    }

    fn spi(reply: u8) -> RecordingSpi {
        RecordingSpi {
            written: Vec::new(),
            reply,
        }
    }

    #[test]
    fn test_write_sets_address_bit() {
        let mut port = SpiRegisterPort::new(spi(0x00));

        futures::executor::block_on(async {
            port.write_register(0x01, 0x81).await.unwrap();
        });

        assert_eq!(port.release().written.as_slice(), &[0x81, 0x81]);
    }

    #[test]
    fn test_read_clears_address_bit() {
        let mut port = SpiRegisterPort::new(spi(0x12));

        futures::executor::block_on(async {
            let value = port.read_register(0x42).await.unwrap();
            assert_eq!(value, 0x12);
        });

        assert_eq!(port.release().written.as_slice(), &[0x42, 0x00]);
    }

    #[test]
    fn test_burst_transfers() {
        let mut port = SpiRegisterPort::new(spi(0xAB));

        futures::executor::block_on(async {
            port.burst_write(0x00, &[1, 2, 3]).await.unwrap();
            let mut buf = [0u8; 2];
            port.burst_read(0x00, &mut buf).await.unwrap();
            assert_eq!(buf, [0xAB, 0xAB]);
        });

        assert_eq!(port.release().written.as_slice(), &[0x80, 1, 2, 3, 0x00]);
    }
}
