pub mod driver;
pub mod mode;
pub mod modem;
pub mod pipeline;
pub mod registers;
pub mod spi;
pub mod telemetry;
pub mod traits;

pub use driver::Rf95;
pub use mode::Mode;
pub use modem::{Bandwidth, CodingRate, ModemConfig, ModemPreset, SpreadingFactor};
pub use pipeline::{CompletionEvent, LinkCounters, ReceivedFrame};
pub use spi::SpiRegisterPort;
pub use traits::{RadioConfig, RadioError, RegisterPort};
