pub mod framing;

pub use framing::{AddressFilter, FrameHeader, HeaderMode};
