//! Signal routing and shared access to the radio
//!
//! Ties board interrupt lines to driver instances and lets the signal task and
//! application tasks use one driver without overlapping.

pub mod registry;
pub mod shared;

pub use registry::{SignalLine, SignalRegistry};
pub use shared::SharedRadio;
