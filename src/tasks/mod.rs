//! Async tasks driving the radio

pub mod radio;

pub use radio::signal_task;
