#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod dispatcher;
pub mod lora;
pub mod protocol;
pub mod tasks;

pub use dispatcher::{SharedRadio, SignalRegistry};
pub use lora::{RadioConfig, RadioError, RegisterPort, Rf95, SpiRegisterPort};
