#![cfg_attr(not(test), no_std)]

#[cfg(test)]
extern crate std;

// Shared logic for the soldering-pen station.
//
// This crate stays portable across MCU firmware and host tooling by avoiding
// the Rust standard library and exposing the hardware seams (ADC front-end,
// heater switch) as traits the target crates implement.

pub mod diagnostics;
pub mod heating;
pub mod pid;
pub mod preset;
pub mod telemetry;
