//! # Array E-Test Core Library
//!
//! Library crate for the `array_etest` application: automated continuity and
//! capacitance testing of 16x16 sensor arrays through a benchtop multimeter,
//! a microcontroller-driven multiplexer board, and a programmable power
//! supply. The binary (`main.rs`) wires the interactive test flow on top of
//! these modules.
//!
//! ## Crate Structure
//!
//! - **`protocol`**: the mux board command vocabulary (clear byte, secondary
//!   path selectors, dimension selectors, triggers) and validated address
//!   indices with their single-hex-digit wire encoding.
//! - **`instrument`**: device sessions. `MuxController` drives the mux board
//!   over a fire-and-forget serial link; `Multimeter` and `PowerSupply` talk
//!   SCPI through a `VisaResource` abstraction (mock by default, real VISA
//!   behind the `instrument_visa` feature).
//! - **`routines`**: one module per test family: continuity sweeps (2D, 1D,
//!   node, TFT-on), delta-capacitance sweep, loopback checks, reset sweep.
//! - **`analysis`**: pure measurement classification: short detection,
//!   capacitance band partition, ASCII short maps, pass/fail helpers.
//! - **`data`**: CSV cell and grid writers, the results ledger row, summary
//!   text assembly, and the blank-line-chunk summary diff.
//! - **`config`**: TOML-backed `Settings` (tester hardware list, delays,
//!   thresholds, storage paths).
//! - **`session`**: the owned tester session (mux + DMM + PSU handles),
//!   hardware bring-up from the configured tester list, and safe shutdown.
//! - **`plans`**: the 1T/3T test sequences that chain routines and fill the
//!   results ledger.
//! - **`prompt`**: blocking operator prompts over injected I/O.
//! - **`dut`**: device-under-test identity (array ID, stage, kind, TFT type).
//! - **`error`**: the crate error enum and result alias.

pub mod analysis;
pub mod config;
pub mod data;
pub mod dut;
pub mod error;
pub mod instrument;
pub mod plans;
pub mod prompt;
pub mod protocol;
pub mod routines;
pub mod session;
