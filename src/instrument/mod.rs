//! Instrument sessions: the serial mux controller and the two VISA/SCPI
//! instruments (multimeter, power supply). Each device is reached through a
//! small link trait with a mock implementation, so every routine in the
//! crate runs unchanged against fakes.

pub mod multimeter;
pub mod mux;
pub mod psu;
pub mod visa;

pub use multimeter::Multimeter;
pub use mux::{MockMuxLink, MuxController, MuxLink};
pub use psu::{PowerSupply, PsuState};
pub use visa::{open_resource, MockVisaResource, VisaResource};
