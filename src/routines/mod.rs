//! Test routines.
//!
//! One module per test family. Every routine borrows the tester session and
//! a run context (output directory, DUT identity, settings), walks its
//! address space in ascending order, interleaves mux commands with meter
//! queries, and returns a metric plus the summary chunk appended to the run
//! summary file.

pub mod capacitance;
pub mod continuity;
pub mod loopback;
pub mod reset;

use crate::analysis::CapTally;
use crate::config::Settings;
use crate::dut::DeviceId;
use std::path::Path;

/// Shared inputs of one test invocation.
pub struct RunContext<'a> {
    pub out_dir: &'a Path,
    pub dut: &'a DeviceId,
    pub settings: &'a Settings,
}

impl<'a> RunContext<'a> {
    pub fn new(out_dir: &'a Path, dut: &'a DeviceId, settings: &'a Settings) -> Self {
        Self {
            out_dir,
            dut,
            settings,
        }
    }
}

/// Outcome of a 1D or 2D continuity sweep.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub shorts: u32,
    pub summary: String,
}

/// Outcome of a single node-to-node continuity check.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub ohms: f64,
    pub shorted: bool,
    pub summary: String,
}

/// Outcome of a delta-capacitance sweep.
#[derive(Debug, Clone)]
pub struct CapOutcome {
    pub tally: CapTally,
    pub summary: String,
}
