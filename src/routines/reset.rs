//! Reset-line sweep.
//!
//! Walks the 16 reset lines through the reset-sweep trigger. The firmware
//! side does the actual pulsing; the host only sequences the addresses.

use crate::error::AppResult;
use crate::protocol::{AddressIndex, Dimension, Trigger};
use crate::session::TesterSession;
use log::info;

/// Sweep all reset lines in ascending order, leaving the board cleared.
pub fn reset_sweep(session: &mut TesterSession) -> AppResult<()> {
    for index in AddressIndex::all() {
        session.mux.clear()?;
        session.mux.select_index(Dimension::Reset, index)?;
        session.mux.trigger(Trigger::ResetSweep)?;
        info!("Reset sweep: {}/16", index.display());
    }
    session.mux.clear()
}
