//! Delta-capacitance sweep.
//!
//! Each cell is measured twice: once with the addressed row forced off
//! (trigger `I`, all TFTs at -8V) and once in capacitance-check mode
//! (trigger `P`, addressed row at +15V). The calibrated value is
//! `on - off`, which isolates the TFT-gated sensor capacitance from the
//! parasitics common to both readings. Cells are classified against the
//! device's pF band; a single anomalous reading simply lands in whichever
//! bucket it falls into, there is no retry.

use crate::analysis::CapBand;
use crate::data::{grid, report};
use crate::error::AppResult;
use crate::instrument::multimeter::{CAP_RANGE_DEFAULT, CAP_RANGE_WIDE};
use crate::protocol::{AddressIndex, Dimension, SecondaryPath, Trigger};
use crate::routines::{CapOutcome, RunContext};
use crate::session::TesterSession;
use log::info;

/// Two-dimensional capacitance tests: column against a fixed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapPair {
    ColToPzbias,
    ColToShield,
}

impl CapPair {
    pub fn path(self) -> SecondaryPath {
        match self {
            Self::ColToPzbias => SecondaryPath::ColPzbias,
            Self::ColToShield => SecondaryPath::ColShield,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::ColToPzbias => "CAP_COL_TO_PZBIAS",
            Self::ColToShield => "CAP_COL_TO_SHIELD",
        }
    }
}

/// Multimeter capacitance range for the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapRange {
    /// 1 nF, the default.
    OneNf,
    /// 10 nF, for high-capacitance sensors.
    TenNf,
}

impl CapRange {
    pub fn scpi(self) -> &'static str {
        match self {
            Self::OneNf => CAP_RANGE_DEFAULT,
            Self::TenNf => CAP_RANGE_WIDE,
        }
    }
}

/// Run the 16x16 delta sweep. Every cell is visited exactly once in
/// row-major ascending order.
pub fn sweep_delta(
    session: &mut TesterSession,
    ctx: &RunContext<'_>,
    pair: CapPair,
    range: CapRange,
) -> AppResult<CapOutcome> {
    // Capacitance needs the longer settle after every mux byte.
    let old_settle = session
        .mux
        .set_settle(ctx.settings.delays.serial_settle_cap);
    let result = run_sweep(session, ctx, pair, range);
    session.mux.set_settle(old_settle);
    result
}

fn run_sweep(
    session: &mut TesterSession,
    ctx: &RunContext<'_>,
    pair: CapPair,
    range: CapRange,
) -> AppResult<CapOutcome> {
    let title = pair.title();
    let band = CapBand::for_device(ctx.dut, &ctx.settings.thresholds);
    let ts = report::timestamp_file();
    let dut_name = ctx.dut.full_name();

    session.dmm.set_capacitance_range(range.scpi())?;
    session.dmm.prime_capacitance()?;
    info!("Sensor {} Check Running...", title);

    let csv_path = report::output_file(
        ctx.out_dir,
        &ts,
        &dut_name,
        &title.to_lowercase(),
        ".csv",
    );
    let mut writer = report::cell_writer(
        &csv_path,
        &[
            "Row Index",
            "Column Index",
            "Cap Off Measurement (F)",
            "Cap On Measurement (F)",
            "Calibrated Measurement (F)",
        ],
    )?;

    let mut delta_pf: Vec<Vec<f64>> = Vec::with_capacity(16);
    let mut on_pf: Vec<Vec<f64>> = Vec::with_capacity(16);
    let mut tally = crate::analysis::CapTally::default();

    for row in AddressIndex::all() {
        crate::session::check_abort()?;
        let mut delta_row = Vec::with_capacity(16);
        let mut on_row = Vec::with_capacity(16);
        for col in AddressIndex::all() {
            let dims = [(Dimension::Row, row), (Dimension::Column, col)];

            session.mux.address(pair.path(), &dims, Trigger::TftOff)?;
            let off = session.dmm.capacitance()?;

            session.mux.address(pair.path(), &dims, Trigger::CapTftOn)?;
            let on = session.dmm.capacitance()?;

            let calibrated = on - off;
            tally.record(band.classify(calibrated * 1e12));
            delta_row.push(calibrated * 1e12);
            on_row.push(on * 1e12);
            writer.write_record(&[
                row.display().to_string(),
                col.display().to_string(),
                off.to_string(),
                on.to_string(),
                calibrated.to_string(),
            ])?;
        }
        delta_pf.push(delta_row);
        on_pf.push(on_row);
        info!("{}: Row {}/16", title, row.display());
    }
    writer.flush()?;
    session.mux.clear()?;

    grid::write_grid(
        &report::output_file(
            ctx.out_dir,
            &ts,
            &dut_name,
            &title.to_lowercase(),
            "_alt_delta.csv",
        ),
        "Cap TFT On - Cap TFT Off (pF)",
        "R",
        "C",
        &delta_pf,
    )?;
    grid::write_grid(
        &report::output_file(
            ctx.out_dir,
            &ts,
            &dut_name,
            &title.to_lowercase(),
            "_alt_on.csv",
        ),
        "Cap TFT On (pF)",
        "R",
        "C",
        &on_pf,
    )?;

    let summary = format!(
        "Ran {} test w/ {} F range\n\
         No. of sensors inside bounds: {}\n\
         No. of sensors below lower threshold of {}pF: {}\n\
         No. of sensors above upper threshold of {}pF: {}",
        title, range.scpi(), tally.within, band.low_pf, tally.below, band.high_pf, tally.above
    );
    info!(
        "{}: {} within, {} below, {} above",
        title, tally.within, tally.below, tally.above
    );
    Ok(CapOutcome { tally, summary })
}
