//! Test plans: the fixed sequences of routines run for 1T and 3T arrays.
//!
//! Each plan powers the supply on, runs its panel in a fixed order, fills
//! the matching ledger columns, appends one summary chunk per test, and
//! powers the supply back off. Tests that were not run leave their ledger
//! columns blank.

use crate::analysis::{capacitance_verdict, continuity_verdict};
use crate::data::report::LedgerRow;
use crate::error::AppResult;
use crate::routines::capacitance::{sweep_delta, CapPair, CapRange};
use crate::routines::continuity::{
    check_node, sweep_col_to_pzbias_tfts_on, sweep_grid, sweep_line, GridPair, LinePair, NodePair,
};
use crate::routines::RunContext;
use crate::session::TesterSession;
use log::info;

/// Full 1T continuity panel. Returns true when any test found a short.
pub fn run_continuity_1t(
    session: &mut TesterSession,
    ctx: &RunContext<'_>,
    ledger: &mut LedgerRow,
    chunks: &mut Vec<String>,
) -> AppResult<bool> {
    session.power_on()?;
    info!("Running 1T continuity panel...");

    let row_to_col = sweep_grid(session, ctx, GridPair::RowToCol)?;
    let row_to_pzbias = sweep_line(session, ctx, LinePair::RowToPzbias)?;
    let row_to_shield = sweep_line(session, ctx, LinePair::RowToShield)?;
    let col_to_pzbias = sweep_line(session, ctx, LinePair::ColToPzbias)?;
    let col_to_shield = sweep_line(session, ctx, LinePair::ColToShield)?;
    let shield_to_pzbias = check_node(session, ctx, NodePair::ShieldToPzbias)?;

    ledger.row_to_col_shorts = Some(row_to_col.shorts.to_string());
    ledger.row_to_pzbias_shorts = Some(row_to_pzbias.shorts.to_string());
    ledger.row_to_shield_shorts = Some(row_to_shield.shorts.to_string());
    ledger.col_to_pzbias_shorts = Some(col_to_pzbias.shorts.to_string());
    ledger.col_to_shield_shorts = Some(col_to_shield.shorts.to_string());
    ledger.shield_to_pzbias_ohm = Some(shield_to_pzbias.ohms.to_string());

    let has_shorts = row_to_col.shorts > 0
        || row_to_pzbias.shorts > 0
        || row_to_shield.shorts > 0
        || col_to_pzbias.shorts > 0
        || col_to_shield.shorts > 0
        || shield_to_pzbias.shorted;

    chunks.push(row_to_col.summary);
    chunks.push(row_to_pzbias.summary);
    chunks.push(row_to_shield.summary);
    chunks.push(col_to_pzbias.summary);
    chunks.push(col_to_shield.summary);
    chunks.push(shield_to_pzbias.summary);

    let total_shorts = row_to_col.shorts
        + row_to_pzbias.shorts
        + row_to_shield.shorts
        + col_to_pzbias.shorts
        + col_to_shield.shorts;
    info!(
        "1T continuity panel: {}",
        continuity_verdict(total_shorts, 0)
    );

    session.power_off()?;
    Ok(has_shorts)
}

/// Full 3T continuity panel, including the reset-line and bias-rail checks.
pub fn run_continuity_3t(
    session: &mut TesterSession,
    ctx: &RunContext<'_>,
    ledger: &mut LedgerRow,
    chunks: &mut Vec<String>,
) -> AppResult<bool> {
    session.power_on()?;
    info!("Running 3T continuity panel...");

    let row_to_col = sweep_grid(session, ctx, GridPair::RowToCol)?;
    let row_to_pzbias = sweep_line(session, ctx, LinePair::RowToPzbias)?;
    let row_to_shield = sweep_line(session, ctx, LinePair::RowToShield)?;
    let col_to_pzbias = sweep_line(session, ctx, LinePair::ColToPzbias)?;
    let col_to_shield = sweep_line(session, ctx, LinePair::ColToShield)?;
    let col_to_vdd = sweep_line(session, ctx, LinePair::ColToVdd)?;
    let col_to_vrst = sweep_line(session, ctx, LinePair::ColToVrst)?;
    let rst_to_col = sweep_grid(session, ctx, GridPair::RstToCol)?;
    let rst_to_shield = sweep_line(session, ctx, LinePair::RstToShield)?;
    let rst_to_pzbias = sweep_line(session, ctx, LinePair::RstToPzbias)?;
    let vdd_to_shield = check_node(session, ctx, NodePair::VddToShield)?;
    let vdd_to_pzbias = check_node(session, ctx, NodePair::VddToPzbias)?;
    let vrst_to_shield = check_node(session, ctx, NodePair::VrstToShield)?;
    let vrst_to_pzbias = check_node(session, ctx, NodePair::VrstToPzbias)?;
    let shield_to_pzbias = check_node(session, ctx, NodePair::ShieldToPzbias)?;

    ledger.row_to_col_shorts = Some(row_to_col.shorts.to_string());
    ledger.row_to_pzbias_shorts = Some(row_to_pzbias.shorts.to_string());
    ledger.row_to_shield_shorts = Some(row_to_shield.shorts.to_string());
    ledger.col_to_pzbias_shorts = Some(col_to_pzbias.shorts.to_string());
    ledger.col_to_shield_shorts = Some(col_to_shield.shorts.to_string());
    ledger.col_to_vdd_shorts = Some(col_to_vdd.shorts.to_string());
    ledger.col_to_vrst_shorts = Some(col_to_vrst.shorts.to_string());
    ledger.rst_to_col_shorts = Some(rst_to_col.shorts.to_string());
    ledger.rst_to_shield_shorts = Some(rst_to_shield.shorts.to_string());
    ledger.rst_to_pzbias_shorts = Some(rst_to_pzbias.shorts.to_string());
    ledger.vdd_to_shield_ohm = Some(vdd_to_shield.ohms.to_string());
    ledger.vdd_to_pzbias_ohm = Some(vdd_to_pzbias.ohms.to_string());
    ledger.vrst_to_shield_ohm = Some(vrst_to_shield.ohms.to_string());
    ledger.vrst_to_pzbias_ohm = Some(vrst_to_pzbias.ohms.to_string());
    ledger.shield_to_pzbias_ohm = Some(shield_to_pzbias.ohms.to_string());

    let sweeps = [
        &row_to_col,
        &row_to_pzbias,
        &row_to_shield,
        &col_to_pzbias,
        &col_to_shield,
        &col_to_vdd,
        &col_to_vrst,
        &rst_to_col,
        &rst_to_shield,
        &rst_to_pzbias,
    ];
    let has_shorts = sweeps.iter().any(|s| s.shorts > 0)
        || vdd_to_shield.shorted
        || vdd_to_pzbias.shorted
        || vrst_to_shield.shorted
        || vrst_to_pzbias.shorted
        || shield_to_pzbias.shorted;

    let total_shorts: u32 = sweeps.iter().map(|s| s.shorts).sum();
    for sweep in sweeps {
        chunks.push(sweep.summary.clone());
    }
    chunks.push(vdd_to_shield.summary);
    chunks.push(vdd_to_pzbias.summary);
    chunks.push(vrst_to_shield.summary);
    chunks.push(vrst_to_pzbias.summary);
    chunks.push(shield_to_pzbias.summary);

    info!(
        "3T continuity panel: {}",
        continuity_verdict(total_shorts, 0)
    );

    session.power_off()?;
    Ok(has_shorts)
}

/// Capacitance panel for 1T arrays: the delta sweep plus the TFT-on
/// continuity sweep.
pub fn run_cap_1t(
    session: &mut TesterSession,
    ctx: &RunContext<'_>,
    range: CapRange,
    ledger: &mut LedgerRow,
    chunks: &mut Vec<String>,
) -> AppResult<()> {
    session.power_on()?;
    info!("Running cap and TFT ON continuity tests...");

    let cap = sweep_delta(session, ctx, CapPair::ColToPzbias, range)?;
    let tfts_on = sweep_col_to_pzbias_tfts_on(session, ctx)?;

    ledger.cap_col_to_pzbias_pass = Some(cap.tally.within.to_string());
    ledger.col_to_pzbias_tfts_on_shorts = Some(tfts_on.shorts.to_string());

    info!(
        "Cap test: {} ({} of {} cells in band)",
        capacitance_verdict(
            cap.tally.within,
            ctx.settings.thresholds.min_cap_pass_count
        ),
        cap.tally.within,
        cap.tally.total()
    );

    chunks.push(cap.summary);
    chunks.push(tfts_on.summary);

    session.power_off()?;
    Ok(())
}
