//! Continuity sweeps: 2D intersection grids, 1D line-to-node sweeps, single
//! node-to-node checks, and the col-to-PZBIAS sweep with the TFTs driven on.
//!
//! All of them share the same policy: prime the meter into resistance mode,
//! address, query, compare against the short threshold (strictly below means
//! short), one CSV row per measurement, and a final clear byte so the board
//! never stays driven between tests.

use crate::analysis::{is_short, short_map, short_run};
use crate::data::{grid, report};
use crate::error::AppResult;
use crate::protocol::{AddressIndex, Dimension, SecondaryPath, Trigger};
use crate::routines::{NodeOutcome, RunContext, SweepOutcome};
use crate::session::TesterSession;
use log::info;
use std::fs;
use std::io::Write as _;

/// Two-dimensional continuity tests: every intersection of two 16-wide
/// dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridPair {
    RowToCol,
    RstToCol,
}

impl GridPair {
    pub fn path(self) -> SecondaryPath {
        match self {
            Self::RowToCol => SecondaryPath::RowCol,
            Self::RstToCol => SecondaryPath::RstCol,
        }
    }

    pub fn dims(self) -> (Dimension, Dimension) {
        match self {
            Self::RowToCol => (Dimension::Row, Dimension::Column),
            Self::RstToCol => (Dimension::Reset, Dimension::Column),
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::RowToCol => "CONT_ROW_TO_COL",
            Self::RstToCol => "CONT_RST_TO_COL",
        }
    }
}

/// One-dimensional continuity tests: each line of one dimension against a
/// fixed counter-electrode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePair {
    RowToPzbias,
    RowToShield,
    ColToPzbias,
    ColToShield,
    ColToVdd,
    ColToVrst,
    RstToPzbias,
    RstToShield,
}

impl LinePair {
    pub fn path(self) -> SecondaryPath {
        match self {
            Self::RowToPzbias => SecondaryPath::RowPzbias,
            Self::RowToShield => SecondaryPath::RowShield,
            Self::ColToPzbias => SecondaryPath::ColPzbias,
            Self::ColToShield => SecondaryPath::ColShield,
            Self::ColToVdd => SecondaryPath::VddCol,
            Self::ColToVrst => SecondaryPath::VrstCol,
            Self::RstToPzbias => SecondaryPath::RstPzbias,
            Self::RstToShield => SecondaryPath::RstShield,
        }
    }

    pub fn dim(self) -> Dimension {
        match self {
            Self::RowToPzbias | Self::RowToShield => Dimension::Row,
            Self::ColToPzbias | Self::ColToShield | Self::ColToVdd | Self::ColToVrst => {
                Dimension::Column
            }
            Self::RstToPzbias | Self::RstToShield => Dimension::Reset,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::RowToPzbias => "CONT_ROW_TO_PZBIAS",
            Self::RowToShield => "CONT_ROW_TO_SHIELD",
            Self::ColToPzbias => "CONT_COL_TO_PZBIAS",
            Self::ColToShield => "CONT_COL_TO_SHIELD",
            Self::ColToVdd => "CONT_COL_TO_VDD",
            Self::ColToVrst => "CONT_COL_TO_VRST",
            Self::RstToPzbias => "CONT_RST_TO_PZBIAS",
            Self::RstToShield => "CONT_RST_TO_SHIELD",
        }
    }
}

/// Fixed node-to-node continuity checks; no iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePair {
    VddToShield,
    VddToPzbias,
    VrstToShield,
    VrstToPzbias,
    ShieldToPzbias,
}

impl NodePair {
    pub fn path(self) -> SecondaryPath {
        match self {
            Self::VddToShield => SecondaryPath::VddShield,
            Self::VddToPzbias => SecondaryPath::VddPzbias,
            Self::VrstToShield => SecondaryPath::VrstShield,
            Self::VrstToPzbias => SecondaryPath::VrstPzbias,
            Self::ShieldToPzbias => SecondaryPath::ShieldPzbias,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::VddToShield => "CONT_VDD_TO_SHIELD",
            Self::VddToPzbias => "CONT_VDD_TO_PZBIAS",
            Self::VrstToShield => "CONT_VRST_TO_SHIELD",
            Self::VrstToPzbias => "CONT_VRST_TO_PZBIAS",
            Self::ShieldToPzbias => "CONT_SHIELD_TO_PZBIAS",
        }
    }
}

/// Nested 16x16 sweep over both dimensions of `pair`, row-major ascending.
pub fn sweep_grid(
    session: &mut TesterSession,
    ctx: &RunContext<'_>,
    pair: GridPair,
) -> AppResult<SweepOutcome> {
    let title = pair.title();
    let (dim1, dim2) = pair.dims();
    let threshold = ctx.settings.thresholds.res_short_ohms;
    let ts = report::timestamp_file();
    let dut_name = ctx.dut.full_name();

    session.dmm.prime_resistance()?;
    info!("Sensor {} Detection Running...", title);

    let csv_path = report::output_file(
        ctx.out_dir,
        &ts,
        &dut_name,
        &title.to_lowercase(),
        ".csv",
    );
    let h1 = format!("{} Index", dim1.label());
    let h2 = format!("{} Index", dim2.label());
    let h3 = format!("{} Res. to {} (ohm)", dim1.label(), dim2.label());
    let mut writer = report::cell_writer(&csv_path, &[h1.as_str(), h2.as_str(), h3.as_str()])?;

    let mut values: Vec<Vec<f64>> = Vec::with_capacity(16);
    let mut shorts = 0u32;
    for i in AddressIndex::all() {
        crate::session::check_abort()?;
        let mut row = Vec::with_capacity(16);
        for j in AddressIndex::all() {
            session
                .mux
                .address(pair.path(), &[(dim1, i), (dim2, j)], Trigger::Continuity)?;
            let ohms = session.dmm.resistance()?;
            if is_short(ohms, threshold) {
                shorts += 1;
            }
            writer.write_record(&[
                i.display().to_string(),
                j.display().to_string(),
                ohms.to_string(),
            ])?;
            row.push(ohms);
        }
        values.push(row);
        info!("{}: {} {}/16", title, dim1.label(), i.display());
    }
    writer.flush()?;
    session.mux.clear()?;

    let grid_path = report::output_file(
        ctx.out_dir,
        &ts,
        &dut_name,
        &title.to_lowercase(),
        "_alt.csv",
    );
    grid::write_grid(
        &grid_path,
        "Resistance (ohm)",
        dim1.label(),
        dim2.label(),
        &values,
    )?;

    let mut summary = format!(
        "Sensor {} Detection Running...\n{} yielded {} short(s)",
        title, title, shorts
    );
    if shorts > 0 {
        summary.push('\n');
        summary.push_str(short_map(&values, threshold).trim_end());
    }
    info!("{} yielded {} short(s)", title, shorts);
    Ok(SweepOutcome { shorts, summary })
}

/// Single ascending sweep of one dimension against a fixed node.
pub fn sweep_line(
    session: &mut TesterSession,
    ctx: &RunContext<'_>,
    pair: LinePair,
) -> AppResult<SweepOutcome> {
    let title = pair.title();
    let dim = pair.dim();
    let threshold = ctx.settings.thresholds.res_short_ohms;
    let ts = report::timestamp_file();
    let dut_name = ctx.dut.full_name();

    session.dmm.prime_resistance()?;
    info!("Sensor {} Detection Running...", title);

    let csv_path = report::output_file(
        ctx.out_dir,
        &ts,
        &dut_name,
        &title.to_lowercase(),
        ".csv",
    );
    let h1 = format!("{} Index", dim.label());
    let h2 = format!("{} (ohm)", title);
    let mut writer = report::cell_writer(&csv_path, &[h1.as_str(), h2.as_str()])?;

    let mut values = Vec::with_capacity(16);
    let mut shorts = 0u32;
    for index in AddressIndex::all() {
        crate::session::check_abort()?;
        session
            .mux
            .address(pair.path(), &[(dim, index)], Trigger::Continuity)?;
        let ohms = session.dmm.resistance()?;
        if is_short(ohms, threshold) {
            shorts += 1;
        }
        writer.write_record(&[index.display().to_string(), ohms.to_string()])?;
        values.push(ohms);
    }
    writer.flush()?;
    session.mux.clear()?;

    let mut summary = format!(
        "Sensor {} Detection Running...\n{} yielded {} short(s)",
        title, title, shorts
    );
    if shorts > 0 {
        summary.push('\n');
        summary.push_str(&short_run(&values, threshold));
    }
    info!("{} yielded {} short(s)", title, shorts);
    Ok(SweepOutcome { shorts, summary })
}

/// One measurement between two fixed nodes.
pub fn check_node(
    session: &mut TesterSession,
    ctx: &RunContext<'_>,
    pair: NodePair,
) -> AppResult<NodeOutcome> {
    let title = pair.title();
    let threshold = ctx.settings.thresholds.res_short_ohms;
    let ts = report::timestamp_file();
    let dut_name = ctx.dut.full_name();
    info!("Sensor {} Detection Running...", title);

    session.mux.address(pair.path(), &[], Trigger::Continuity)?;
    let ohms = session.dmm.resistance()?;
    session.mux.clear()?;

    let csv_path = report::output_file(
        ctx.out_dir,
        &ts,
        &dut_name,
        &title.to_lowercase(),
        ".csv",
    );
    let mut file = fs::File::create(&csv_path)?;
    writeln!(file, "{} (ohms)", title.to_lowercase())?;
    write!(file, "{}", ohms)?;

    let shorted = is_short(ohms, threshold);
    let verdict = if shorted { "shorted" } else { "not shorted" };
    let summary = format!(
        "Sensor {} Detection Running...\n{} ohms\n{} is {}",
        title,
        report::format_with_commas(ohms),
        title,
        verdict
    );
    info!("{} is {}", title, verdict);
    Ok(NodeOutcome {
        ohms,
        shorted,
        summary,
    })
}

/// Col-to-PZBIAS resistance over the full grid with the addressed row TFTs
/// driven on (capacitance-check mode instead of the continuity trigger).
pub fn sweep_col_to_pzbias_tfts_on(
    session: &mut TesterSession,
    ctx: &RunContext<'_>,
) -> AppResult<SweepOutcome> {
    let test_name = "cont_col_to_pzbias_tfts_on";
    let threshold = ctx.settings.thresholds.res_short_ohms;
    let ts = report::timestamp_file();
    let dut_name = ctx.dut.full_name();

    session.dmm.prime_resistance()?;
    info!("Sensor Col to PZBIAS Continuity Detection with TFT's ON Running...");

    let csv_path = report::output_file(ctx.out_dir, &ts, &dut_name, test_name, ".csv");
    let mut writer = report::cell_writer(
        &csv_path,
        &[
            "Row Index",
            "Column Index",
            "Col. Res. to PZBIAS w/ TFTs ON (ohm)",
        ],
    )?;

    let mut values: Vec<Vec<f64>> = Vec::with_capacity(16);
    let mut shorts = 0u32;
    for row in AddressIndex::all() {
        crate::session::check_abort()?;
        let mut row_vals = Vec::with_capacity(16);
        for col in AddressIndex::all() {
            session.mux.address(
                SecondaryPath::ColPzbias,
                &[(Dimension::Row, row), (Dimension::Column, col)],
                Trigger::CapTftOn,
            )?;
            let ohms = session.dmm.resistance()?;
            if is_short(ohms, threshold) {
                shorts += 1;
            }
            writer.write_record(&[
                row.display().to_string(),
                col.display().to_string(),
                ohms.to_string(),
            ])?;
            row_vals.push(ohms);
        }
        values.push(row_vals);
        info!("TFT ON sweep: Row {}/16", row.display());
    }
    writer.flush()?;
    session.mux.clear()?;

    let grid_path = report::output_file(ctx.out_dir, &ts, &dut_name, test_name, "_alt.csv");
    grid::write_grid(&grid_path, "Resistance (ohm)", "R", "C", &values)?;

    let mut summary = format!(
        "Sensor Col to PZBIAS Continuity Detection with TFT's ON Running...\n\
         There were {} col/PZBIAS with TFT's ON short(s)",
        shorts
    );
    if shorts > 0 {
        summary.push('\n');
        summary.push_str(short_map(&values, threshold).trim_end());
    }
    info!("There were {} col/PZBIAS with TFT's ON short(s)", shorts);
    Ok(SweepOutcome { shorts, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DelaySettings, Settings};
    use crate::dut::{ArrayKind, DeviceId};
    use crate::instrument::mux::{MockMuxLink, MuxController};
    use crate::instrument::visa::{MockVisaResource, MockVisaState};
    use crate::instrument::{Multimeter, PowerSupply};
    use crate::session::TesterSession;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn zero_delays() -> DelaySettings {
        DelaySettings {
            serial_settle: Duration::ZERO,
            serial_settle_cap: Duration::ZERO,
            dmm_settle: Duration::ZERO,
            dmm_settle_cap: Duration::ZERO,
            psu_settle: Duration::ZERO,
        }
    }

    fn test_settings() -> Settings {
        let mut settings = Settings::default();
        settings.delays = zero_delays();
        settings
    }

    fn mock_session() -> (
        TesterSession,
        Arc<Mutex<Vec<u8>>>,
        Arc<Mutex<MockVisaState>>,
    ) {
        let link = MockMuxLink::new();
        let bytes = link.log_handle();
        let mux = MuxController::new(Box::new(link), Duration::ZERO);
        let visa = MockVisaResource::new("USB0::DMM::INSTR");
        let dmm_state = visa.handle();
        let dmm = Multimeter::open(Box::new(visa), &zero_delays()).unwrap();
        let psu = PowerSupply::open(
            Box::new(MockVisaResource::new("USB0::PSU::INSTR")),
            Duration::ZERO,
        )
        .unwrap();
        (
            TesterSession::new(mux, dmm, Some(psu), "bench__probecard"),
            bytes,
            dmm_state,
        )
    }

    #[test]
    fn grid_sweep_visits_all_256_cells_in_row_major_order() {
        let (mut session, bytes, _dmm) = mock_session();
        let settings = test_settings();
        let dut = DeviceId::new("E2408-001-2-E2_T2", None, ArrayKind::SensorArray);
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path(), &dut, &settings);

        let outcome = sweep_grid(&mut session, &ctx, GridPair::RowToCol).unwrap();
        assert_eq!(outcome.shorts, 0);

        let sent = bytes.lock().unwrap();
        // 256 cells x 7 bytes per addressing sequence, plus the final clear
        assert_eq!(sent.len(), 256 * 7 + 1);
        assert_eq!(*sent.last().unwrap(), b'Z');

        // collect the (row, col) payloads in transmit order
        let mut visited = Vec::new();
        for cell in sent.chunks_exact(7).take(256) {
            assert_eq!(&cell[..3], &[b'Z', b'U', b'R']);
            assert_eq!(cell[4], b'L');
            assert_eq!(cell[6], b'O');
            let row = (cell[3] as char).to_digit(16).unwrap();
            let col = (cell[5] as char).to_digit(16).unwrap();
            visited.push((row, col));
        }
        let mut expected = Vec::new();
        for row in 0..16 {
            for col in 0..16 {
                expected.push((row, col));
            }
        }
        assert_eq!(visited, expected);
    }

    #[test]
    fn grid_sweep_counts_shorts_and_renders_the_map() {
        let (mut session, _bytes, dmm) = mock_session();
        let settings = test_settings();
        let dut = DeviceId::new("E2408-001-2-E2_T2", None, ArrayKind::SensorArray);
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path(), &dut, &settings);

        {
            let mut state = dmm.lock().unwrap();
            state.resistance_ohms = 1e9;
            // first scripted value feeds the prime query, second the first cell
            state.resistance_script.push_back(1e9);
            state.resistance_script.push_back(50.0);
        }
        let outcome = sweep_grid(&mut session, &ctx, GridPair::RowToCol).unwrap();
        assert_eq!(outcome.shorts, 1);
        assert!(outcome.summary.contains("yielded 1 short(s)"));
        // map starts with the shorted first cell
        assert!(outcome.summary.contains("\nX"));
    }

    #[test]
    fn line_sweep_visits_16_indices_ascending() {
        let (mut session, bytes, _dmm) = mock_session();
        let settings = test_settings();
        let dut = DeviceId::new("E2408-001-2-E2_T2", None, ArrayKind::SensorArray);
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path(), &dut, &settings);

        let outcome = sweep_line(&mut session, &ctx, LinePair::ColToPzbias).unwrap();
        assert_eq!(outcome.shorts, 0);

        let sent = bytes.lock().unwrap();
        // 16 indices x 5 bytes per sequence, plus the final clear
        assert_eq!(sent.len(), 16 * 5 + 1);
        let mut indices = Vec::new();
        for cell in sent.chunks_exact(5).take(16) {
            assert_eq!(&cell[..2], &[b'Z', b'W']);
            assert_eq!(cell[2], b'L');
            assert_eq!(cell[4], b'O');
            indices.push((cell[3] as char).to_digit(16).unwrap());
        }
        let expected: Vec<u32> = (0..16).collect();
        assert_eq!(indices, expected);
    }

    #[test]
    fn node_check_classifies_against_the_threshold() {
        let (mut session, bytes, dmm) = mock_session();
        let settings = test_settings();
        let dut = DeviceId::new("E2408-001-2-E2_T2", None, ArrayKind::SensorArray);
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path(), &dut, &settings);

        dmm.lock().unwrap().resistance_ohms = 1e9;
        let open = check_node(&mut session, &ctx, NodePair::ShieldToPzbias).unwrap();
        assert!(!open.shorted);
        assert!(open.summary.contains("is not shorted"));

        dmm.lock().unwrap().resistance_ohms = 10.0;
        let shorted = check_node(&mut session, &ctx, NodePair::ShieldToPzbias).unwrap();
        assert!(shorted.shorted);
        assert!(shorted.summary.ends_with("is shorted"));

        let sent = bytes.lock().unwrap();
        // two checks, each Z-path-O then a trailing clear
        assert_eq!(*sent, vec![b'Z', b'(', b'O', b'Z', b'Z', b'(', b'O', b'Z']);
    }

    #[test]
    fn tft_on_sweep_uses_the_cap_check_trigger() {
        let (mut session, bytes, _dmm) = mock_session();
        let settings = test_settings();
        let dut = DeviceId::new("E2408-001-2-E2_T2", None, ArrayKind::SensorArray);
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path(), &dut, &settings);

        let outcome = sweep_col_to_pzbias_tfts_on(&mut session, &ctx).unwrap();
        assert_eq!(outcome.shorts, 0);

        let sent = bytes.lock().unwrap();
        assert_eq!(sent.len(), 256 * 7 + 1);
        let first = &sent[..7];
        assert_eq!(first, &[b'Z', b'W', b'R', b'0', b'L', b'0', b'P']);
    }

    #[test]
    fn sweep_writes_cell_and_grid_csvs() {
        let (mut session, _bytes, _dmm) = mock_session();
        let settings = test_settings();
        let dut = DeviceId::new("E2408-001-2-E2_T2", None, ArrayKind::SensorArray);
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path(), &dut, &settings);

        sweep_grid(&mut session, &ctx, GridPair::RstToCol).unwrap();
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("_cont_rst_to_col.csv"));
        assert!(names[1].ends_with("_cont_rst_to_col_alt.csv"));

        let cells = std::fs::read_to_string(dir.path().join(&names[0])).unwrap();
        let lines: Vec<&str> = cells.lines().collect();
        assert_eq!(lines.len(), 257);
        assert_eq!(lines[0], "Rst Index,Col Index,Rst Res. to Col (ohm)");
        assert!(lines[1].starts_with("1,1,"));
        assert!(lines[256].starts_with("16,16,"));
    }
}
