//! End-to-end run against mock instruments: full 1T continuity + capacitance
//! plans into a temporary output directory, then the summary diff over the
//! produced files.

use array_etest::config::{DelaySettings, Settings};
use array_etest::data::diff::{compare_summaries, DiffReport};
use array_etest::data::report::{self, LedgerRow};
use array_etest::dut::{ArrayKind, DeviceId};
use array_etest::instrument::mux::{MockMuxLink, MuxController};
use array_etest::instrument::visa::{MockVisaResource, MockVisaState};
use array_etest::instrument::{Multimeter, PowerSupply, PsuState};
use array_etest::plans;
use array_etest::routines::capacitance::CapRange;
use array_etest::routines::RunContext;
use array_etest::session::TesterSession;
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

fn mock_session() -> (
    TesterSession,
    Arc<Mutex<Vec<u8>>>,
    Arc<Mutex<MockVisaState>>,
) {
    let link = MockMuxLink::new();
    let bytes = link.log_handle();
    let mux = MuxController::new(Box::new(link), Duration::ZERO);
    let visa = MockVisaResource::new("USB0::0x05E6::0x6500::04611761::INSTR");
    let dmm_state = visa.handle();
    let dmm = Multimeter::open(Box::new(visa), &zero_delays()).unwrap();
    let psu = PowerSupply::open(
        Box::new(MockVisaResource::new("USB0::0x3121::0x0002::583H23104::INSTR")),
        Duration::ZERO,
    )
    .unwrap();
    (
        TesterSession::new(mux, dmm, Some(psu), "array_tester_v1_001__ProbeCard"),
        bytes,
        dmm_state,
    )
}

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.delays = zero_delays();
    settings
}

#[test]
fn full_1t_run_produces_every_artifact() {
    let (mut session, bytes, dmm) = mock_session();
    let settings = test_settings();
    let dut = DeviceId::new("E2408-001-2-E2_T2", None, ArrayKind::SensorArray);
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(dir.path(), &dut, &settings);

    dmm.lock().unwrap().resistance_ohms = 1e9;
    dmm.lock().unwrap().capacitance_farads = 20e-12;

    let mut ledger = LedgerRow {
        timestamp: report::timestamp_display(),
        tester_serial: session.tester_serial.clone(),
        array_serial: dut.full_name(),
        array_type: dut.kind.label().to_string(),
        tft_type: "1T".to_string(),
        ..LedgerRow::default()
    };
    let mut chunks = Vec::new();

    let has_shorts =
        plans::run_continuity_1t(&mut session, &ctx, &mut ledger, &mut chunks).unwrap();
    assert!(!has_shorts);

    // cap sweep: on = 20 pF, off = 20 pF -> delta 0, below the [5, 50] band
    plans::run_cap_1t(
        &mut session,
        &ctx,
        CapRange::OneNf,
        &mut ledger,
        &mut chunks,
    )
    .unwrap();

    // supply is off after the last plan
    assert_eq!(
        session.psu.as_ref().map(PowerSupply::state),
        Some(PsuState::Off)
    );

    // summary + ledger
    let ts = report::timestamp_file();
    let body = report::build_summary(&ledger.timestamp, &dut.full_name(), "1T", &chunks);
    let summary_path = report::write_summary(dir.path(), &ts, &dut.full_name(), &body).unwrap();
    let ledger_path = dir.path().join("results_ledger.csv");
    ledger.append_to(&ledger_path).unwrap();

    // one cell CSV + one grid per continuity sweep (5 sweeps), a node CSV,
    // the cap cell CSV + two grids, the TFT-on cell CSV + grid, the summary,
    // and the ledger
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().any(|n| n.ends_with("_cont_row_to_col.csv")));
    assert!(names.iter().any(|n| n.ends_with("_cont_row_to_col_alt.csv")));
    assert!(names.iter().any(|n| n.ends_with("_cont_row_to_pzbias.csv")));
    assert!(names.iter().any(|n| n.ends_with("_cont_shield_to_pzbias.csv")));
    assert!(names.iter().any(|n| n.ends_with("_cap_col_to_pzbias.csv")));
    assert!(names
        .iter()
        .any(|n| n.ends_with("_cap_col_to_pzbias_alt_delta.csv")));
    assert!(names
        .iter()
        .any(|n| n.ends_with("_cap_col_to_pzbias_alt_on.csv")));
    assert!(names
        .iter()
        .any(|n| n.ends_with("_cont_col_to_pzbias_tfts_on.csv")));
    assert!(names.iter().any(|n| n.ends_with("_summary.txt")));
    assert!(names.iter().any(|n| n == "results_ledger.csv"));

    // the summary carries one chunk per test in plan order
    let summary = std::fs::read_to_string(&summary_path).unwrap();
    assert!(summary.contains("CONT_ROW_TO_COL yielded 0 short(s)"));
    assert!(summary.contains("CONT_SHIELD_TO_PZBIAS is not shorted"));
    assert!(summary.contains("Ran CAP_COL_TO_PZBIAS test w/ 1E-9 F range"));
    assert!(summary.contains("There were 0 col/PZBIAS with TFT's ON short(s)"));

    // ledger row matches the fixed schema
    let ledger_text = std::fs::read_to_string(&ledger_path).unwrap();
    let lines: Vec<&str> = ledger_text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Timestamp,Tester Serial Number,Array Serial Number"));
    assert!(lines[1].contains("array_tester_v1_001__ProbeCard"));
    assert!(lines[1].contains("E2408-001-2-E2_T2"));

    // every mux exchange ended with a trailing clear byte
    let sent = bytes.lock().unwrap();
    assert_eq!(*sent.last().unwrap(), b'Z');
}

#[test]
fn back_to_back_runs_diff_clean_then_flag_a_change() {
    let (mut session, _bytes, dmm) = mock_session();
    let settings = test_settings();
    let dut = DeviceId::new("E2408-001-2-E2_T2", None, ArrayKind::SensorArray);
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(dir.path(), &dut, &settings);

    dmm.lock().unwrap().resistance_ohms = 1e9;

    let mut run = |label: &str| {
        let mut ledger = LedgerRow::default();
        let mut chunks = Vec::new();
        plans::run_continuity_1t(&mut session, &ctx, &mut ledger, &mut chunks).unwrap();
        let body = report::build_summary("2026-08-07 10:00:00", &dut.full_name(), "1T", &chunks);
        report::write_summary(dir.path(), label, &dut.full_name(), &body).unwrap()
    };
    let first = run("2026-08-07_10-00-00");

    // second run: one row-to-col cell shorted (prime + 3rd cell)
    {
        let mut state = dmm.lock().unwrap();
        state.resistance_script.push_back(1e9); // prime
        state.resistance_script.push_back(1e9);
        state.resistance_script.push_back(1e9);
        state.resistance_script.push_back(40.0);
    }
    let second = run("2026-08-07_10-05-00");

    let left = std::fs::read_to_string(&second).unwrap();
    let right = std::fs::read_to_string(&first).unwrap();
    match compare_summaries(&left, &right) {
        DiffReport::Differences(diffs) => {
            assert_eq!(diffs.len(), 1);
            // the row-to-col chunk is the first test chunk
            assert_eq!(diffs[0].index, 0);
            assert!(diffs[0].left[0].contains("CONT_ROW_TO_COL"));
        }
        other => panic!("unexpected report: {:?}", other),
    }

    // identical inputs diff clean
    assert_eq!(compare_summaries(&right, &right), DiffReport::Identical);
}
