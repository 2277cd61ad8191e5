//! Loopback checks.
//!
//! Two dedicated loopback traces verify that the probe card or flex fixture
//! actually makes contact before a full-array test is worth running. The
//! interactive alignment check polls both traces and gives the operator a
//! distinct cue per contact state until the connection holds; the spot
//! checks take a single reading each for flex-bonded modules.

use crate::analysis::is_short;
use crate::data::report;
use crate::error::AppResult;
use crate::instrument::multimeter::{RES_RANGE_DEFAULT, RES_RANGE_LOOPBACK};
use crate::protocol::SecondaryPath;
use crate::session::TesterSession;
use log::{debug, info};
use std::path::Path;
use std::time::Duration;

/// Which loopback trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopbackLine {
    One,
    Two,
}

impl LoopbackLine {
    pub fn path(self) -> SecondaryPath {
        match self {
            Self::One => SecondaryPath::LoopbackOne,
            Self::Two => SecondaryPath::LoopbackTwo,
        }
    }

    pub fn word(self) -> &'static str {
        match self {
            Self::One => "One",
            Self::Two => "Two",
        }
    }
}

/// Contact state of the two loopbacks during one alignment poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactState {
    Both,
    OneOnly,
    TwoOnly,
    Neither,
}

pub fn classify_contact(loop1_ohms: f64, loop2_ohms: f64, threshold_ohms: f64) -> ContactState {
    match (
        is_short(loop1_ohms, threshold_ohms),
        is_short(loop2_ohms, threshold_ohms),
    ) {
        (true, true) => ContactState::Both,
        (true, false) => ContactState::OneOnly,
        (false, true) => ContactState::TwoOnly,
        (false, false) => ContactState::Neither,
    }
}

/// Operator feedback during alignment. The console implementation prints a
/// status line and rings the terminal bell in a distinct pattern per state.
pub trait CueSink {
    fn status(&mut self, loop1_ohms: f64, loop2_ohms: f64);
    fn cue(&mut self, state: ContactState);
}

/// Console cues: one bell for a single loopback, two for both.
#[derive(Default)]
pub struct ConsoleCue {
    pub silent: bool,
}

impl CueSink for ConsoleCue {
    fn status(&mut self, loop1_ohms: f64, loop2_ohms: f64) {
        use std::io::Write;
        print!("\rLOOP1 OHM {:.4e} LOOP2 OHM {:.4e}", loop1_ohms, loop2_ohms);
        let _ = std::io::stdout().flush();
    }

    fn cue(&mut self, state: ContactState) {
        if self.silent {
            return;
        }
        match state {
            ContactState::Both => print!("\x07\x07 BOTH"),
            ContactState::OneOnly => print!("\x07 LOOP1"),
            ContactState::TwoOnly => print!("\x07 LOOP2"),
            ContactState::Neither => {}
        }
    }
}

/// Abort source for the alignment loop.
pub trait AbortPoll {
    fn should_abort(&mut self) -> AppResult<bool>;
}

/// Abort on a `q` keypress without blocking the poll loop.
pub struct KeyAbort;

impl AbortPoll for KeyAbort {
    fn should_abort(&mut self) -> AppResult<bool> {
        while crossterm::event::poll(Duration::from_millis(0))? {
            if let crossterm::event::Event::Key(key) = crossterm::event::read()? {
                if matches!(
                    key.code,
                    crossterm::event::KeyCode::Char('q') | crossterm::event::KeyCode::Char('Q')
                ) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// Never aborts; used by unattended runs and tests.
pub struct NeverAbort;

impl AbortPoll for NeverAbort {
    fn should_abort(&mut self) -> AppResult<bool> {
        Ok(false)
    }
}

/// Tuning for the alignment loop.
pub struct AlignmentOptions {
    /// Consecutive both-shorted polls required to declare the fixture seated.
    pub required_counts: u32,
    /// Hold time after a both-shorted cue.
    pub both_hold: Duration,
    /// Hold time after a single-loopback cue.
    pub single_hold: Duration,
}

impl Default for AlignmentOptions {
    fn default() -> Self {
        Self {
            required_counts: 10,
            both_hold: Duration::from_millis(500),
            single_hold: Duration::from_millis(250),
        }
    }
}

/// Interactive alignment check: poll both loopbacks with the meter in the
/// 10 kOhm range and cue the operator until the contact holds for
/// `required_counts` consecutive polls (a miss resets the run) or the
/// operator aborts. Returns the last (loop1, loop2) readings with the
/// default range restored.
pub fn alignment_check(
    session: &mut TesterSession,
    cues: &mut dyn CueSink,
    abort: &mut dyn AbortPoll,
    options: &AlignmentOptions,
    threshold_ohms: f64,
) -> AppResult<(f64, f64)> {
    session.dmm.set_resistance_range(RES_RANGE_LOOPBACK)?;
    let mut consecutive = 0u32;
    loop {
        crate::session::check_abort()?;
        session.mux.select_path(SecondaryPath::LoopbackOne)?;
        let loop1 = session.dmm.resistance()?;
        session.mux.select_path(SecondaryPath::LoopbackTwo)?;
        let loop2 = session.dmm.resistance()?;
        cues.status(loop1, loop2);

        let state = classify_contact(loop1, loop2, threshold_ohms);
        match state {
            ContactState::Both => {
                cues.cue(state);
                hold(options.both_hold);
                consecutive += 1;
            }
            ContactState::OneOnly | ContactState::TwoOnly => {
                cues.cue(state);
                hold(options.single_hold);
                consecutive = 0;
            }
            ContactState::Neither => {
                consecutive = 0;
            }
        }
        debug!(
            "loopback poll: {:.4e} / {:.4e}, {} consecutive",
            loop1, loop2, consecutive
        );

        if consecutive >= options.required_counts || abort.should_abort()? {
            session.dmm.set_resistance_range(RES_RANGE_DEFAULT)?;
            info!("Loopback check done: {:.4e} / {:.4e} ohm", loop1, loop2);
            return Ok((loop1, loop2));
        }
    }
}

fn hold(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

/// Single loopback spot check for flex-bonded modules: one reading in the
/// 10 kOhm range, default range restored afterwards.
pub fn spot_check(
    session: &mut TesterSession,
    line: LoopbackLine,
    threshold_ohms: f64,
) -> AppResult<(f64, String)> {
    session.dmm.set_resistance_range(RES_RANGE_LOOPBACK)?;
    session.mux.clear()?;
    session.mux.select_path(line.path())?;
    let ohms = session.dmm.resistance()?;
    session.mux.clear()?;
    session.dmm.set_resistance_range(RES_RANGE_DEFAULT)?;

    let verdict = if is_short(ohms, threshold_ohms) {
        format!("Loopback {} measures resistance!", line.word().to_lowercase())
    } else {
        format!("Loopback {} is OPEN!", line.word().to_lowercase())
    };
    let summary = format!(
        "Sensor Loopback {} Continuity Detection Running...\n{} ohms\n{}",
        line.word(),
        report::format_with_commas(ohms),
        verdict
    );
    info!("Loopback {}: {} ohm", line.word(), ohms);
    Ok((ohms, summary))
}

/// Write the per-run loopback CSV.
pub fn write_loopback_csv(
    dir: &Path,
    ts: &str,
    dut_name: &str,
    loop1_ohms: f64,
    loop2_ohms: f64,
) -> AppResult<()> {
    let path = report::output_file(dir, ts, dut_name, "loopback_measurements", ".csv");
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["Loopback 1 res. (ohm)", "Loopback 2 res. (ohm)"])?;
    writer.write_record(&[loop1_ohms.to_string(), loop2_ohms.to_string()])?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelaySettings;
    use crate::instrument::mux::{MockMuxLink, MuxController};
    use crate::instrument::visa::MockVisaResource;
    use crate::instrument::Multimeter;

    struct RecordingCue {
        cues: Vec<ContactState>,
    }

    impl CueSink for RecordingCue {
        fn status(&mut self, _loop1: f64, _loop2: f64) {}
        fn cue(&mut self, state: ContactState) {
            self.cues.push(state);
        }
    }

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
        std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
        std::sync::Arc<std::sync::Mutex<crate::instrument::visa::MockVisaState>>,
    ) {
        let link = MockMuxLink::new();
        let bytes = link.log_handle();
        let mux = MuxController::new(Box::new(link), Duration::ZERO);
        let visa = MockVisaResource::new("USB0::DMM::INSTR");
        let dmm_state = visa.handle();
        let dmm = Multimeter::open(Box::new(visa), &zero_delays()).unwrap();
        (
            TesterSession::new(mux, dmm, None, "bench__probecard"),
            bytes,
            dmm_state,
        )
    }

    fn fast_options(counts: u32) -> AlignmentOptions {
        AlignmentOptions {
            required_counts: counts,
            both_hold: Duration::ZERO,
            single_hold: Duration::ZERO,
        }
    }

    #[test]
    fn alignment_exits_after_consecutive_both_shorted_polls() {
        let (mut session, _bytes, dmm) = mock_session();
        dmm.lock().unwrap().resistance_ohms = 50.0;
        let mut cues = RecordingCue { cues: Vec::new() };
        let result = alignment_check(
            &mut session,
            &mut cues,
            &mut NeverAbort,
            &fast_options(10),
            100e6,
        )
        .unwrap();
        assert_eq!(result, (50.0, 50.0));
        assert_eq!(cues.cues.len(), 10);
        assert!(cues.cues.iter().all(|c| *c == ContactState::Both));
    }

    #[test]
    fn a_missed_poll_resets_the_run() {
        let (mut session, _bytes, dmm) = mock_session();
        {
            let mut state = dmm.lock().unwrap();
            // poll 1: both shorted; poll 2: loopback 2 open; then shorted forever
            state.resistance_script.push_back(50.0);
            state.resistance_script.push_back(50.0);
            state.resistance_script.push_back(50.0);
            state.resistance_script.push_back(1e9);
            state.resistance_ohms = 50.0;
        }
        let mut cues = RecordingCue { cues: Vec::new() };
        alignment_check(
            &mut session,
            &mut cues,
            &mut NeverAbort,
            &fast_options(3),
            100e6,
        )
        .unwrap();
        // one Both, one OneOnly, then three consecutive Both
        assert_eq!(
            cues.cues,
            vec![
                ContactState::Both,
                ContactState::OneOnly,
                ContactState::Both,
                ContactState::Both,
                ContactState::Both,
            ]
        );
    }

    #[test]
    fn alignment_restores_the_default_range() {
        let (mut session, _bytes, dmm) = mock_session();
        dmm.lock().unwrap().resistance_ohms = 50.0;
        let mut cues = RecordingCue { cues: Vec::new() };
        alignment_check(
            &mut session,
            &mut cues,
            &mut NeverAbort,
            &fast_options(1),
            100e6,
        )
        .unwrap();
        let state = dmm.lock().unwrap();
        let last_range = state
            .writes
            .iter()
            .filter(|w| w.starts_with("sens:res:rang"))
            .last()
            .cloned();
        assert_eq!(last_range.as_deref(), Some("sens:res:rang 100E6"));
    }

    #[test]
    fn alignment_alternates_the_two_loopback_paths() {
        let (mut session, bytes, dmm) = mock_session();
        dmm.lock().unwrap().resistance_ohms = 50.0;
        let mut cues = RecordingCue { cues: Vec::new() };
        alignment_check(
            &mut session,
            &mut cues,
            &mut NeverAbort,
            &fast_options(2),
            100e6,
        )
        .unwrap();
        let sent = bytes.lock().unwrap();
        assert_eq!(*sent, vec![b'&', b'*', b'&', b'*']);
    }

    #[test]
    fn contact_classification_covers_all_states() {
        assert_eq!(classify_contact(50.0, 50.0, 100e6), ContactState::Both);
        assert_eq!(classify_contact(50.0, 1e9, 100e6), ContactState::OneOnly);
        assert_eq!(classify_contact(1e9, 50.0, 100e6), ContactState::TwoOnly);
        assert_eq!(classify_contact(1e9, 1e9, 100e6), ContactState::Neither);
    }

    #[test]
    fn spot_check_reports_open_and_shorted() {
        let (mut session, bytes, dmm) = mock_session();
        dmm.lock().unwrap().resistance_ohms = 1e9;
        let (ohms, summary) = spot_check(&mut session, LoopbackLine::One, 100e6).unwrap();
        assert_eq!(ohms, 1e9);
        assert!(summary.contains("Loopback one is OPEN!"));

        dmm.lock().unwrap().resistance_ohms = 42.0;
        let (_, summary) = spot_check(&mut session, LoopbackLine::Two, 100e6).unwrap();
        assert!(summary.contains("Loopback two measures resistance!"));

        let sent = bytes.lock().unwrap();
        assert_eq!(*sent, vec![b'Z', b'&', b'Z', b'Z', b'*', b'Z']);
    }

    #[test]
    fn loopback_csv_has_header_and_values() {
        let dir = tempfile::tempdir().unwrap();
        write_loopback_csv(dir.path(), "2026-08-07_10-00-00", "E2408_T2", 50.0, 72.5).unwrap();
        let path = dir
            .path()
            .join("2026-08-07_10-00-00_E2408_T2_loopback_measurements.csv");
        let contents = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "Loopback 1 res. (ohm),Loopback 2 res. (ohm)");
        assert_eq!(lines[1], "50,72.5");
    }
}
