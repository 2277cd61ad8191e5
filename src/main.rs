//! CLI entry point for the array tester.
//!
//! Three subcommands mirror the three bench workflows:
//! - `run`: the full interactive test flow (bring-up, loopback check, test
//!   panel, summary + ledger, optional diff against a previous run)
//! - `loopback`: the standalone probe alignment check
//! - `diff`: compare two summary files chunk-by-chunk
//!
//! All hardware access goes through the session; on any failure the session
//! is still shut down so the power supply never stays on.

use anyhow::{Context, Result};
use array_etest::config::{SdkMode, Settings};
use array_etest::data::diff::compare_summaries;
use array_etest::data::report::{self, LedgerRow};
use array_etest::dut::{ArrayKind, DeviceId, TftType};
use array_etest::error::TesterError;
use array_etest::plans;
use array_etest::prompt::Prompt;
use array_etest::routines::capacitance::CapRange;
use array_etest::routines::loopback::{
    alignment_check, spot_check, write_loopback_csv, AlignmentOptions, ConsoleCue, KeyAbort,
    LoopbackLine,
};
use array_etest::routines::RunContext;
use array_etest::session::TesterSession;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "array_etest")]
#[command(about = "Automated continuity and capacitance tester for 16x16 sensor arrays", long_about = None)]
struct Cli {
    /// Config name under config/ (defaults to "default")
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the interactive test flow
    Run {
        /// Force mock instruments regardless of the configured sdk_mode
        #[arg(long)]
        mock: bool,

        /// Suppress the audible alignment cues
        #[arg(long)]
        silent: bool,
    },

    /// Run only the loopback alignment check
    Loopback {
        #[arg(long)]
        mock: bool,

        #[arg(long)]
        silent: bool,
    },

    /// Compare two summary files
    Diff {
        left: PathBuf,
        right: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings =
        Settings::new(cli.config.as_deref()).context("failed to load configuration")?;
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&settings.log_level),
    )
    .init();

    match cli.command {
        Commands::Run { mock, silent } => {
            if mock {
                settings.sdk_mode = SdkMode::Mock;
            }
            cmd_run(&settings, silent)
        }
        Commands::Loopback { mock, silent } => {
            if mock {
                settings.sdk_mode = SdkMode::Mock;
            }
            cmd_loopback(&settings, silent)
        }
        Commands::Diff { left, right } => cmd_diff(&left, &right),
    }
}

fn cmd_run(settings: &Settings, silent: bool) -> Result<()> {
    array_etest::session::install_abort_handler();
    let mut prompt = Prompt::stdio();

    let kind_digit = prompt.digit(
        "Please enter array type--\n- 0 for backplanes\n- 1 for sensor arrays\n- 2 for sensor modules:",
        &[0, 1, 2],
    )?;
    let kind = ArrayKind::from_digit(kind_digit)
        .ok_or_else(|| TesterError::Configuration(format!("bad array kind {}", kind_digit)))?;
    let id = prompt.non_empty("Please enter the array ID (e.g. E2408-001-2-E2_T2):")?;
    let stage = if kind == ArrayKind::SensorModule {
        Some(prompt.non_empty("Please enter the array stage of assembly (e.g. onglass):")?)
    } else {
        None
    };
    let dut = DeviceId::new(id, stage, kind);

    let out_dir = PathBuf::from(&settings.storage.default_path)
        .join(kind.label())
        .join(&dut.id);
    if !out_dir.exists() {
        if !prompt.yes_no("Output directory doesn't exist. Make a new directory?")? {
            info!("Exiting program now...");
            return Ok(());
        }
        fs::create_dir_all(&out_dir)?;
    }
    info!(
        "Test data for {} will save to {}",
        dut.id,
        out_dir.display()
    );

    let mut session = TesterSession::connect(settings, &mut prompt)?;
    let result = run_flow(&mut session, &mut prompt, settings, &dut, &out_dir, silent);
    if let Err(e) = session.shutdown() {
        warn!("Shutdown reported errors: {}", e);
    }
    result
}

fn run_flow<R: BufRead, W: Write>(
    session: &mut TesterSession,
    prompt: &mut Prompt<R, W>,
    settings: &Settings,
    dut: &DeviceId,
    out_dir: &Path,
    silent: bool,
) -> Result<()> {
    let ts_file = report::timestamp_file();
    let mut ledger = LedgerRow {
        timestamp: report::timestamp_display(),
        tester_serial: session.tester_serial.clone(),
        array_serial: dut.full_name(),
        array_type: dut.kind.label().to_string(),
        module_stage: dut.stage.clone().unwrap_or_default(),
        ..LedgerRow::default()
    };
    let mut chunks: Vec<String> = Vec::new();
    let ctx = RunContext::new(out_dir, dut, settings);
    let threshold = settings.thresholds.res_short_ohms;

    session.power_on()?;

    if dut.kind.uses_alignment_check() {
        println!("Press 'q' to skip the loopback check...");
        let mut cue = ConsoleCue { silent };
        let mut abort = KeyAbort;
        let options = AlignmentOptions {
            required_counts: settings.loopback.settle_counts,
            ..AlignmentOptions::default()
        };
        let _ = crossterm::terminal::enable_raw_mode();
        let aligned = alignment_check(session, &mut cue, &mut abort, &options, threshold);
        let _ = crossterm::terminal::disable_raw_mode();
        println!();
        let (loop1, loop2) = aligned?;
        write_loopback_csv(out_dir, &ts_file, &dut.full_name(), loop1, loop2)?;
        chunks.push(format!(
            "Loopback 1 resistance: {} ohms\nLoopback 2 resistance: {} ohms",
            loop1, loop2
        ));
        ledger.loopback_one_ohm = Some(loop1.to_string());
        ledger.loopback_two_ohm = Some(loop2.to_string());
    } else {
        let (loop1, summary1) = spot_check(session, LoopbackLine::One, threshold)?;
        let (loop2, summary2) = spot_check(session, LoopbackLine::Two, threshold)?;
        write_loopback_csv(out_dir, &ts_file, &dut.full_name(), loop1, loop2)?;
        chunks.push(summary1);
        chunks.push(summary2);
        ledger.loopback_one_ohm = Some(loop1.to_string());
        ledger.loopback_two_ohm = Some(loop2.to_string());
    }

    let tft_digit = prompt.digit("Please select array type: '1' for 1T, '3' for 3T:", &[1, 3])?;
    let tft = TftType::from_digit(tft_digit)
        .ok_or_else(|| TesterError::Configuration(format!("bad TFT type {}", tft_digit)))?;
    ledger.tft_type = tft.label().to_string();
    info!("Running {} array tests...", tft.label());

    match tft {
        TftType::OneT => {
            let selection = prompt.choice(
                "Hit 'enter' for the default (full) 1T test, or:\n\
                 - '1' to only run cap + TFT cont. tests\n\
                 - '2' to only run continuity tests:",
                &["", "1", "2"],
            )?;
            match selection.as_str() {
                "1" => {
                    let range = prompt_cap_range(prompt)?;
                    plans::run_cap_1t(session, &ctx, range, &mut ledger, &mut chunks)?;
                }
                "2" => {
                    plans::run_continuity_1t(session, &ctx, &mut ledger, &mut chunks)?;
                }
                _ => {
                    let has_shorts =
                        plans::run_continuity_1t(session, &ctx, &mut ledger, &mut chunks)?;
                    let proceed = if has_shorts {
                        println!("This array doesn't have pants... it has shorts!");
                        prompt.choice(
                            "Type 'TEST' to continue with the cap check, or hit 'enter' to skip it:",
                            &["", "TEST"],
                        )? == "TEST"
                    } else {
                        prompt.choice(
                            "Hit 'enter' to continue with cap tests, or type 'EXIT' to skip them:",
                            &["", "EXIT"],
                        )? == ""
                    };
                    if proceed {
                        let range = prompt_cap_range(prompt)?;
                        plans::run_cap_1t(session, &ctx, range, &mut ledger, &mut chunks)?;
                    }
                }
            }
        }
        TftType::ThreeT => {
            plans::run_continuity_3t(session, &ctx, &mut ledger, &mut chunks)?;
        }
    }

    session.power_off()?;
    info!("Done testing serial number {}!", dut.id);

    let body = report::build_summary(&ledger.timestamp, &dut.full_name(), tft.label(), &chunks);
    let summary_path = report::write_summary(out_dir, &ts_file, &dut.full_name(), &body)?;
    info!("Summary written to {}", summary_path.display());

    let ledger_path =
        PathBuf::from(&settings.storage.default_path).join(&settings.storage.ledger_file);
    ledger.append_to(&ledger_path)?;
    info!("Result row appended to {}", ledger_path.display());

    offer_diff(prompt, out_dir, &summary_path)?;
    Ok(())
}

fn prompt_cap_range<R: BufRead, W: Write>(prompt: &mut Prompt<R, W>) -> Result<CapRange> {
    let selection = prompt.choice(
        "Hit 'enter' for the default 1nF cap range, or type '1' for the 10nF range:",
        &["", "1"],
    )?;
    Ok(if selection == "1" {
        CapRange::TenNf
    } else {
        CapRange::OneNf
    })
}

/// Offer to diff the fresh summary against an earlier one in the same
/// device directory.
fn offer_diff<R: BufRead, W: Write>(
    prompt: &mut Prompt<R, W>,
    out_dir: &Path,
    current: &Path,
) -> Result<()> {
    let mut summaries: Vec<PathBuf> = fs::read_dir(out_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with("_summary.txt"))
        })
        .collect();
    // timestamped names sort chronologically
    summaries.sort();
    if summaries.len() <= 1 {
        info!("No files to compare.");
        return Ok(());
    }

    let choice = prompt.choice(
        "Comparing output summary files- Please enter:\n\
         - 'Y' to compare data with the previous test\n\
         - 'M' to manually pick a file to compare against, or\n\
         - 'enter' to exit...",
        &["", "Y", "M"],
    )?;
    let other = match choice.as_str() {
        "Y" => summaries[summaries.len() - 2].clone(),
        "M" => {
            let candidates = &summaries[..summaries.len() - 1];
            let mut menu = String::from("Select the file to compare against:\n");
            let options: Vec<String> = (0..candidates.len()).map(|i| i.to_string()).collect();
            for (i, path) in candidates.iter().enumerate() {
                menu.push_str(&format!("- '{}' for {}\n", i, path.display()));
            }
            let option_refs: Vec<&str> = options.iter().map(String::as_str).collect();
            let index: usize = prompt.choice(menu.trim_end(), &option_refs)?.parse()?;
            candidates[index].clone()
        }
        _ => return Ok(()),
    };
    cmd_diff(current, &other)
}

fn cmd_loopback(settings: &Settings, silent: bool) -> Result<()> {
    array_etest::session::install_abort_handler();
    let mut prompt = Prompt::stdio();
    let mut session = TesterSession::connect(settings, &mut prompt)?;
    println!("Press 'q' to stop the loopback check...");
    let mut cue = ConsoleCue { silent };
    let mut abort = KeyAbort;
    let options = AlignmentOptions {
        required_counts: settings.loopback.settle_counts,
        ..AlignmentOptions::default()
    };
    let _ = crossterm::terminal::enable_raw_mode();
    let aligned = alignment_check(
        &mut session,
        &mut cue,
        &mut abort,
        &options,
        settings.thresholds.res_short_ohms,
    );
    let _ = crossterm::terminal::disable_raw_mode();
    println!();
    let result = aligned.map(|(loop1, loop2)| {
        println!("Loopback 1: {} ohm", loop1);
        println!("Loopback 2: {} ohm", loop2);
    });
    if let Err(e) = session.shutdown() {
        warn!("Shutdown reported errors: {}", e);
    }
    Ok(result?)
}

fn cmd_diff(left: &Path, right: &Path) -> Result<()> {
    println!("Original file is {}", left.display());
    println!("Comparing against {}", right.display());
    let left_text =
        fs::read_to_string(left).with_context(|| format!("reading {}", left.display()))?;
    let right_text =
        fs::read_to_string(right).with_context(|| format!("reading {}", right.display()))?;
    print!("{}", compare_summaries(&left_text, &right_text));
    Ok(())
}
