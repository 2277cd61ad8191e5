//! Summary text assembly, output file naming, and the results ledger.
//!
//! Every test writes files named `{timestamp}_{dut}_{test}` so runs sort
//! chronologically inside a device's output directory. The ledger is the
//! fixed-column per-run record appended to one CSV at the storage root; its
//! column order is the reporting schema and must not be reordered.

use crate::error::AppResult;
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Timestamp used in file names (filesystem safe).
pub fn timestamp_file() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Timestamp used in file contents and the ledger.
pub fn timestamp_display() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Path of one output file: `{dir}/{ts}_{dut}_{test}{suffix}`.
pub fn output_file(dir: &Path, ts: &str, dut_full: &str, test: &str, suffix: &str) -> PathBuf {
    dir.join(format!("{}_{}_{}{}", ts, dut_full, test, suffix))
}

/// Open a per-cell CSV and write its header row.
pub fn cell_writer(path: &Path, headers: &[&str]) -> AppResult<csv::Writer<File>> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(headers)?;
    Ok(writer)
}

/// Format a resistance with thousands separators for summary text
/// (`150000000.5` -> `150,000,000.5`).
pub fn format_with_commas(value: f64) -> String {
    let raw = value.to_string();
    let (number, fraction) = match raw.split_once('.') {
        Some((n, f)) => (n, Some(f)),
        None => (raw.as_str(), None),
    };
    let (sign, digits) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    match fraction {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

/// Assemble the summary file body: run header, the `.`/`X` legend, then one
/// blank-line-separated chunk per test.
pub fn build_summary(
    ts_display: &str,
    dut_name: &str,
    tft_label: &str,
    chunks: &[String],
) -> String {
    let mut body = format!(
        "{}\nArray ID: {}\nArray Type: {}\n\n\
         If there are shorts, the output (.) means open and (X) means short\n",
        ts_display, dut_name, tft_label
    );
    for chunk in chunks {
        body.push('\n');
        body.push_str(chunk.trim_end());
        body.push('\n');
    }
    body
}

/// Write the summary file and return its path.
pub fn write_summary(
    dir: &Path,
    ts_file: &str,
    dut_name: &str,
    body: &str,
) -> AppResult<PathBuf> {
    let path = output_file(dir, ts_file, dut_name, "summary", ".txt");
    let mut file = File::create(&path)?;
    file.write_all(body.as_bytes())?;
    Ok(path)
}

/// Ledger column order. This is the reporting schema; tests that were not
/// run stay blank.
pub const LEDGER_COLUMNS: [&str; 25] = [
    "Timestamp",
    "Tester Serial Number",
    "Array Serial Number",
    "Array Type",
    "Array Module Stage",
    "TFT Type",
    "Loopback One (ohm)",
    "Loopback Two (ohm)",
    "Cap Col to PZBIAS (# pass)",
    "Col to PZBIAS with TFT's ON (# shorts)",
    "Row to Col (# shorts)",
    "Rst to Col (# shorts)",
    "Row to PZBIAS (# shorts)",
    "Row to SHIELD (# shorts)",
    "Col to PZBIAS (# shorts)",
    "Col to SHIELD (# shorts)",
    "Col to Vdd (# shorts)",
    "Col to Vrst (# shorts)",
    "Rst to SHIELD (# shorts)",
    "Rst to PZBIAS (# shorts)",
    "SHIELD to PZBIAS (ohm)",
    "Vdd to SHIELD (ohm)",
    "Vdd to PZBIAS (ohm)",
    "Vrst to SHIELD (ohm)",
    "Vrst to PZBIAS (ohm)",
];

/// One per-run record for the results ledger.
#[derive(Debug, Default, Clone)]
pub struct LedgerRow {
    pub timestamp: String,
    pub tester_serial: String,
    pub array_serial: String,
    pub array_type: String,
    pub module_stage: String,
    pub tft_type: String,
    pub loopback_one_ohm: Option<String>,
    pub loopback_two_ohm: Option<String>,
    pub cap_col_to_pzbias_pass: Option<String>,
    pub col_to_pzbias_tfts_on_shorts: Option<String>,
    pub row_to_col_shorts: Option<String>,
    pub rst_to_col_shorts: Option<String>,
    pub row_to_pzbias_shorts: Option<String>,
    pub row_to_shield_shorts: Option<String>,
    pub col_to_pzbias_shorts: Option<String>,
    pub col_to_shield_shorts: Option<String>,
    pub col_to_vdd_shorts: Option<String>,
    pub col_to_vrst_shorts: Option<String>,
    pub rst_to_shield_shorts: Option<String>,
    pub rst_to_pzbias_shorts: Option<String>,
    pub shield_to_pzbias_ohm: Option<String>,
    pub vdd_to_shield_ohm: Option<String>,
    pub vdd_to_pzbias_ohm: Option<String>,
    pub vrst_to_shield_ohm: Option<String>,
    pub vrst_to_pzbias_ohm: Option<String>,
}

impl LedgerRow {
    fn record(&self) -> Vec<String> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        vec![
            self.timestamp.clone(),
            self.tester_serial.clone(),
            self.array_serial.clone(),
            self.array_type.clone(),
            self.module_stage.clone(),
            self.tft_type.clone(),
            opt(&self.loopback_one_ohm),
            opt(&self.loopback_two_ohm),
            opt(&self.cap_col_to_pzbias_pass),
            opt(&self.col_to_pzbias_tfts_on_shorts),
            opt(&self.row_to_col_shorts),
            opt(&self.rst_to_col_shorts),
            opt(&self.row_to_pzbias_shorts),
            opt(&self.row_to_shield_shorts),
            opt(&self.col_to_pzbias_shorts),
            opt(&self.col_to_shield_shorts),
            opt(&self.col_to_vdd_shorts),
            opt(&self.col_to_vrst_shorts),
            opt(&self.rst_to_shield_shorts),
            opt(&self.rst_to_pzbias_shorts),
            opt(&self.shield_to_pzbias_ohm),
            opt(&self.vdd_to_shield_ohm),
            opt(&self.vdd_to_pzbias_ohm),
            opt(&self.vrst_to_shield_ohm),
            opt(&self.vrst_to_pzbias_ohm),
        ]
    }

    /// Append this row to the ledger file, creating it with a header row on
    /// first use.
    pub fn append_to(&self, path: &Path) -> AppResult<()> {
        let is_new = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::Writer::from_writer(file);
        if is_new {
            writer.write_record(LEDGER_COLUMNS)?;
        }
        writer.write_record(self.record())?;
        writer.flush()?;
        Ok(())
    }
}
