//! Summary file comparison.
//!
//! Summary files are blank-line-delimited: each test contributes one chunk.
//! The diff tokenizes both files into chunks, normalizes away the run-to-run
//! noise (loopback readings, the shorts legend, trailing range notes on
//! "array" lines), and compares chunk-by-chunk. Everything before the first
//! blank line is the run header and is ignored.

use std::fmt;

/// One differing chunk pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDiff {
    /// Zero-based chunk index in both files.
    pub index: usize,
    pub left: Vec<String>,
    pub right: Vec<String>,
}

/// Outcome of comparing two summary files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffReport {
    Identical,
    Differences(Vec<ChunkDiff>),
    /// The files carry different numbers of tests; only the common prefix
    /// was compared.
    ChunkCountMismatch {
        diffs: Vec<ChunkDiff>,
        left_chunks: usize,
        right_chunks: usize,
    },
}

impl DiffReport {
    pub fn num_differences(&self) -> usize {
        match self {
            Self::Identical => 0,
            Self::Differences(diffs) => diffs.len(),
            Self::ChunkCountMismatch { diffs, .. } => diffs.len(),
        }
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identical => writeln!(f, "There were 0 difference(s) detected"),
            Self::Differences(diffs) => {
                for diff in diffs {
                    render_chunk_diff(f, diff)?;
                }
                writeln!(f, "There were {} difference(s) detected", diffs.len())
            }
            Self::ChunkCountMismatch {
                diffs,
                left_chunks,
                right_chunks,
            } => {
                writeln!(
                    f,
                    "WARNING: files have different number of tests ({} vs {})...",
                    left_chunks, right_chunks
                )?;
                for diff in diffs {
                    render_chunk_diff(f, diff)?;
                }
                writeln!(f, "There were {} difference(s) detected", diffs.len())
            }
        }
    }
}

fn render_chunk_diff(f: &mut fmt::Formatter<'_>, diff: &ChunkDiff) -> fmt::Result {
    writeln!(f, "**********Difference detected (chunk {}):**********", diff.index)?;
    writeln!(f, "---Left:")?;
    for line in &diff.left {
        writeln!(f, "{}", line)?;
    }
    writeln!(f, "---Right:")?;
    for line in &diff.right {
        writeln!(f, "{}", line)?;
    }
    writeln!(f, "****************************************")
}

/// Truncate `line` at the first occurrence of `keyword`, or return it whole.
fn truncate_to_keyword<'a>(line: &'a str, keyword: &str) -> &'a str {
    match line.find(keyword) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Keep a line for comparison? Loopback readings and the legend vary run to
/// run and are skipped; lines mentioning the array keep only the text before
/// "in" (dropping measurement-range tails).
fn normalize_line(line: &str) -> Option<String> {
    if line.contains("If there are shorts") || line.contains("Loopback") {
        return None;
    }
    if line.contains("array") {
        return Some(truncate_to_keyword(line, "in").to_string());
    }
    Some(line.to_string())
}

/// Split summary text into normalized chunks. Chunks are delimited by blank
/// lines; the header before the first blank line is not a chunk; chunks left
/// empty by normalization are dropped.
pub fn chunk_summary(text: &str) -> Vec<Vec<String>> {
    let lines: Vec<&str> = text.lines().collect();
    let mut boundaries: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| line.trim().is_empty().then_some(i))
        .collect();
    boundaries.push(lines.len());

    let mut chunks = Vec::new();
    for window in boundaries.windows(2) {
        let (start, end) = (window[0], window[1]);
        let chunk: Vec<String> = lines[start..end]
            .iter()
            .skip(1) // the delimiter line itself
            .filter_map(|line| normalize_line(line))
            .collect();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
    }
    chunks
}

/// Compare two summary files chunk-by-chunk.
pub fn compare_summaries(left: &str, right: &str) -> DiffReport {
    let left_chunks = chunk_summary(left);
    let right_chunks = chunk_summary(right);

    let common = left_chunks.len().min(right_chunks.len());
    let diffs: Vec<ChunkDiff> = (0..common)
        .filter(|&i| left_chunks[i] != right_chunks[i])
        .map(|i| ChunkDiff {
            index: i,
            left: left_chunks[i].clone(),
            right: right_chunks[i].clone(),
        })
        .collect();

    if left_chunks.len() != right_chunks.len() {
        DiffReport::ChunkCountMismatch {
            diffs,
            left_chunks: left_chunks.len(),
            right_chunks: right_chunks.len(),
        }
    } else if diffs.is_empty() {
        DiffReport::Identical
    } else {
        DiffReport::Differences(diffs)
    }
}
