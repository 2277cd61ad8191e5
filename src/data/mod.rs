//! File outputs: per-cell CSVs, grid-shaped CSVs for visualization, the
//! summary text file, the results ledger, and the summary diff utility.

pub mod diff;
pub mod grid;
pub mod report;

pub use diff::{compare_summaries, DiffReport};
pub use grid::write_grid;
pub use report::LedgerRow;
