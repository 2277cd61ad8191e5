//! Grid-shaped CSV output.
//!
//! Sweeps emit an auxiliary CSV laid out like the physical array for quick
//! visual inspection: header `label, C1..C16`, then one row per array row
//! from R16 at the top down to R1, matching the orientation of the die under
//! the probe card.

use crate::error::AppResult;
use std::path::Path;

/// Write a 2D value grid. `values` is indexed `[row][col]` with row 0 first;
/// the file lists rows in descending order (R16 first).
pub fn write_grid(
    path: &Path,
    corner_label: &str,
    row_prefix: &str,
    col_prefix: &str,
    values: &[Vec<f64>],
) -> AppResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let cols = values.first().map_or(0, Vec::len);

    let mut header = Vec::with_capacity(cols + 1);
    header.push(corner_label.to_string());
    for col in 1..=cols {
        header.push(format!("{}{}", col_prefix, col));
    }
    writer.write_record(&header)?;

    for (row_index, row) in values.iter().enumerate().rev() {
        let mut record = Vec::with_capacity(cols + 1);
        record.push(format!("{}{}", row_prefix, row_index + 1));
        for value in row {
            record.push(value.to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
