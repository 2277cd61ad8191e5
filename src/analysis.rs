//! Pure measurement classification.
//!
//! Everything here is hardware-free: short detection against the resistance
//! threshold, the three-way capacitance band partition, the ASCII short maps
//! that go into summary files, and the pass/fail helpers applied to whole
//! test outcomes.

use crate::config::ThresholdSettings;
use crate::dut::{ArrayKind, DeviceId};

/// A resistance strictly below the threshold is a short. The bound is
/// exclusive: a reading exactly at the threshold is NOT a short.
pub fn is_short(resistance_ohms: f64, threshold_ohms: f64) -> bool {
    resistance_ohms < threshold_ohms
}

/// Acceptable delta-capacitance range in pF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapBand {
    pub low_pf: f64,
    pub high_pf: f64,
}

/// Where a calibrated reading falls relative to a [`CapBand`]. The partition
/// is total and mutually exclusive: `< low` is below, `> high` is above,
/// everything else (both bounds inclusive) is within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapClass {
    Below,
    Within,
    Above,
}

impl CapBand {
    pub fn new(low_pf: f64, high_pf: f64) -> Self {
        Self { low_pf, high_pf }
    }

    pub fn classify(self, delta_pf: f64) -> CapClass {
        if delta_pf < self.low_pf {
            CapClass::Below
        } else if delta_pf > self.high_pf {
            CapClass::Above
        } else {
            CapClass::Within
        }
    }

    /// Band for a given device: backplanes get the backplane band, otherwise
    /// the sensor-type override if one is configured, otherwise the default.
    pub fn for_device(dut: &DeviceId, thresholds: &ThresholdSettings) -> Self {
        if dut.kind == ArrayKind::Backplane {
            let [low, high] = thresholds.cap_band_backplane_pf;
            return Self::new(low, high);
        }
        let band = dut
            .sensor_type()
            .and_then(|key| thresholds.cap_bands_pf.get(key))
            .copied()
            .unwrap_or(thresholds.cap_band_default_pf);
        Self::new(band[0], band[1])
    }
}

/// Running below/within/above counts for a capacitance sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CapTally {
    pub below: u32,
    pub within: u32,
    pub above: u32,
}

impl CapTally {
    pub fn record(&mut self, class: CapClass) {
        match class {
            CapClass::Below => self.below += 1,
            CapClass::Within => self.within += 1,
            CapClass::Above => self.above += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.below + self.within + self.above
    }
}

/// Render a 2D resistance grid as the `.`/`X` map printed when a sweep finds
/// shorts: `X` marks a short, `.` an open, one text row per grid row.
pub fn short_map(grid: &[Vec<f64>], threshold_ohms: f64) -> String {
    let mut map = String::new();
    for row in grid {
        for &value in row {
            map.push(if is_short(value, threshold_ohms) { 'X' } else { '.' });
        }
        map.push('\n');
    }
    map
}

/// One-line `.`/`X` run for a 1D sweep.
pub fn short_run(values: &[f64], threshold_ohms: f64) -> String {
    values
        .iter()
        .map(|&v| if is_short(v, threshold_ohms) { 'X' } else { '.' })
        .collect()
}

/// Continuity tests pass when the short count does not exceed the allowance
/// (zero by default).
pub fn continuity_verdict(num_shorts: u32, max_allowed: u32) -> &'static str {
    if num_shorts <= max_allowed {
        "PASS"
    } else {
        "FAIL"
    }
}

/// Capacitance tests pass when enough cells land inside the band.
pub fn capacitance_verdict(in_band: u32, min_required: u32) -> &'static str {
    if in_band >= min_required {
        "PASS"
    } else {
        "FAIL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_a_strict_lower_bound() {
        assert!(is_short(50.0, 100e6));
        assert!(is_short(99_999_999.0, 100e6));
        // exactly 1e8 is not a short
        assert!(!is_short(1e8, 100e6));
        assert!(!is_short(2e8, 100e6));
    }

    #[test]
    fn band_partition_is_total_and_exclusive() {
        let band = CapBand::new(-2.0, 2.0);
        assert_eq!(band.classify(1.0), CapClass::Within);
        assert_eq!(band.classify(-3.0), CapClass::Below);
        assert_eq!(band.classify(10.0), CapClass::Above);
        // bounds are inclusive
        assert_eq!(band.classify(-2.0), CapClass::Within);
        assert_eq!(band.classify(2.0), CapClass::Within);
    }

    #[test]
    fn default_band_applies_to_sensored_devices() {
        let thresholds = ThresholdSettings::default();
        let dut = DeviceId::new("E2408-001-2-E2_T2", None, ArrayKind::SensorArray);
        let band = CapBand::for_device(&dut, &thresholds);
        assert_eq!(band, CapBand::new(5.0, 50.0));
    }

    #[test]
    fn backplanes_use_the_backplane_band() {
        let thresholds = ThresholdSettings::default();
        let dut = DeviceId::new("E2408-001-2-E2_T2", None, ArrayKind::Backplane);
        let band = CapBand::for_device(&dut, &thresholds);
        assert_eq!(band, CapBand::new(-2.0, 2.0));
    }

    #[test]
    fn sensor_type_override_wins_when_configured() {
        let mut thresholds = ThresholdSettings::default();
        thresholds.cap_bands_pf.insert("T9".into(), [10.0, 20.0]);
        let dut = DeviceId::new("E2421-002-001-E5_T9_R1-103", None, ArrayKind::SensorArray);
        let band = CapBand::for_device(&dut, &thresholds);
        assert_eq!(band, CapBand::new(10.0, 20.0));

        // unknown type falls back to the default band
        let other = DeviceId::new("E2421-002-001-E5_T1_R1-103", None, ArrayKind::SensorArray);
        assert_eq!(CapBand::for_device(&other, &thresholds), CapBand::new(5.0, 50.0));
    }

    #[test]
    fn tally_records_each_class() {
        let band = CapBand::new(5.0, 50.0);
        let mut tally = CapTally::default();
        for delta in [1.0, 25.0, 60.0, 30.0] {
            tally.record(band.classify(delta));
        }
        assert_eq!(tally.below, 1);
        assert_eq!(tally.within, 2);
        assert_eq!(tally.above, 1);
        assert_eq!(tally.total(), 4);
    }

    #[test]
    fn short_map_marks_shorts_with_x() {
        let grid = vec![vec![1e9, 10.0], vec![1e9, 1e9]];
        assert_eq!(short_map(&grid, 100e6), ".X\n..\n");
    }

    #[test]
    fn short_run_renders_one_char_per_index() {
        let values = vec![1e9, 10.0, 1e9, 50.0];
        assert_eq!(short_run(&values, 100e6), ".X.X");
    }

    #[test]
    fn verdict_helpers() {
        assert_eq!(continuity_verdict(0, 0), "PASS");
        assert_eq!(continuity_verdict(1, 0), "FAIL");
        assert_eq!(capacitance_verdict(256, 230), "PASS");
        assert_eq!(capacitance_verdict(229, 230), "FAIL");
    }
}
