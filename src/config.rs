//! Configuration management.
//!
//! Settings load from `config/{name}.toml` (default `config/default.toml`)
//! via the `config` crate. The file carries the tester hardware list (serial
//! port plus DMM/PSU VISA resource strings per bench), storage paths, the
//! empirically tuned settle delays, and the pass/fail thresholds. Every
//! section has defaults so a partial file works.

use crate::error::AppResult;
use config::Config;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    /// Mock talks to in-process fakes; real opens serial + VISA hardware.
    pub sdk_mode: SdkMode,
    pub storage: StorageSettings,
    pub delays: DelaySettings,
    pub thresholds: ThresholdSettings,
    pub loopback: LoopbackSettings,
    /// Known bench setups; the first entry is the default the tester tries
    /// to connect to before prompting.
    pub testers: Vec<TesterHwConfig>,
    /// Fixture options joining the array to the tester (probe card, ZIF...).
    pub array_connections: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            sdk_mode: SdkMode::Mock,
            storage: StorageSettings::default(),
            delays: DelaySettings::default(),
            thresholds: ThresholdSettings::default(),
            loopback: LoopbackSettings::default(),
            testers: vec![TesterHwConfig::default()],
            array_connections: vec![
                "ProbeCard_1400-00001_SN_002".into(),
                "ProbeCard_1400-00001_SN_001".into(),
                "ZIFConnector_on_interposer".into(),
                "ZIFConnector_standalone".into(),
                "OtherArrayConnection".into(),
            ],
        }
    }
}

impl Settings {
    pub fn new(config_name: Option<&str>) -> AppResult<Self> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path))
            .build()?;
        Ok(s.try_deserialize()?)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdkMode {
    Mock,
    Real,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    /// Root directory for test output; per-run files land under
    /// `{default_path}/{array kind}/{array id}/`.
    pub default_path: String,
    /// Results ledger file name, appended under `default_path`.
    pub ledger_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            default_path: "output".into(),
            ledger_file: "results_ledger.csv".into(),
        }
    }
}

/// Settle delays. The mux protocol is fire-and-forget: correctness depends
/// entirely on waiting long enough after each byte for the firmware to act.
/// Tuned empirically, not negotiated.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DelaySettings {
    #[serde(with = "humantime_serde")]
    pub serial_settle: Duration,
    /// Longer settle used during capacitance sweeps.
    #[serde(with = "humantime_serde")]
    pub serial_settle_cap: Duration,
    #[serde(with = "humantime_serde")]
    pub dmm_settle: Duration,
    #[serde(with = "humantime_serde")]
    pub dmm_settle_cap: Duration,
    #[serde(with = "humantime_serde")]
    pub psu_settle: Duration,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            serial_settle: Duration::from_millis(20),
            serial_settle_cap: Duration::from_millis(50),
            dmm_settle: Duration::ZERO,
            dmm_settle_cap: Duration::from_millis(100),
            psu_settle: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ThresholdSettings {
    /// Any resistance strictly below this is a short.
    pub res_short_ohms: f64,
    /// Acceptable delta-capacitance band in pF for sensored devices.
    pub cap_band_default_pf: [f64; 2],
    /// Band for bare backplanes without sensors.
    pub cap_band_backplane_pf: [f64; 2],
    /// Per-sensor-type overrides keyed by the ID segment (e.g. "T1").
    pub cap_bands_pf: HashMap<String, [f64; 2]>,
    /// Minimum in-band cell count for the capacitance test to pass.
    pub min_cap_pass_count: u32,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            res_short_ohms: 100e6,
            cap_band_default_pf: [5.0, 50.0],
            cap_band_backplane_pf: [-2.0, 2.0],
            cap_bands_pf: HashMap::new(),
            min_cap_pass_count: 230,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoopbackSettings {
    /// Consecutive both-shorted polls required before the alignment check
    /// exits on its own.
    pub settle_counts: u32,
}

impl Default for LoopbackSettings {
    fn default() -> Self {
        Self { settle_counts: 10 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TesterHwConfig {
    pub tester_name: String,
    pub serial_port: String,
    pub dmm_resource: String,
    pub psu_resource: String,
    /// True when this bench has the USB power supply wired in.
    pub using_psu: bool,
}

impl Default for TesterHwConfig {
    fn default() -> Self {
        Self {
            tester_name: "array_tester_v1_001".into(),
            serial_port: "COM3".into(),
            dmm_resource: "USB0::0x05E6::0x6500::04611761::INSTR".into(),
            psu_resource: "USB0::0x3121::0x0002::583H23104::INSTR".into(),
            using_psu: true,
        }
    }
}
