//! The owned tester session: serial mux controller, multimeter, and power
//! supply handles plus the tester serial string.
//!
//! All routines borrow the session mutably; nothing instrument-shaped lives
//! in global state. Bring-up walks the configured bench list (first entry is
//! the default) and falls back to operator selection or a manually entered
//! config when a connection fails. Shutdown always tries to leave the power
//! supply off, even when earlier steps errored.

use crate::config::{SdkMode, Settings, TesterHwConfig};
use crate::error::{AppResult, TesterError};
use crate::instrument::mux::{open_serial_link, MockMuxLink, MuxController, MuxLink};
use crate::instrument::visa::open_resource;
use crate::instrument::{Multimeter, PowerSupply};
use crate::prompt::Prompt;
use log::{error, info, warn};
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

static ABORT_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Install the Ctrl-C hook that requests an orderly abort. Sweeps check the
/// flag between measurements, so the caller's shutdown path still powers the
/// supply off instead of the process dying mid-sweep with outputs driven.
pub fn install_abort_handler() {
    if let Err(e) = ctrlc::set_handler(|| ABORT_REQUESTED.store(true, Ordering::SeqCst)) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }
}

pub fn abort_requested() -> bool {
    ABORT_REQUESTED.load(Ordering::SeqCst)
}

/// Error out of the current routine when the operator hit Ctrl-C.
pub fn check_abort() -> AppResult<()> {
    if abort_requested() {
        Err(TesterError::OperatorExit)
    } else {
        Ok(())
    }
}

pub struct TesterSession {
    pub mux: MuxController,
    pub dmm: Multimeter,
    pub psu: Option<PowerSupply>,
    /// `{bench config name}__{array connection}`, recorded in the ledger.
    pub tester_serial: String,
}

impl TesterSession {
    pub fn new(
        mux: MuxController,
        dmm: Multimeter,
        psu: Option<PowerSupply>,
        tester_serial: impl Into<String>,
    ) -> Self {
        Self {
            mux,
            dmm,
            psu,
            tester_serial: tester_serial.into(),
        }
    }

    /// Open all instruments for one bench config.
    fn open_bench(
        cfg: &TesterHwConfig,
        settings: &Settings,
    ) -> AppResult<(MuxController, Multimeter, Option<PowerSupply>)> {
        let mux_link: Box<dyn MuxLink> = match settings.sdk_mode {
            SdkMode::Mock => Box::new(MockMuxLink::new()),
            SdkMode::Real => open_serial_link(&cfg.serial_port)?,
        };
        let mux = MuxController::new(mux_link, settings.delays.serial_settle);

        let dmm_link = open_resource(settings.sdk_mode, &cfg.dmm_resource)?;
        let mut dmm = Multimeter::open(dmm_link, &settings.delays)?;
        let idn = dmm.identity()?;
        info!("Multimeter identity: {}", idn);

        let psu = if cfg.using_psu {
            let psu_link = open_resource(settings.sdk_mode, &cfg.psu_resource)?;
            Some(PowerSupply::open(psu_link, settings.delays.psu_settle)?)
        } else {
            None
        };
        Ok((mux, dmm, psu))
    }

    /// Interactive bring-up: try the default bench, offer the operator an
    /// override, then loop through bench selection / manual entry until
    /// everything connects. Powers the supply on and asks for the array
    /// connection type before returning.
    pub fn connect<R: BufRead, W: Write>(
        settings: &Settings,
        prompt: &mut Prompt<R, W>,
    ) -> AppResult<Self> {
        let mut connected: Option<(String, MuxController, Multimeter, Option<PowerSupply>)> = None;

        if let Some(default_cfg) = settings.testers.first() {
            match Self::open_bench(default_cfg, settings) {
                Ok((mux, dmm, psu)) => {
                    let choice = prompt.choice(
                        "Hit 'enter' to continue with the default tester config, or 'N' to specify another:",
                        &["", "N"],
                    )?;
                    if choice == "N" {
                        // Drop the default connection before reopening.
                        let mut session =
                            TesterSession::new(mux, dmm, psu, default_cfg.tester_name.as_str());
                        session.shutdown()?;
                    } else {
                        connected =
                            Some((default_cfg.tester_name.clone(), mux, dmm, psu));
                    }
                }
                Err(e) => {
                    warn!("Unable to connect with default tester config: {}", e);
                }
            }
        }

        while connected.is_none() {
            let mut options: Vec<String> =
                (0..settings.testers.len()).map(|i| i.to_string()).collect();
            options.push("M".to_string());
            let option_refs: Vec<&str> = options.iter().map(String::as_str).collect();

            let mut menu = String::from("Select the tester config from below:\n");
            for (i, cfg) in settings.testers.iter().enumerate() {
                menu.push_str(&format!("- '{}' for {}\n", i, cfg.tester_name));
            }
            menu.push_str("- 'M' to set a manual config");
            let choice = prompt.choice(&menu, &option_refs)?;

            let cfg = if choice == "M" {
                let serial_port = prompt.non_empty("Enter serial port (e.g. COMx): ")?;
                let dmm_resource = prompt.non_empty(
                    "Enter DMM VISA resource (e.g. USB0::0x0000::0x0000::00000000::INSTR): ",
                )?;
                let using_psu = prompt.yes_no("Is a USB power supply attached?")?;
                let psu_resource = if using_psu {
                    prompt.non_empty("Enter PSU VISA resource: ")?
                } else {
                    String::new()
                };
                TesterHwConfig {
                    tester_name: "Manual".into(),
                    serial_port,
                    dmm_resource,
                    psu_resource,
                    using_psu,
                }
            } else {
                let index: usize = choice.parse().map_err(|_| {
                    TesterError::Configuration(format!("bad tester index '{}'", choice))
                })?;
                settings.testers[index].clone()
            };

            match Self::open_bench(&cfg, settings) {
                Ok((mux, dmm, psu)) => {
                    connected = Some((cfg.tester_name.clone(), mux, dmm, psu));
                }
                Err(e) => {
                    error!("Could not connect with selected tester config: {}", e);
                }
            }
        }

        // The destructuring cannot fail: the loop above only exits when set.
        let Some((config_name, mux, dmm, psu)) = connected else {
            return Err(TesterError::Configuration("no tester connected".into()));
        };
        info!("Using tester config: {}", config_name);

        let mut session = TesterSession::new(mux, dmm, psu, config_name.clone());
        session.power_on()?;

        let connection = Self::select_connection(settings, prompt)?;
        session.tester_serial = format!("{}__{}", config_name, connection);
        info!("Tester Serial Number: {}", session.tester_serial);
        Ok(session)
    }

    /// Array connection menu: 'enter' takes the first (default) entry,
    /// otherwise the operator picks by number.
    fn select_connection<R: BufRead, W: Write>(
        settings: &Settings,
        prompt: &mut Prompt<R, W>,
    ) -> AppResult<String> {
        let connections = &settings.array_connections;
        if connections.is_empty() {
            return Ok(String::new());
        }
        let mut options: Vec<String> = vec![String::new()];
        let mut menu = format!(
            "Select array connection type:\n- 'enter' for {} (default)\n",
            connections[0]
        );
        for (i, connection) in connections.iter().enumerate().skip(1) {
            options.push(i.to_string());
            menu.push_str(&format!("- '{}' for {}\n", i, connection));
        }
        let option_refs: Vec<&str> = options.iter().map(String::as_str).collect();
        let choice = prompt.choice(menu.trim_end(), &option_refs)?;
        let index: usize = if choice.is_empty() {
            0
        } else {
            choice.parse().map_err(|_| {
                TesterError::Configuration(format!("bad connection index '{}'", choice))
            })?
        };
        info!("Selected {}", connections[index]);
        Ok(connections[index].clone())
    }

    /// Turn the power supply on if this bench has one.
    pub fn power_on(&mut self) -> AppResult<()> {
        if let Some(psu) = &mut self.psu {
            psu.ensure_on()?;
        }
        Ok(())
    }

    /// Turn the power supply off if this bench has one.
    pub fn power_off(&mut self) -> AppResult<()> {
        if let Some(psu) = &mut self.psu {
            psu.power_off()?;
        }
        Ok(())
    }

    /// Force the supply off and close every handle. Attempts every step even
    /// when earlier ones fail and reports the collected errors.
    pub fn shutdown(&mut self) -> AppResult<()> {
        let mut errors = Vec::new();
        if let Some(psu) = &mut self.psu {
            if let Err(e) = psu.power_off() {
                errors.push(e);
            }
            if let Err(e) = psu.close() {
                errors.push(e);
            }
        }
        if let Err(e) = self.dmm.close() {
            errors.push(e);
        }
        // The serial link closes on drop.
        info!("Disconnected tester");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TesterError::ShutdownFailed(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelaySettings;
    use crate::instrument::visa::MockVisaResource;
    use crate::instrument::PsuState;
    use std::time::Duration;

    fn mock_session() -> TesterSession {
        let mux_link = MockMuxLink::new();
        let mux = MuxController::new(Box::new(mux_link), Duration::ZERO);
        let delays = DelaySettings {
            dmm_settle: Duration::ZERO,
            dmm_settle_cap: Duration::ZERO,
            ..DelaySettings::default()
        };
        let dmm =
            Multimeter::open(Box::new(MockVisaResource::new("USB0::DMM::INSTR")), &delays).unwrap();
        let psu = PowerSupply::open(
            Box::new(MockVisaResource::new("USB0::PSU::INSTR")),
            Duration::ZERO,
        )
        .unwrap();
        TesterSession::new(mux, dmm, Some(psu), "bench__probecard")
    }

    #[test]
    fn shutdown_turns_the_supply_off() {
        let mut session = mock_session();
        session.power_on().unwrap();
        session.shutdown().unwrap();
        assert_eq!(
            session.psu.as_ref().map(PowerSupply::state),
            Some(PsuState::Off)
        );
    }

    #[test]
    fn connect_with_mock_settings_uses_the_default_bench() {
        let mut settings = Settings::default();
        settings.delays = DelaySettings {
            serial_settle: Duration::ZERO,
            serial_settle_cap: Duration::ZERO,
            dmm_settle: Duration::ZERO,
            dmm_settle_cap: Duration::ZERO,
            psu_settle: Duration::ZERO,
        };
        let input = b"\n\n" as &[u8]; // accept default config, default connection
        let mut output = Vec::new();
        let mut prompt = Prompt::new(&input[..], &mut output);
        let session = TesterSession::connect(&settings, &mut prompt).unwrap();
        assert!(session.tester_serial.starts_with("array_tester_v1_001__"));
        assert_eq!(
            session.psu.as_ref().map(PowerSupply::state),
            Some(PsuState::On)
        );
    }
}
