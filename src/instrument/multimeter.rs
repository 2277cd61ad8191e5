//! Keithley DMM6500-class benchtop multimeter session.
//!
//! Bring-up clears status and sets the default measurement ranges, including
//! the capacitance averaging setup (repeating average over 10 readings, see
//! the Keithley user manual). Resistance and capacitance reads are blocking
//! `meas:res?` / `meas:cap?` queries followed by the configured settle delay.

use crate::config::DelaySettings;
use crate::error::{AppResult, TesterError};
use crate::instrument::visa::VisaResource;
use log::{debug, info};
use std::time::Duration;

/// Default resistance range, also the short-detection range.
pub const RES_RANGE_DEFAULT: &str = "100E6";
/// Range used while probing the low-ohm loopback traces.
pub const RES_RANGE_LOOPBACK: &str = "10E3";
/// Default capacitance range (1 nF).
pub const CAP_RANGE_DEFAULT: &str = "1E-9";
/// Wide capacitance range (10 nF) selectable by the operator.
pub const CAP_RANGE_WIDE: &str = "1E-8";

pub struct Multimeter {
    link: Box<dyn VisaResource>,
    settle: Duration,
    settle_cap: Duration,
}

impl Multimeter {
    /// Open the session and program the default measurement setup.
    pub fn open(mut link: Box<dyn VisaResource>, delays: &DelaySettings) -> AppResult<Self> {
        link.write("*CLS")?;
        link.write(&format!("sens:res:rang {}", RES_RANGE_DEFAULT))?;
        link.write(&format!("sens:cap:rang {}", CAP_RANGE_DEFAULT))?;
        link.write("sens:cap:aver:tcon rep")?;
        link.write("sens:cap:aver:coun 10")?;
        link.write("sens:cap:aver on")?;
        info!("Connected to VISA multimeter");
        Ok(Self {
            link,
            settle: delays.dmm_settle,
            settle_cap: delays.dmm_settle_cap,
        })
    }

    fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    fn write_settled(&mut self, cmd: &str, delay: Duration) -> AppResult<()> {
        self.link.write(cmd)?;
        self.pause(delay);
        Ok(())
    }

    fn query_settled(&mut self, cmd: &str, delay: Duration) -> AppResult<String> {
        let response = self.link.query(cmd)?;
        self.pause(delay);
        Ok(response)
    }

    /// Instrument identity (`*IDN?`), logged at bring-up.
    pub fn identity(&mut self) -> AppResult<String> {
        let idn = self.query_settled("*IDN?", self.settle)?;
        debug!("multimeter identity: {}", idn);
        Ok(idn)
    }

    pub fn set_resistance_range(&mut self, range: &str) -> AppResult<()> {
        self.write_settled(&format!("sens:res:rang {}", range), self.settle)
    }

    pub fn set_capacitance_range(&mut self, range: &str) -> AppResult<()> {
        self.write_settled(&format!("sens:cap:rang {}", range), self.settle_cap)
    }

    /// Throwaway resistance query that switches the meter into resistance
    /// mode before a continuity sweep.
    pub fn prime_resistance(&mut self) -> AppResult<()> {
        self.query_settled("meas:res?", self.settle)?;
        Ok(())
    }

    /// Throwaway capacitance query before a capacitance sweep.
    pub fn prime_capacitance(&mut self) -> AppResult<()> {
        self.query_settled("meas:cap?", self.settle_cap)?;
        Ok(())
    }

    /// One blocking resistance measurement in ohms.
    pub fn resistance(&mut self) -> AppResult<f64> {
        let response = self.query_settled("meas:res?", self.settle)?;
        parse_measurement(&response)
    }

    /// One blocking capacitance measurement in farads.
    pub fn capacitance(&mut self) -> AppResult<f64> {
        let response = self.query_settled("meas:cap?", self.settle_cap)?;
        parse_measurement(&response)
    }

    pub fn close(&mut self) -> AppResult<()> {
        self.link.close()?;
        info!("Disconnected DMM");
        Ok(())
    }
}

fn parse_measurement(response: &str) -> AppResult<f64> {
    response
        .trim()
        .parse::<f64>()
        .map_err(|_| TesterError::BadResponse {
            response: response.to_string(),
        })
}
