//! B&K 9141-class programmable power supply session.
//!
//! The tester boards run from two channels: 18 V with a 0.05 A limit on the
//! negative rail and 0.075 A on the positive rail. Output state is tracked
//! locally (the on/off sequences are skipped when the supply is already in
//! the requested state); a failed command drops the tracked state back to
//! `Unknown`.

use crate::error::AppResult;
use crate::instrument::visa::VisaResource;
use log::info;
use std::time::Duration;

pub const SUPPLY_VOLTS: f64 = 18.0;
pub const CURRENT_LIMIT_NEG_AMPS: f64 = 0.05;
pub const CURRENT_LIMIT_POS_AMPS: f64 = 0.075;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsuState {
    Off,
    Unknown,
    On,
}

pub struct PowerSupply {
    link: Box<dyn VisaResource>,
    state: PsuState,
    settle: Duration,
}

impl PowerSupply {
    pub fn open(mut link: Box<dyn VisaResource>, settle: Duration) -> AppResult<Self> {
        link.write("*CLS")?;
        info!("Connected to VISA PSU");
        Ok(Self {
            link,
            state: PsuState::Unknown,
            settle,
        })
    }

    pub fn state(&self) -> PsuState {
        self.state
    }

    fn pause(&self) {
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }
    }

    /// Turn both channels on. No-op when the supply is already known on.
    pub fn ensure_on(&mut self) -> AppResult<()> {
        if self.state == PsuState::On {
            info!("PSU already on");
            return Ok(());
        }
        info!("PSU turning on...");
        let result = self.drive_on();
        match result {
            Ok(()) => {
                self.pause();
                self.state = PsuState::On;
                info!("PSU on!");
                Ok(())
            }
            Err(e) => {
                self.state = PsuState::Unknown;
                Err(e)
            }
        }
    }

    fn drive_on(&mut self) -> AppResult<()> {
        self.link.write("INST:SEL 0")?;
        self.link
            .write(&format!("APPL {},{}", SUPPLY_VOLTS, CURRENT_LIMIT_NEG_AMPS))?;
        self.link.write("OUTP:STAT 1")?;
        self.link.write("INST:SEL 1")?;
        self.link
            .write(&format!("APPL {},{}", SUPPLY_VOLTS, CURRENT_LIMIT_POS_AMPS))?;
        self.link.write("OUTP:STAT 1")?;
        Ok(())
    }

    /// Turn every output off. No-op when the supply is already known off.
    pub fn power_off(&mut self) -> AppResult<()> {
        if self.state == PsuState::Off {
            info!("PSU already off");
            return Ok(());
        }
        info!("Turning PSU off...");
        match self.link.write("OUTP:ALL 0") {
            Ok(()) => {
                self.pause();
                self.state = PsuState::Off;
                info!("PSU off!");
                Ok(())
            }
            Err(e) => {
                self.state = PsuState::Unknown;
                Err(e)
            }
        }
    }

    pub fn close(&mut self) -> AppResult<()> {
        self.link.close()?;
        info!("Disconnected PSU");
        Ok(())
    }
}
