//! VISA resource abstraction.
//!
//! The multimeter and the power supply are both SCPI instruments reached
//! through this blocking trait. The mock implementation serves configurable
//! measurement values and records traffic for tests; the real backend wraps
//! the `visa-rs` crate and is gated behind the `instrument_visa` feature.

use crate::config::SdkMode;
use crate::error::{AppResult, TesterError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Blocking VISA session: write a command, or write-and-read a query.
pub trait VisaResource: Send {
    fn write(&mut self, cmd: &str) -> AppResult<()>;

    fn query(&mut self, cmd: &str) -> AppResult<String>;

    fn close(&mut self) -> AppResult<()>;
}

/// Open a VISA session in the requested mode.
pub fn open_resource(mode: SdkMode, resource: &str) -> AppResult<Box<dyn VisaResource>> {
    match mode {
        SdkMode::Mock => Ok(Box::new(MockVisaResource::new(resource))),
        SdkMode::Real => {
            #[cfg(feature = "instrument_visa")]
            {
                Ok(Box::new(real::RealVisaResource::open(
                    resource,
                    std::time::Duration::from_secs(5),
                )?))
            }
            #[cfg(not(feature = "instrument_visa"))]
            {
                Err(TesterError::VisaFeatureDisabled)
            }
        }
    }
}

/// Shared state behind a [`MockVisaResource`]. Tests keep a handle to stage
/// measurement values and inspect the commands a routine sent.
#[derive(Debug)]
pub struct MockVisaState {
    pub identity: String,
    /// Default response to `meas:res?` when the script is empty.
    pub resistance_ohms: f64,
    /// Default response to `meas:cap?` when the script is empty.
    pub capacitance_farads: f64,
    /// Scripted resistance readings, served front to back.
    pub resistance_script: VecDeque<f64>,
    /// Scripted capacitance readings, served front to back.
    pub capacitance_script: VecDeque<f64>,
    pub writes: Vec<String>,
    pub queries: Vec<String>,
}

/// Mock VISA session for tests and dry runs without hardware.
pub struct MockVisaResource {
    state: Arc<Mutex<MockVisaState>>,
}

impl MockVisaResource {
    pub fn new(resource: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockVisaState {
                identity: format!("Mock Instrument,Model 0000,SN000,v1.0 [{}]", resource),
                resistance_ohms: 1e9,
                capacitance_farads: 0.0,
                resistance_script: VecDeque::new(),
                capacitance_script: VecDeque::new(),
                writes: Vec::new(),
                queries: Vec::new(),
            })),
        }
    }

    /// Handle onto the shared state; clone before handing the resource to a
    /// session.
    pub fn handle(&self) -> Arc<Mutex<MockVisaState>> {
        Arc::clone(&self.state)
    }
}

impl VisaResource for MockVisaResource {
    fn write(&mut self, cmd: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.writes.push(cmd.to_string());
        Ok(())
    }

    fn query(&mut self, cmd: &str) -> AppResult<String> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.queries.push(cmd.to_string());
        let response = match cmd.trim() {
            "*IDN?" => state.identity.clone(),
            "meas:res?" => {
                let value = state
                    .resistance_script
                    .pop_front()
                    .unwrap_or(state.resistance_ohms);
                format!("{:.6e}", value)
            }
            "meas:cap?" => {
                let value = state
                    .capacitance_script
                    .pop_front()
                    .unwrap_or(state.capacitance_farads);
                format!("{:.6e}", value)
            }
            _ => "0".to_string(),
        };
        Ok(response)
    }

    fn close(&mut self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(feature = "instrument_visa")]
mod real {
    use super::*;
    use log::trace;
    use std::ffi::CString;
    use std::io::{BufRead, BufReader, Write};
    use std::time::Duration;
    use visa_rs::prelude::*;

    /// Real VISA session via `visa-rs` (NI-VISA or compatible).
    pub struct RealVisaResource {
        // The resource manager must outlive the instrument session.
        _rm: DefaultRM,
        instr: Instrument,
        resource: String,
    }

    impl RealVisaResource {
        pub fn open(resource: &str, open_timeout: Duration) -> AppResult<Self> {
            let rm = DefaultRM::new().map_err(|e| TesterError::Visa(e.to_string()))?;
            let name = CString::new(resource)
                .map_err(|_| TesterError::Visa(format!("resource string {:?} has NUL", resource)))?;
            let rsc = rm
                .find_res(&name.into())
                .map_err(|e| TesterError::Visa(format!("{}: {}", resource, e)))?;
            let instr = rm
                .open(&rsc, AccessMode::NO_LOCK, open_timeout)
                .map_err(|e| TesterError::Visa(format!("{}: {}", resource, e)))?;
            log::info!("Connected to VISA instrument {}", resource);
            Ok(Self {
                _rm: rm,
                instr,
                resource: resource.to_string(),
            })
        }
    }

    impl VisaResource for RealVisaResource {
        fn write(&mut self, cmd: &str) -> AppResult<()> {
            trace!("visa {} <- {:?}", self.resource, cmd);
            (&self.instr)
                .write_all(format!("{}\n", cmd).as_bytes())
                .map_err(|e| TesterError::Visa(format!("{}: {}", self.resource, e)))?;
            Ok(())
        }

        fn query(&mut self, cmd: &str) -> AppResult<String> {
            self.write(cmd)?;
            let mut reader = BufReader::new(&self.instr);
            let mut line = String::new();
            reader
                .read_line(&mut line)
                .map_err(|e| TesterError::Visa(format!("{}: {}", self.resource, e)))?;
            trace!("visa {} -> {:?}", self.resource, line);
            Ok(line.trim().to_string())
        }

        fn close(&mut self) -> AppResult<()> {
            // Dropping the session closes it; nothing extra to flush.
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_serves_scripted_then_default_values() {
        let mut visa = MockVisaResource::new("USB0::TEST::INSTR");
        let handle = visa.handle();
        {
            let mut state = handle.lock().unwrap();
            state.resistance_ohms = 1e9;
            state.resistance_script.push_back(50.0);
        }
        let scripted: f64 = visa.query("meas:res?").unwrap().parse().unwrap();
        assert_eq!(scripted, 50.0);
        let fallback: f64 = visa.query("meas:res?").unwrap().parse().unwrap();
        assert_eq!(fallback, 1e9);
    }

    #[test]
    fn mock_records_writes_and_queries() {
        let mut visa = MockVisaResource::new("USB0::TEST::INSTR");
        let handle = visa.handle();
        visa.write("*CLS").unwrap();
        visa.query("meas:cap?").unwrap();
        let state = handle.lock().unwrap();
        assert_eq!(state.writes, vec!["*CLS"]);
        assert_eq!(state.queries, vec!["meas:cap?"]);
    }

    #[test]
    fn mock_identity_carries_the_resource_string() {
        let mut visa = MockVisaResource::new("USB0::0x05E6::0x6500::04611761::INSTR");
        let idn = visa.query("*IDN?").unwrap();
        assert!(idn.contains("04611761"));
    }

    #[test]
    fn feature_gate_reports_missing_visa_backend() {
        #[cfg(not(feature = "instrument_visa"))]
        {
            let result = open_resource(SdkMode::Real, "USB0::TEST::INSTR");
            assert!(matches!(result, Err(TesterError::VisaFeatureDisabled)));
        }
    }
}
