//! Mux controller board session over a fire-and-forget serial link.
//!
//! The firmware never replies: each command byte is written and then the
//! caller waits a fixed settle delay before the next one. There is no
//! verification that the board received or executed a command, so the settle
//! delay must be long enough for the firmware to act (see
//! `DelaySettings::serial_settle`).

use crate::error::{AppResult, TesterError};
use crate::protocol::{AddressIndex, Dimension, SecondaryPath, Trigger, CLEAR};
use log::trace;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One-way byte sink to the mux board.
pub trait MuxLink: Send {
    fn send_byte(&mut self, byte: u8) -> AppResult<()>;
}

/// Real serial link: 115200 baud, 8N1, no flow control, matching the
/// firmware's fixed port settings.
#[cfg(feature = "instrument_serial")]
pub struct SerialMuxLink {
    port: Box<dyn serialport::SerialPort>,
}

#[cfg(feature = "instrument_serial")]
impl SerialMuxLink {
    pub const BAUD_RATE: u32 = 115_200;

    pub fn open(port_name: &str) -> AppResult<Self> {
        let port = serialport::new(port_name, Self::BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_secs(1))
            .open()
            .map_err(|e| TesterError::Serial(format!("{}: {}", port_name, e)))?;
        log::info!("Connected to mux controller on {}", port_name);
        Ok(Self { port })
    }
}

#[cfg(feature = "instrument_serial")]
impl MuxLink for SerialMuxLink {
    fn send_byte(&mut self, byte: u8) -> AppResult<()> {
        use std::io::Write as _;
        self.port.write_all(&[byte])?;
        Ok(())
    }
}

/// Open the serial link, or report the missing feature when the crate was
/// built without serial support.
pub fn open_serial_link(port_name: &str) -> AppResult<Box<dyn MuxLink>> {
    #[cfg(feature = "instrument_serial")]
    {
        Ok(Box::new(SerialMuxLink::open(port_name)?))
    }
    #[cfg(not(feature = "instrument_serial"))]
    {
        let _ = port_name;
        Err(TesterError::SerialFeatureDisabled)
    }
}

/// Recording link for tests and mock runs. The byte log is shared so tests
/// can inspect the exact wire traffic after a routine finishes.
#[derive(Default)]
pub struct MockMuxLink {
    log: Arc<Mutex<Vec<u8>>>,
}

impl MockMuxLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle onto the byte log; clone before handing the link to a session.
    pub fn log_handle(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.log)
    }
}

impl MuxLink for MockMuxLink {
    fn send_byte(&mut self, byte: u8) -> AppResult<()> {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.push(byte);
        Ok(())
    }
}

/// Owned session with the mux board. All addressing goes through here so the
/// clear/path/dimension/index/trigger ordering and the settle discipline
/// live in exactly one place.
pub struct MuxController {
    link: Box<dyn MuxLink>,
    settle: Duration,
}

impl MuxController {
    pub fn new(link: Box<dyn MuxLink>, settle: Duration) -> Self {
        Self { link, settle }
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Capacitance sweeps run with a longer settle; routines swap it in and
    /// restore the old value when done.
    pub fn set_settle(&mut self, settle: Duration) -> Duration {
        std::mem::replace(&mut self.settle, settle)
    }

    fn send(&mut self, byte: u8) -> AppResult<()> {
        trace!("mux <- {:?}", byte as char);
        self.link.send_byte(byte)?;
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }
        Ok(())
    }

    /// All mux switches to high-Z, all enables off.
    pub fn clear(&mut self) -> AppResult<()> {
        self.send(CLEAR)
    }

    pub fn select_path(&mut self, path: SecondaryPath) -> AppResult<()> {
        self.send(path.byte())
    }

    pub fn select_index(&mut self, dim: Dimension, index: AddressIndex) -> AppResult<()> {
        self.send(dim.byte())?;
        self.send(index.hex_byte())
    }

    pub fn trigger(&mut self, trigger: Trigger) -> AppResult<()> {
        self.send(trigger.byte())
    }

    /// Emit one full addressing sequence:
    /// clear, path, dimension/index pairs, trigger.
    pub fn address(
        &mut self,
        path: SecondaryPath,
        dims: &[(Dimension, AddressIndex)],
        trigger: Trigger,
    ) -> AppResult<()> {
        for byte in crate::protocol::address_sequence(path, dims, trigger) {
            self.send(byte)?;
        }
        Ok(())
    }
}
