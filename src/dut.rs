//! Device-under-test identity.

use std::fmt;

/// What kind of device is on the fixture. Selects the capacitance threshold
/// band and the output subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    Backplane,
    SensorArray,
    SensorModule,
}

impl ArrayKind {
    /// Directory / metadata label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Backplane => "Backplanes",
            Self::SensorArray => "Sensor Arrays",
            Self::SensorModule => "Sensor Modules",
        }
    }

    /// Numeric menu choice used by the operator prompt.
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            0 => Some(Self::Backplane),
            1 => Some(Self::SensorArray),
            2 => Some(Self::SensorModule),
            _ => None,
        }
    }

    /// Bare die and loose arrays get the interactive loopback alignment
    /// check; flex-bonded modules get single spot checks instead.
    pub fn uses_alignment_check(self) -> bool {
        matches!(self, Self::Backplane | Self::SensorArray)
    }
}

impl fmt::Display for ArrayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Transistor count per cell; selects the test plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TftType {
    OneT,
    ThreeT,
}

impl TftType {
    pub fn label(self) -> &'static str {
        match self {
            Self::OneT => "1T",
            Self::ThreeT => "3T",
        }
    }

    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            1 => Some(Self::OneT),
            3 => Some(Self::ThreeT),
            _ => None,
        }
    }
}

/// Identity of the device under test. Used for file naming, the results
/// ledger, and capacitance threshold selection; the only validation is a
/// non-empty ID.
#[derive(Debug, Clone)]
pub struct DeviceId {
    /// Array ID, e.g. `E2412-001-007-D2_T1`.
    pub id: String,
    /// Assembly stage for sensor modules, e.g. `onglass`.
    pub stage: Option<String>,
    pub kind: ArrayKind,
}

impl DeviceId {
    pub fn new(id: impl Into<String>, stage: Option<String>, kind: ArrayKind) -> Self {
        Self {
            id: id.into(),
            stage,
            kind,
        }
    }

    /// Full name used in output filenames: `{id}` or `{id}_{stage}`.
    pub fn full_name(&self) -> String {
        match &self.stage {
            Some(stage) if !stage.is_empty() => format!("{}_{}", self.id, stage),
            _ => self.id.clone(),
        }
    }

    /// Sensor type segment of the array ID (e.g. `T1` out of
    /// `E2421-002-001-E5_T1_R1-103`). Only IDs with at least three
    /// `_`-separated segments carry one.
    pub fn sensor_type(&self) -> Option<&str> {
        let segments: Vec<&str> = self.id.split('_').collect();
        if segments.len() > 2 {
            Some(segments[1])
        } else {
            None
        }
    }
}
