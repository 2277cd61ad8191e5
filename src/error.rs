//! Custom error types for the application.
//!
//! `TesterError` consolidates the failure modes of the tester: configuration
//! problems, I/O, instrument link errors on either the serial or the VISA
//! side, malformed instrument responses, and protocol misuse (an address
//! outside the 16-wide mux space). Feature-gated backends surface a
//! dedicated variant telling the user which feature to rebuild with.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, TesterError>;

#[derive(Error, Debug)]
pub enum TesterError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error("VISA error: {0}")]
    Visa(String),

    #[error("VISA support not enabled. Rebuild with --features instrument_visa")]
    VisaFeatureDisabled,

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Mux address index {0} out of range (0-15)")]
    AddressOutOfRange(u8),

    #[error("Malformed instrument response '{response}'")]
    BadResponse { response: String },

    #[error("Shutdown failed with errors")]
    ShutdownFailed(Vec<TesterError>),

    #[error("Prompt input ended unexpectedly")]
    PromptEof,

    #[error("Operator requested exit")]
    OperatorExit,
}
