//! Custom error types for the calibration workflow.
//!
//! This module defines the primary error type, `DsbsError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failure modes of an acquisition run, from
//! socket problems on the signal-generator side to malformed correlator
//! output on the receiver side.
//!
//! Propagation policy: no error is recovered locally anywhere in the crate.
//! Every failure aborts the current acquisition run and surfaces to the
//! caller unchanged in kind. The orchestrator's best-effort generator
//! disable on the failure path never masks the original error.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, DsbsError>;

/// Primary error type for the calibration workflow.
#[derive(Error, Debug)]
pub enum DsbsError {
    /// The signal-generator socket could not be opened within the timeout.
    #[error("Connection to {addr} failed: {reason}")]
    Connection {
        /// Address the connection was attempted against.
        addr: String,
        /// Underlying failure (refusal, timeout, resolution).
        reason: String,
    },

    /// A write failed mid-sequence on an open generator socket.
    ///
    /// Partial command sequences are possible after this error; there is no
    /// rollback. The device is left in whatever state the commands written
    /// so far put it in.
    #[error("Transport failure while sending {command:?}: {source}")]
    Transport {
        /// The command whose write failed.
        command: String,
        /// The socket error.
        #[source]
        source: std::io::Error,
    },

    /// A remote correlator command exited non-zero, timed out, or could not
    /// be launched.
    #[error("Remote execution failed: {0}")]
    RemoteExecution(String),

    /// Correlator CSV output is missing a required column, or the power and
    /// phase tables have mismatched row counts.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A correlator CSV cell could not be parsed as a number.
    #[error("Decode error at row {row}, column {column:?}: {value:?} is not numeric")]
    Decode {
        /// Zero-based data row index (header excluded).
        row: usize,
        /// Column name the cell belongs to.
        column: String,
        /// The offending cell text.
        value: String,
    },

    /// A sideband value outside {USB, LSB}.
    #[error("Invalid sideband {0:?} (expected \"USB\" or \"LSB\")")]
    InvalidSideband(String),

    /// A configuration value outside its domain, for example an integration
    /// time not in {100, 200, 500, 1000} ms, or a config file that fails to
    /// load.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Two sideband records are incompatible at merge time.
    #[error("Merge error: {0}")]
    Merge(String),

    /// Writing an assembled dataset to storage failed.
    #[error("Storage error: {0}")]
    Storage(String),
}
