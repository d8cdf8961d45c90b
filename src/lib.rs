//! # DRS4 Dual-Sideband Calibration Library
//!
//! This crate automates the single-sideband-calibration workflow for a
//! DRS4 digital correlator paired with an SCPI signal generator: steer the
//! generator to a known calibration frequency, trigger an integration on
//! the correlator over a remote shell session, retrieve the resulting
//! auto/cross-correlation spectra, and assemble a labeled measurement set
//! annotated with the acquisition metadata.
//!
//! ## Crate Structure
//!
//! - **`acquire`**: The `Acquisition` orchestrator driving the two-sideband
//!   sequence end to end.
//! - **`config`**: Strongly-typed configuration loaded from TOML with
//!   `DRS4_`-prefixed environment variable fallback.
//! - **`dataset`**: The `MeasurementRecord` struct-of-arrays dataset, its
//!   validator, and time-axis concatenation.
//! - **`decode`**: Decoding of the correlator's power and phase CSV tables
//!   into parallel column arrays.
//! - **`error`**: The `DsbsError` enum for centralized error handling.
//! - **`logging`**: Tracing initialization for the sample binaries.
//! - **`remote`**: Remote execution on the correlator host (trigger an
//!   integration, read back the output tables).
//! - **`scpi`**: Fire-and-forget SCPI command client for the generator.
//! - **`sideband`**: Sideband selection and frequency planning.
//! - **`storage`**: Dataset persistence seam with a JSON implementation.

pub mod acquire;
pub mod config;
pub mod dataset;
pub mod decode;
pub mod error;
pub mod logging;
pub mod remote;
pub mod scpi;
pub mod sideband;
pub mod storage;
