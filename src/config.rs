//! Configuration system for the calibration workflow.
//!
//! Strongly-typed configuration loaded from a TOML file with environment
//! variable fallback (prefix `DRS4_`, nested fields separated by `__`):
//!
//! ```text
//! DRS4_SSH__HOST=drs4-ctrl DRS4_GENERATOR__HOST=sg1 single_channel 10 out.json
//! ```
//!
//! Resolution happens once at the binary boundary; the core components only
//! ever see fully populated structs and never touch the environment.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dataset::{INPUT_NUM_DOMAIN, INTEG_TIME_DOMAIN_MS};
use crate::error::{AppResult, DsbsError};

/// Top-level configuration for one calibration setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drs4Config {
    /// Remote shell connection to the correlator host.
    pub ssh: SshConfig,
    /// Signal-generator SCPI socket.
    pub generator: GeneratorConfig,
    /// Local oscillator settings used by the frequency planner.
    pub lo: LoConfig,
    /// Remote command layout on the correlator host.
    #[serde(default)]
    pub correlator: CorrelatorConfig,
    /// Acquisition parameters and orchestrator options.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
}

/// Connection parameters for the remote correlator shell.
///
/// The credential is an optional SSH identity file handed to the transport
/// as-is; nothing beyond passthrough is done with it, and it is never
/// persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Login user on the correlator host.
    pub user: String,
    /// Correlator host name or address.
    pub host: String,
    /// Identity file passed to `ssh -i`, if any.
    #[serde(default)]
    pub identity: Option<PathBuf>,
    /// Per-command timeout for remote execution.
    #[serde(with = "humantime_serde", default = "default_remote_timeout")]
    pub timeout: Duration,
}

/// Signal-generator SCPI socket parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Generator host name or address.
    pub host: String,
    /// SCPI port (default: 5025).
    #[serde(default = "default_scpi_port")]
    pub port: u16,
    /// Connect timeout for the command socket.
    #[serde(with = "humantime_serde", default = "default_scpi_timeout")]
    pub timeout: Duration,
}

/// Local oscillator settings for the frequency planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoConfig {
    /// First local oscillator frequency in GHz.
    pub freq_ghz: f64,
    /// Multiplication factor between the generator output and the LO chain.
    #[serde(default = "default_lo_multiplier")]
    pub multiplier: f64,
}

/// Remote command layout on the correlator host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// Working directory holding the correlator command binaries.
    #[serde(default = "default_cmd_dir")]
    pub cmd_dir: String,
    /// Command that programs the integration time.
    #[serde(default = "default_set_integ_cmd")]
    pub set_integ_cmd: String,
    /// Command that runs the correlation and writes the output tables.
    #[serde(default = "default_get_corr_cmd")]
    pub get_corr_cmd: String,
    /// Path of the power output table on the correlator host.
    #[serde(default = "default_power_path")]
    pub power_path: String,
    /// Path of the phase output table on the correlator host.
    #[serde(default = "default_phase_path")]
    pub phase_path: String,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            cmd_dir: default_cmd_dir(),
            set_integ_cmd: default_set_integ_cmd(),
            get_corr_cmd: default_get_corr_cmd(),
            power_path: default_power_path(),
            phase_path: default_phase_path(),
        }
    }
}

/// Acquisition parameters and orchestrator options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Correlator input the calibration tone is injected into (1 or 2).
    #[serde(default = "default_input_num")]
    pub input_num: u8,
    /// Integration time in ms; one of 100, 200, 500 or 1000.
    #[serde(default = "default_integ_time_ms")]
    pub integ_time_ms: u32,
    /// Settling delay between programming the generator and triggering.
    #[serde(with = "humantime_serde", default = "default_settle")]
    pub settle: Duration,
    /// Disable the generator output on any failure before surfacing it.
    #[serde(default = "default_cleanup_on_failure")]
    pub cleanup_on_failure: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            input_num: default_input_num(),
            integ_time_ms: default_integ_time_ms(),
            settle: default_settle(),
            cleanup_on_failure: default_cleanup_on_failure(),
        }
    }
}

// Default value functions
fn default_remote_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_scpi_port() -> u16 {
    5025
}

fn default_scpi_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_lo_multiplier() -> f64 {
    1.0
}

fn default_cmd_dir() -> String {
    "/home/drs4/cmd".to_string()
}

fn default_set_integ_cmd() -> String {
    "./set_integ_time".to_string()
}

fn default_get_corr_cmd() -> String {
    "./get_corr_result".to_string()
}

fn default_power_path() -> String {
    "/home/drs4/cmd/output/power.csv".to_string()
}

fn default_phase_path() -> String {
    "/home/drs4/cmd/output/phase.csv".to_string()
}

fn default_input_num() -> u8 {
    1
}

fn default_integ_time_ms() -> u32 {
    1000
}

fn default_settle() -> Duration {
    Duration::from_secs(1)
}

fn default_cleanup_on_failure() -> bool {
    true
}

impl Drs4Config {
    /// Load configuration from `config/drs4.toml` and environment variables.
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/drs4.toml")
    }

    /// Load configuration from a specific file path, with `DRS4_`-prefixed
    /// environment variables taking precedence over the file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DRS4_").split("__"))
            .extract()
            .map_err(|e| DsbsError::Configuration(e.to_string()))
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> AppResult<()> {
        if !INTEG_TIME_DOMAIN_MS.contains(&self.acquisition.integ_time_ms) {
            return Err(DsbsError::Configuration(format!(
                "integration time {} ms is not one of {:?}",
                self.acquisition.integ_time_ms, INTEG_TIME_DOMAIN_MS
            )));
        }
        if !INPUT_NUM_DOMAIN.contains(&self.acquisition.input_num) {
            return Err(DsbsError::Configuration(format!(
                "input number {} is not one of {:?}",
                self.acquisition.input_num, INPUT_NUM_DOMAIN
            )));
        }
        if self.lo.multiplier <= 0.0 {
            return Err(DsbsError::Configuration(format!(
                "LO multiplication factor must be positive, got {}",
                self.lo.multiplier
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
            [ssh]
            user = "drs4"
            host = "corr-host"

            [generator]
            host = "sg-host"

            [lo]
            freq_ghz = 90.0
            multiplier = 5.0
        "#
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drs4.toml");
        std::fs::write(&path, minimal_toml()).unwrap();

        let config = Drs4Config::load_from(&path).unwrap();
        assert_eq!(config.ssh.user, "drs4");
        assert_eq!(config.generator.port, 5025);
        assert_eq!(config.acquisition.integ_time_ms, 1000);
        assert_eq!(config.acquisition.settle, Duration::from_secs(1));
        assert!(config.acquisition.cleanup_on_failure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_domain_integ_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drs4.toml");
        let toml = format!("{}\n[acquisition]\ninteg_time_ms = 300\n", minimal_toml());
        std::fs::write(&path, toml).unwrap();

        let config = Drs4Config::load_from(&path).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DsbsError::Configuration(_)));
    }

    #[test]
    fn rejects_non_positive_lo_multiplier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drs4.toml");
        let toml = minimal_toml().replace("multiplier = 5.0", "multiplier = 0.0");
        std::fs::write(&path, toml).unwrap();

        let config = Drs4Config::load_from(&path).unwrap();
        assert!(config.validate().is_err());
    }
}
