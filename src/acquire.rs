//! Two-sideband acquisition orchestration.
//!
//! The orchestrator drives the end-to-end sequence for one calibration
//! measurement: program the generator for the planned frequency, let the
//! hardware settle, trigger an integration, retrieve and decode the
//! correlator output, and assemble a labeled record. The sequence runs
//! once per sideband (USB then LSB) and the two records are concatenated
//! along `time`.
//!
//! # State Machine
//!
//! ```text
//! Idle -> Programming(sb) -> Triggering -> Fetching -> Assembled(sb) -> Idle
//! ```
//!
//! run twice, then a final `Merging` state produces the concatenated pair.
//! Any failure in any state aborts the whole two-sideband run; no partial
//! pair is ever returned. When cleanup-on-failure is enabled, the
//! generator output is disabled best-effort before the original error
//! surfaces; a cleanup failure is logged and never masks it.
//!
//! The workflow is strictly sequential: the correlator and the generator
//! are singleton physical resources, so an `Acquisition` must not be run
//! re-entrantly from multiple tasks without external mutual exclusion.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{AcquisitionConfig, LoConfig};
use crate::dataset::MeasurementRecord;
use crate::decode;
use crate::error::AppResult;
use crate::remote::CorrelatorSession;
use crate::scpi::GeneratorControl;
use crate::sideband::{signal_freq, Sideband};

/// Orchestrator state, advanced strictly in sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    /// No acquisition in progress.
    Idle,
    /// Programming the signal generator for one sideband.
    Programming(Sideband),
    /// Triggering an integration on the correlator.
    Triggering,
    /// Retrieving and decoding the correlator output.
    Fetching,
    /// One sideband record assembled.
    Assembled(Sideband),
    /// Concatenating the two sideband records.
    Merging,
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionState::Idle => write!(f, "idle"),
            AcquisitionState::Programming(sb) => write!(f, "programming({sb})"),
            AcquisitionState::Triggering => write!(f, "triggering"),
            AcquisitionState::Fetching => write!(f, "fetching"),
            AcquisitionState::Assembled(sb) => write!(f, "assembled({sb})"),
            AcquisitionState::Merging => write!(f, "merging"),
        }
    }
}

/// End-to-end two-sideband acquisition runner.
pub struct Acquisition {
    generator: Arc<dyn GeneratorControl>,
    session: CorrelatorSession,
    lo: LoConfig,
    input_num: u8,
    integ_time_ms: u32,
    settle: Duration,
    cleanup_on_failure: bool,
    state: RwLock<AcquisitionState>,
}

impl Acquisition {
    /// Build an orchestrator over the given generator and correlator
    /// session.
    pub fn new(
        generator: Arc<dyn GeneratorControl>,
        session: CorrelatorSession,
        lo: LoConfig,
        options: &AcquisitionConfig,
    ) -> Self {
        Self {
            generator,
            session,
            lo,
            input_num: options.input_num,
            integ_time_ms: options.integ_time_ms,
            settle: options.settle,
            cleanup_on_failure: options.cleanup_on_failure,
            state: RwLock::new(AcquisitionState::Idle),
        }
    }

    /// Current orchestrator state.
    pub async fn state(&self) -> AcquisitionState {
        *self.state.read().await
    }

    async fn enter(&self, state: AcquisitionState) {
        debug!(%state, "Acquisition state");
        *self.state.write().await = state;
    }

    /// Run the full two-sideband sequence for one signal channel and
    /// return the merged record (`time` length 2).
    ///
    /// # Errors
    ///
    /// The originating component's error kind, unchanged: connection and
    /// transport failures from the generator, remote execution failures
    /// from the correlator, schema/decode failures from the tables, and
    /// merge failures from the final concatenation.
    pub async fn run(&self, signal_chan: u32) -> AppResult<MeasurementRecord> {
        let result = self.run_inner(signal_chan).await;

        if let Err(err) = &result {
            warn!(error = %err, "Acquisition aborted");
            if self.cleanup_on_failure {
                if let Err(cleanup_err) = self.generator.disable().await {
                    // The original error takes precedence over cleanup noise.
                    warn!(error = %cleanup_err, "Generator disable after failure also failed");
                }
            }
            self.enter(AcquisitionState::Idle).await;
        }

        result
    }

    async fn run_inner(&self, signal_chan: u32) -> AppResult<MeasurementRecord> {
        let usb = self.acquire_sideband(signal_chan, Sideband::Usb).await?;
        let lsb = self.acquire_sideband(signal_chan, Sideband::Lsb).await?;

        self.enter(AcquisitionState::Merging).await;
        let merged = usb.concat(lsb)?;
        self.enter(AcquisitionState::Idle).await;

        info!(
            signal_chan,
            n_chan = merged.n_chan(),
            "Two-sideband acquisition complete"
        );
        Ok(merged)
    }

    async fn acquire_sideband(
        &self,
        signal_chan: u32,
        signal_sb: Sideband,
    ) -> AppResult<MeasurementRecord> {
        self.enter(AcquisitionState::Programming(signal_sb)).await;
        let freq_ghz = signal_freq(&self.lo, signal_chan, signal_sb);
        info!(signal_chan, %signal_sb, freq_ghz, "Programming calibration tone");
        self.generator.set_cw(freq_ghz).await?;

        if !self.settle.is_zero() {
            debug!(settle = ?self.settle, "Settling before trigger");
            sleep(self.settle).await;
        }

        self.enter(AcquisitionState::Triggering).await;
        self.session.trigger(self.input_num, self.integ_time_ms).await?;

        self.enter(AcquisitionState::Fetching).await;
        let (power_csv, phase_csv) = self.session.fetch().await?;
        let columns = decode::decode(&power_csv, &phase_csv)?;
        let record = MeasurementRecord::assemble(
            Utc::now(),
            signal_chan,
            signal_sb,
            self.input_num,
            self.integ_time_ms,
            columns,
        )?;

        self.enter(AcquisitionState::Assembled(signal_sb)).await;
        Ok(record)
    }

    /// Disable the generator output unconditionally.
    ///
    /// Used by entry points on their way out so an aborted session never
    /// leaves the calibration tone running.
    pub async fn stop(&self) -> AppResult<()> {
        self.generator.disable().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorrelatorConfig;
    use crate::error::DsbsError;
    use crate::remote::MockShell;
    use crate::scpi::MockGenerator;

    const POWER: &str = "freq[GHz],out0,out1\n90.0,1.5,2.5\n90.02,1.6,2.6\n";
    const PHASE: &str = "real,imag\n0.1,0.2\n0.3,0.4\n";

    fn options() -> AcquisitionConfig {
        AcquisitionConfig {
            input_num: 1,
            integ_time_ms: 500,
            settle: Duration::ZERO,
            cleanup_on_failure: true,
        }
    }

    fn lo() -> LoConfig {
        LoConfig {
            freq_ghz: 90.0,
            multiplier: 5.0,
        }
    }

    fn acquisition(generator: Arc<MockGenerator>, shell: Arc<MockShell>) -> Acquisition {
        let session = CorrelatorSession::new(shell, CorrelatorConfig::default());
        Acquisition::new(generator, session, lo(), &options())
    }

    fn shell_with_tables() -> MockShell {
        let config = CorrelatorConfig::default();
        MockShell::new()
            .with_file(config.power_path, POWER)
            .with_file(config.phase_path, PHASE)
    }

    #[tokio::test]
    async fn runs_both_sidebands_and_merges() {
        let generator = Arc::new(MockGenerator::new());
        let shell = Arc::new(shell_with_tables());
        let acquisition = acquisition(generator.clone(), shell.clone());

        let record = acquisition.run(10).await.unwrap();
        assert_eq!(record.n_time(), 2);
        assert_eq!(record.n_chan(), 2);
        assert_eq!(record.signal_sb, vec![Sideband::Usb, Sideband::Lsb]);
        assert_eq!(record.signal_chan, vec![10, 10]);
        assert_eq!(acquisition.state().await, AcquisitionState::Idle);

        // USB then LSB tone frequencies, in programming order.
        let sent = generator.sent().await;
        assert!(sent.contains(&"FREQ 18.04GHZ".to_string()));
        assert!(sent.contains(&"FREQ 17.96GHZ".to_string()));

        // Two triggers and two fetch pairs.
        let commands = shell.commands().await;
        assert_eq!(commands.len(), 6);
        assert!(commands[0].contains("--It 5"));
    }

    #[tokio::test]
    async fn remote_failure_aborts_and_disables_generator() {
        let generator = Arc::new(MockGenerator::new());
        let shell = Arc::new(MockShell::new().fail_containing("get_corr_result"));
        let acquisition = acquisition(generator.clone(), shell);

        let err = acquisition.run(10).await.unwrap_err();
        assert!(matches!(err, DsbsError::RemoteExecution(_)), "{err}");
        assert_eq!(acquisition.state().await, AcquisitionState::Idle);

        // Cleanup sent a final OUTP OFF after the USB programming sequence.
        let sent = generator.sent().await;
        assert_eq!(sent.last().map(String::as_str), Some("OUTP OFF"));
        assert!(sent.contains(&"FREQ 18.04GHZ".to_string()));
    }

    #[tokio::test]
    async fn generator_failure_aborts_without_partial_pair() {
        let generator = Arc::new(MockGenerator::new());
        generator.fail_set_cw().await;
        let shell = Arc::new(shell_with_tables());
        let acquisition = acquisition(generator, shell.clone());

        let err = acquisition.run(10).await.unwrap_err();
        assert!(matches!(err, DsbsError::Transport { .. }), "{err}");
        // Nothing was issued to the correlator host.
        assert!(shell.commands().await.is_empty());
    }

    #[tokio::test]
    async fn cleanup_can_be_disabled() {
        let generator = Arc::new(MockGenerator::new());
        let shell = Arc::new(MockShell::new().fail_containing("set_integ_time"));
        let session = CorrelatorSession::new(shell, CorrelatorConfig::default());
        let mut options = options();
        options.cleanup_on_failure = false;
        let acquisition = Acquisition::new(generator.clone(), session, lo(), &options);

        acquisition.run(10).await.unwrap_err();

        // The last generator command is still the USB enable, not OUTP OFF.
        let sent = generator.sent().await;
        assert_eq!(sent.last().map(String::as_str), Some("OUTP ON"));
    }

    #[tokio::test]
    async fn stop_disables_the_generator() {
        let generator = Arc::new(MockGenerator::new());
        let shell = Arc::new(MockShell::new());
        let acquisition = acquisition(generator.clone(), shell);

        acquisition.stop().await.unwrap();
        assert_eq!(generator.sent().await, vec!["OUTP OFF".to_string()]);
    }
}
