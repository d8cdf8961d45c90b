//! Remote execution on the correlator host.
//!
//! The DRS4 correlator is driven through its control host: integration is
//! triggered by command-line tools living in a fixed working directory, and
//! the resulting tables are plain files read back with `cat`. The transport
//! is the system `ssh` binary; commands and parameters are passed as
//! discrete arguments, never interpolated into a local shell string.

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::config::{CorrelatorConfig, SshConfig};
use crate::dataset::{INPUT_NUM_DOMAIN, INTEG_TIME_DOMAIN_MS};
use crate::error::{AppResult, DsbsError};

/// One remote command execution: run a command line on the correlator host
/// and capture its standard output.
///
/// A trait seam so tests can inject a mock in place of a live host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Execute `command` remotely and return its captured stdout.
    ///
    /// # Errors
    ///
    /// [`DsbsError::RemoteExecution`] if the command exits non-zero, times
    /// out, or cannot be launched.
    async fn run(&self, command: &str) -> AppResult<String>;
}

/// Remote shell backed by the system `ssh` binary.
pub struct SshShell {
    config: SshConfig,
}

impl SshShell {
    /// Build a shell for the configured login.
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn run(&self, command: &str) -> AppResult<String> {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o").arg("BatchMode=yes");
        if let Some(identity) = &self.config.identity {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(format!("{}@{}", self.config.user, self.config.host));
        cmd.arg(command);
        cmd.stdin(Stdio::null());
        // Timing out must not leave an ssh process behind.
        cmd.kill_on_drop(true);

        tracing::debug!(host = %self.config.host, %command, "Remote exec");

        let output = timeout(self.config.timeout, cmd.output())
            .await
            .map_err(|_| {
                DsbsError::RemoteExecution(format!(
                    "remote command timed out after {:?}: {command}",
                    self.config.timeout
                ))
            })?
            .map_err(|e| DsbsError::RemoteExecution(format!("failed to launch ssh: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DsbsError::RemoteExecution(format!(
                "remote command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout).map_err(|e| {
            DsbsError::RemoteExecution(format!("remote output was not valid UTF-8: {e}"))
        })
    }
}

/// Session against the correlator's command-line tools.
pub struct CorrelatorSession {
    shell: Arc<dyn RemoteShell>,
    config: CorrelatorConfig,
}

impl CorrelatorSession {
    /// Build a session over the given shell.
    pub fn new(shell: Arc<dyn RemoteShell>, config: CorrelatorConfig) -> Self {
        Self { shell, config }
    }

    /// Program the integration time and run one integration.
    ///
    /// The whole chain (`cd` + set integration time + produce correlation
    /// result) runs as a single remote invocation and fails atomically.
    /// The integration-time tool takes the time in units of 100 ms.
    ///
    /// # Errors
    ///
    /// [`DsbsError::Configuration`] if `integ_time_ms` is not one of
    /// {100, 200, 500, 1000} or `input_num` is not 1 or 2, checked here
    /// before anything is issued to the host;
    /// [`DsbsError::RemoteExecution`] if the remote chain fails.
    pub async fn trigger(&self, input_num: u8, integ_time_ms: u32) -> AppResult<()> {
        if !INTEG_TIME_DOMAIN_MS.contains(&integ_time_ms) {
            return Err(DsbsError::Configuration(format!(
                "integration time {integ_time_ms} ms is not one of {INTEG_TIME_DOMAIN_MS:?}"
            )));
        }
        if !INPUT_NUM_DOMAIN.contains(&input_num) {
            return Err(DsbsError::Configuration(format!(
                "input number {input_num} is not one of {INPUT_NUM_DOMAIN:?}"
            )));
        }

        let chain = format!(
            "cd {}; {} --In {} --It {}; {} --In {}",
            self.config.cmd_dir,
            self.config.set_integ_cmd,
            input_num,
            integ_time_ms / 100,
            self.config.get_corr_cmd,
            input_num
        );

        tracing::info!(input_num, integ_time_ms, "Triggering integration");
        self.shell.run(&chain).await.map(|_| ())
    }

    /// Read the power and phase output tables written by the last
    /// integration. No caching: every call re-reads the remote files.
    pub async fn fetch(&self) -> AppResult<(String, String)> {
        tracing::debug!("Fetching correlation tables");
        let power = self
            .shell
            .run(&format!("cat {}", self.config.power_path))
            .await?;
        let phase = self
            .shell
            .run(&format!("cat {}", self.config.phase_path))
            .await?;
        Ok((power, phase))
    }
}

/// Mock remote shell for testing without a correlator host.
///
/// Records every command. `cat <path>` commands are answered from a table
/// of canned file contents; everything else succeeds with empty output. A
/// substring trap can be armed to fail any matching command.
#[derive(Default)]
pub struct MockShell {
    commands: Mutex<Vec<String>>,
    files: HashMap<String, String>,
    fail_containing: Option<String>,
}

impl MockShell {
    /// Create a mock shell with no canned files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `cat <path>` with the given contents.
    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    /// Fail any command containing the given substring.
    pub fn fail_containing(mut self, needle: impl Into<String>) -> Self {
        self.fail_containing = Some(needle.into());
        self
    }

    /// Commands recorded so far, in execution order.
    pub async fn commands(&self) -> Vec<String> {
        self.commands.lock().await.clone()
    }
}

#[async_trait]
impl RemoteShell for MockShell {
    async fn run(&self, command: &str) -> AppResult<String> {
        self.commands.lock().await.push(command.to_string());

        if let Some(needle) = &self.fail_containing {
            if command.contains(needle.as_str()) {
                return Err(DsbsError::RemoteExecution(format!(
                    "mock failure for {command:?}"
                )));
            }
        }

        if let Some(path) = command.strip_prefix("cat ") {
            return self.files.get(path).cloned().ok_or_else(|| {
                DsbsError::RemoteExecution(format!("cat: {path}: No such file or directory"))
            });
        }

        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(shell: MockShell) -> (Arc<MockShell>, CorrelatorSession) {
        let shell = Arc::new(shell);
        let session = CorrelatorSession::new(shell.clone(), CorrelatorConfig::default());
        (shell, session)
    }

    #[tokio::test]
    async fn trigger_composes_the_command_chain() {
        let (shell, session) = session(MockShell::new());
        session.trigger(2, 500).await.unwrap();

        let commands = shell.commands().await;
        assert_eq!(
            commands,
            vec![
                "cd /home/drs4/cmd; ./set_integ_time --In 2 --It 5; ./get_corr_result --In 2"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn trigger_rejects_integ_time_before_issuing_anything() {
        let (shell, session) = session(MockShell::new());
        let err = session.trigger(1, 300).await.unwrap_err();

        assert!(matches!(err, DsbsError::Configuration(_)), "{err}");
        assert!(shell.commands().await.is_empty());
    }

    #[tokio::test]
    async fn trigger_rejects_unknown_input_number() {
        let (shell, session) = session(MockShell::new());
        let err = session.trigger(3, 100).await.unwrap_err();

        assert!(matches!(err, DsbsError::Configuration(_)), "{err}");
        assert!(shell.commands().await.is_empty());
    }

    #[tokio::test]
    async fn fetch_reads_both_tables() {
        let (shell, session) = session(
            MockShell::new()
                .with_file("/home/drs4/cmd/output/power.csv", "freq[GHz],out0,out1\n")
                .with_file("/home/drs4/cmd/output/phase.csv", "real,imag\n"),
        );

        let (power, phase) = session.fetch().await.unwrap();
        assert_eq!(power, "freq[GHz],out0,out1\n");
        assert_eq!(phase, "real,imag\n");

        let commands = shell.commands().await;
        assert_eq!(commands.len(), 2);
        assert!(commands[0].starts_with("cat "));
    }

    #[tokio::test]
    async fn remote_failure_surfaces_unchanged() {
        let (_, session) = session(MockShell::new().fail_containing("get_corr_result"));
        let err = session.trigger(1, 100).await.unwrap_err();
        assert!(matches!(err, DsbsError::RemoteExecution(_)), "{err}");
    }
}
