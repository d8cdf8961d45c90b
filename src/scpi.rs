//! SCPI over TCP for the calibration signal generator.
//!
//! The generator only ever needs to be programmed, never queried, so the
//! client is fire-and-forget: one connection per command sequence, each
//! command written as an ASCII line, no response parsing, socket closed
//! before returning on every exit path.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::config::GeneratorConfig;
use crate::error::{AppResult, DsbsError};

/// Default SCPI port for lab signal generators.
pub const DEFAULT_PORT: u16 = 5025;

/// One-shot SCPI command client.
pub struct ScpiClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ScpiClient {
    /// Create a client for the given endpoint. No connection is made until
    /// [`send`](Self::send) is called.
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Send an ordered sequence of commands over a single connection.
    ///
    /// Opens exactly one socket, writes each command terminated by a
    /// newline, and closes the socket before returning. Device responses
    /// are neither read nor validated.
    ///
    /// # Errors
    ///
    /// [`DsbsError::Connection`] if the socket cannot be opened within the
    /// timeout; [`DsbsError::Transport`] if a write fails mid-sequence, in
    /// which case a partial command sequence may have reached the device.
    pub async fn send<S: AsRef<str>>(&self, commands: &[S]) -> AppResult<()> {
        let addr = format!("{}:{}", self.host, self.port);

        let mut stream = timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| DsbsError::Connection {
                addr: addr.clone(),
                reason: format!("connect timed out after {:?}", self.timeout),
            })?
            .map_err(|e| DsbsError::Connection {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        for command in commands {
            let command = command.as_ref();
            tracing::debug!(%command, "SCPI write");
            let line = format!("{command}\n");
            stream
                .write_all(line.as_bytes())
                .await
                .map_err(|e| DsbsError::Transport {
                    command: command.to_string(),
                    source: e,
                })?;
        }

        stream.flush().await.map_err(|e| DsbsError::Transport {
            command: "(flush)".to_string(),
            source: e,
        })?;

        // Dropping the stream closes the connection.
        Ok(())
    }
}

/// Operations the orchestrator needs from a signal generator.
///
/// A trait seam so tests can inject a mock in place of live hardware.
#[async_trait]
pub trait GeneratorControl: Send + Sync {
    /// Program a continuous-wave tone at `freq_ghz` and enable the output.
    async fn set_cw(&self, freq_ghz: f64) -> AppResult<()>;

    /// Disable the generator output.
    async fn disable(&self) -> AppResult<()>;
}

/// SCPI-programmed signal generator.
pub struct SignalGenerator {
    client: ScpiClient,
}

impl SignalGenerator {
    /// Build a generator client from configuration.
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            client: ScpiClient::new(config.host.clone(), config.port, config.timeout),
        }
    }
}

#[async_trait]
impl GeneratorControl for SignalGenerator {
    async fn set_cw(&self, freq_ghz: f64) -> AppResult<()> {
        tracing::info!(freq_ghz, "Programming signal generator");
        let commands = [
            "OUTP OFF".to_string(),
            "FREQ:MODE CW".to_string(),
            format!("FREQ {freq_ghz}GHZ"),
            "OUTP ON".to_string(),
        ];
        self.client.send(&commands).await
    }

    async fn disable(&self) -> AppResult<()> {
        tracing::info!("Disabling signal generator output");
        self.client.send(&["OUTP OFF"]).await
    }
}

/// Mock generator for testing without hardware.
///
/// Records every programmed frequency and disable call; can be armed to
/// fail the next `set_cw`.
#[derive(Default)]
pub struct MockGenerator {
    sent: Mutex<Vec<String>>,
    fail_set_cw: Mutex<bool>,
}

impl MockGenerator {
    /// Create a mock generator that accepts every command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set_cw` fail with a transport error.
    pub async fn fail_set_cw(&self) {
        *self.fail_set_cw.lock().await = true;
    }

    /// Commands recorded so far, in wire order.
    pub async fn sent(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl GeneratorControl for MockGenerator {
    async fn set_cw(&self, freq_ghz: f64) -> AppResult<()> {
        if *self.fail_set_cw.lock().await {
            return Err(DsbsError::Transport {
                command: format!("FREQ {freq_ghz}GHZ"),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "mock failure"),
            });
        }
        let mut sent = self.sent.lock().await;
        sent.push("OUTP OFF".to_string());
        sent.push("FREQ:MODE CW".to_string());
        sent.push(format!("FREQ {freq_ghz}GHZ"));
        sent.push("OUTP ON".to_string());
        Ok(())
    }

    async fn disable(&self) -> AppResult<()> {
        self.sent.lock().await.push("OUTP OFF".to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn writes_commands_in_order_with_newlines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            socket.read_to_string(&mut received).await.unwrap();
            received
        });

        let client = ScpiClient::new(addr.ip().to_string(), addr.port(), Duration::from_secs(5));
        client
            .send(&["OUTP OFF", "FREQ:MODE CW", "FREQ 18.04GHZ", "OUTP ON"])
            .await
            .unwrap();

        let received = server.await.unwrap();
        assert_eq!(received, "OUTP OFF\nFREQ:MODE CW\nFREQ 18.04GHZ\nOUTP ON\n");
    }

    #[tokio::test]
    async fn connect_refusal_is_a_connection_error() {
        // Bind then drop to get a port that refuses connections.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ScpiClient::new(addr.ip().to_string(), addr.port(), Duration::from_secs(1));
        let err = client.send(&["OUTP OFF"]).await.unwrap_err();
        assert!(matches!(err, DsbsError::Connection { .. }), "{err}");
    }

    #[tokio::test]
    async fn generator_sequence_ends_with_output_enable() {
        let mock = MockGenerator::new();
        mock.set_cw(17.96).await.unwrap();

        let sent = mock.sent().await;
        assert_eq!(
            sent,
            vec!["OUTP OFF", "FREQ:MODE CW", "FREQ 17.96GHZ", "OUTP ON"]
        );
    }
}
