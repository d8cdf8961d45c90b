//! Two-sideband calibration measurement of a single signal channel.
//!
//! Programs the signal generator for the USB tone, integrates, repeats for
//! the LSB tone, and writes the merged dataset to a JSON file. The
//! generator output is disabled on the way out even when the run fails.
//!
//! ```bash
//! single_channel 10 out/chan10.json --config config/drs4.toml
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use drs4_dsbs::acquire::Acquisition;
use drs4_dsbs::config::Drs4Config;
use drs4_dsbs::remote::{CorrelatorSession, SshShell};
use drs4_dsbs::scpi::SignalGenerator;
use drs4_dsbs::storage::{DatasetWriter, JsonWriter};

#[derive(Parser)]
#[command(
    name = "single_channel",
    about = "Two-sideband calibration measurement of a single signal channel"
)]
struct Cli {
    /// Signal channel number the calibration tone targets
    signal_chan: u32,

    /// Output file for the merged dataset (JSON)
    output: PathBuf,

    /// Configuration file
    #[arg(long, default_value = "config/drs4.toml")]
    config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    drs4_dsbs::logging::init(&cli.log_level)?;

    let config = Drs4Config::load_from(&cli.config)?;
    config.validate()?;

    let generator = Arc::new(SignalGenerator::new(&config.generator));
    let shell = Arc::new(SshShell::new(config.ssh.clone()));
    let session = CorrelatorSession::new(shell, config.correlator.clone());
    let acquisition = Acquisition::new(generator, session, config.lo.clone(), &config.acquisition);

    let result = acquisition.run(cli.signal_chan).await;

    // Never leave the calibration tone running, success or not.
    if let Err(err) = acquisition.stop().await {
        warn!(error = %err, "Failed to disable generator output on exit");
    }

    let record = result?;
    let mut writer = JsonWriter::new(&cli.output);
    writer.write(&record).await?;

    Ok(())
}
