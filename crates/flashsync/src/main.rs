mod cli;
mod error;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use flashsync_api::{FlashAirClient, TransportConfig};
use flashsync_core::{RunOutcome, RunReport, ScpRelay, Syncer, WpaCli};

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.unwrap_or_else(flashsync_config::config_path);
    let config = flashsync_config::load(&config_path, cli.resync)
        .map_err(|e| CliError::config(e, &config_path))?;

    let wifi = WpaCli::new(
        config.interface.clone(),
        config.timeouts.command,
        config.timeouts.scan_settle,
    );

    let transport = TransportConfig::default().with_timeout(config.timeouts.listing);
    let base_url =
        FlashAirClient::base_url_for(&config.device.address).map_err(CliError::Client)?;
    let device = FlashAirClient::new(base_url, &transport).map_err(CliError::Client)?;

    let relay = ScpRelay::new(config.remote.clone(), config.timeouts.transfer);

    tracing::debug!(config = %config_path.display(), "starting run");
    let report = Syncer::new(&config, &wifi, &device, &relay).run().await?;
    log_report(&report);
    Ok(())
}

fn log_report(report: &RunReport) {
    let downloaded = report.download.as_ref().map_or(0, |d| d.downloaded.len());
    let relayed = report.relay.as_ref().map_or(0, |r| r.relayed.len());
    let failed = report.download.as_ref().map_or(0, |d| d.failed.len())
        + report.relay.as_ref().map_or(0, |r| r.failed.len());
    let pruned = report.retention.as_ref().map_or(0, |r| r.deleted.len());

    match report.outcome {
        RunOutcome::LockHeld => {}
        RunOutcome::Stranded => {
            error!(
                switch_home_attempts = report.switch_home_attempts,
                "run ended off the home network"
            );
        }
        RunOutcome::Completed { device } => {
            info!(%device, downloaded, relayed, failed, pruned, "sync complete");
        }
    }
}
