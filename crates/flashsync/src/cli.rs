//! Clap derive structures for the `flashsync` binary.

use std::path::PathBuf;

use clap::Parser;

/// flashsync -- opportunistic FlashAir log sync
#[derive(Debug, Parser)]
#[command(
    name = "flashsync",
    version,
    about = "Pull engine logs off a FlashAir WiFi SD card and relay them to a collector",
    long_about = "Meant to run from cron every few minutes.\n\n\
        Each run scans for the card's access point, briefly switches the\n\
        radio onto it to download new logs, always switches back to the\n\
        home network, then copies pending logs to the collector over scp\n\
        and prunes old local copies."
)]
pub struct Cli {
    /// Configuration file
    #[arg(long, short = 'c', env = "FLASHSYNC_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Ignore the download watermark and cooldown; fetch every log on the card
    #[arg(long)]
    pub resync: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}
