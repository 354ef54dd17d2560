// flashsync-api: Async client for the FlashAir-style WiFi SD card HTTP interface.
//
// The card exposes two endpoints: `command.cgi?op=100` for directory
// listings and plain `GET /<dir>/<file>` for downloads. This crate knows
// the wire formats; scheduling and network switching live in flashsync-core.

pub mod client;
pub mod error;
pub mod listing;
pub mod log_name;
pub mod transport;

pub use client::FlashAirClient;
pub use error::Error;
pub use listing::{RemoteFileEntry, decode_fat_timestamp, parse_listing};
pub use log_name::{InvalidLogName, LogName};
pub use transport::TransportConfig;
