//! Tunable settings, mirroring the source's `ftp_settings_*` attributes.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FtpSettings {
    /// Diagnostic verbosity gate (0..2); values above 0 enable per-packet
    /// `log::info!`/`log::debug!` tracing.
    pub debug: u8,
    /// Synthetic inbound packet-loss percentage (0..100), for testing.
    pub pkt_loss_rx: u8,
    /// Synthetic outbound packet-loss percentage (0..100), for testing.
    pub pkt_loss_tx: u8,
    /// Requested burst-read payload size, clamped to 1..=239.
    pub burst_read_size: u8,
    /// Max concurrently outstanding gap reads once EOF has been reached.
    pub max_backlog: u32,
    /// Write block size in bytes.
    pub write_size: u8,
    /// Max outstanding (unacked) writes.
    pub write_qsize: u32,
    /// Gap/burst retry deadline.
    pub retry_time: Duration,
}

impl Default for FtpSettings {
    fn default() -> Self {
        Self {
            debug: 0,
            pkt_loss_rx: 0,
            pkt_loss_tx: 0,
            burst_read_size: 80,
            max_backlog: 5,
            write_size: 80,
            write_qsize: 5,
            retry_time: Duration::from_millis(500),
        }
    }
}
