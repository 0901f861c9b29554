//! Progress snapshots for a single transfer (bytes done, ETA, rate).
//!
//! Strategies emit these while copying; consumers compute
//! rate = bytes_done / elapsed_secs and ETA = (total - done) / rate.

/// Snapshot of one transfer's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    /// Bytes moved so far.
    pub bytes_done: u64,
    /// Total size, when the strategy knows it.
    pub total_bytes: Option<u64>,
    /// Seconds since the transfer started on its connection.
    pub elapsed_secs: f64,
}

impl TransferProgress {
    /// Transfer rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if the total or rate is unknown).
    pub fn eta_secs(&self) -> Option<f64> {
        let total = self.total_bytes?;
        let remaining = total.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0]; None without a known total.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes? {
            0 => Some(1.0),
            total => Some((self.bytes_done as f64 / total as f64).min(1.0)),
        }
    }
}
