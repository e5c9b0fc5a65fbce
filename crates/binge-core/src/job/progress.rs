//! Byte-level progress of a job, shared between the transfer thread and readers.
//!
//! Readers (a CLI, a UI poller) may observe these at any time; values are
//! published after every chunk written.

use std::sync::atomic::{AtomicU64, Ordering};

/// Downloaded and total byte counters.
///
/// `total_size` only ever grows: a resumed response may omit or shorten the
/// size headers, so a smaller value is ignored once a larger one is known.
#[derive(Debug, Default)]
pub struct TransferProgress {
    downloaded: AtomicU64,
    total: AtomicU64,
}

impl TransferProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes present in the destination file (including resumed bytes).
    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded.load(Ordering::Acquire)
    }

    /// Largest total size seen so far; 0 if unknown.
    pub fn total_size(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    pub(crate) fn set_downloaded(&self, bytes: u64) {
        self.downloaded.store(bytes, Ordering::Release);
    }

    /// Records `total` if it is larger than what is already known.
    pub(crate) fn raise_total(&self, total: u64) {
        self.total.fetch_max(total, Ordering::AcqRel);
    }

    /// Fraction complete in [0.0, 1.0]; 0 while the size is unknown.
    pub fn fraction(&self) -> f64 {
        let total = self.total_size();
        if total == 0 {
            return 0.0;
        }
        (self.downloaded_bytes() as f64 / total as f64).min(1.0)
    }

    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }

    /// Human-readable total size ("12.34 MB").
    pub fn size_display(&self) -> String {
        format_size(self.total_size())
    }
}

/// Formats a byte count as KB below 1 MiB, MB below 1 GiB, GB otherwise.
pub fn format_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;
    let b = bytes as f64;
    if bytes < MIB {
        format!("{:.2} KB", b / 1024.0)
    } else if bytes < GIB {
        format!("{:.2} MB", b / MIB as f64)
    } else {
        format!("{:.2} GB", b / GIB as f64)
    }
}
