use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::scheduler::SchedulerConfig;
use crate::transfer::TransferOptions;

/// Lower and upper bound for the user-tunable scheduler knobs.
pub const TUNABLE_RANGE: (u32, u32) = (1, 10);

/// HTTP transfer parameters (optional `[transfer]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Body is written to disk in chunks of this many bytes.
    pub chunk_size_bytes: usize,
    /// TCP/TLS connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Abort when the rate stays below this many bytes/sec ...
    pub low_speed_limit_bytes: u32,
    /// ... for this many seconds.
    pub low_speed_time_secs: u64,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 8192,
            connect_timeout_secs: 30,
            low_speed_limit_bytes: 1024,
            low_speed_time_secs: 60,
            user_agent: concat!("binge/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Global configuration loaded from `~/.config/binge/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BingeConfig {
    /// Number of transfers allowed to run at the same time (1..=10).
    pub max_concurrent_downloads: u32,
    /// Failed attempts per job before it is given up (1..=10).
    pub max_retry_attempts: u32,
    /// Seconds a failed job waits before its next attempt (1..=10).
    pub min_retry_cooldown_secs: u32,
    /// How long shutdown waits for in-flight transfers to wind down.
    pub shutdown_timeout_secs: u64,
    /// Worker sleep when nothing is ready to run.
    pub idle_backoff_ms: u64,
    /// Default destination directory; `None` = current directory.
    pub download_dir: Option<PathBuf>,
    /// Extension used when the URL path has none (without the dot).
    pub fallback_extension: String,
    pub transfer: TransferConfig,
}

impl Default for BingeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 5,
            max_retry_attempts: 5,
            min_retry_cooldown_secs: 5,
            shutdown_timeout_secs: 5,
            idle_backoff_ms: 100,
            download_dir: None,
            fallback_extension: "mp4".to_string(),
            transfer: TransferConfig::default(),
        }
    }
}

fn clamp_tunable(value: u32) -> u32 {
    value.clamp(TUNABLE_RANGE.0, TUNABLE_RANGE.1)
}

impl BingeConfig {
    /// Copy with the tunables clamped into [`TUNABLE_RANGE`] and empty or
    /// zero values replaced by their defaults.
    pub fn normalized(&self) -> Self {
        let defaults = Self::default();
        let mut cfg = self.clone();
        cfg.max_concurrent_downloads = clamp_tunable(cfg.max_concurrent_downloads);
        cfg.max_retry_attempts = clamp_tunable(cfg.max_retry_attempts);
        cfg.min_retry_cooldown_secs = clamp_tunable(cfg.min_retry_cooldown_secs);
        if cfg.idle_backoff_ms == 0 {
            cfg.idle_backoff_ms = defaults.idle_backoff_ms;
        }
        let ext = cfg.fallback_extension.trim_start_matches('.').trim();
        cfg.fallback_extension = if ext.is_empty() {
            defaults.fallback_extension
        } else {
            ext.to_string()
        };
        if cfg.transfer.chunk_size_bytes == 0 {
            cfg.transfer.chunk_size_bytes = defaults.transfer.chunk_size_bytes;
        }
        cfg
    }

    /// Scheduler settings derived from the normalized config.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let cfg = self.normalized();
        SchedulerConfig {
            max_concurrency: cfg.max_concurrent_downloads as usize,
            retry: RetryPolicy {
                max_attempts: cfg.max_retry_attempts,
                cooldown: Duration::from_secs(u64::from(cfg.min_retry_cooldown_secs)),
            },
            idle_backoff: Duration::from_millis(cfg.idle_backoff_ms),
        }
    }

    /// Transfer options derived from the normalized config.
    pub fn transfer_options(&self) -> TransferOptions {
        let cfg = self.normalized();
        TransferOptions {
            chunk_size: cfg.transfer.chunk_size_bytes,
            connect_timeout: Duration::from_secs(cfg.transfer.connect_timeout_secs),
            low_speed_limit: cfg.transfer.low_speed_limit_bytes,
            low_speed_time: Duration::from_secs(cfg.transfer.low_speed_time_secs),
            user_agent: cfg.transfer.user_agent,
            fallback_extension: cfg.fallback_extension,
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("binge")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<BingeConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = BingeConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: BingeConfig = toml::from_str(&data)?;
    let normalized = cfg.normalized();
    if normalized != cfg {
        tracing::warn!(
            "config at {} has out-of-range values; clamped to {}..={}",
            path.display(),
            TUNABLE_RANGE.0,
            TUNABLE_RANGE.1
        );
    }
    Ok(normalized)
}
