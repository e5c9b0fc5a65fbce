//! `binge config` – show where the config lives and what is in effect.

use anyhow::Result;
use binge_core::config::{self, BingeConfig};
use binge_core::logging;

pub fn run_config(cfg: &BingeConfig) -> Result<()> {
    println!("config: {}", config::config_path()?.display());
    if let Ok(log) = logging::log_file_path() {
        println!("log:    {}", log.display());
    }
    let effective = cfg.normalized();
    let dir = match &effective.download_dir {
        Some(dir) => dir.display().to_string(),
        None => "(current directory)".to_string(),
    };
    println!();
    println!("download dir:             {}", dir);
    println!("max concurrent downloads: {}", effective.max_concurrent_downloads);
    println!("max retry attempts:       {}", effective.max_retry_attempts);
    println!("retry cool-down:          {}s", effective.min_retry_cooldown_secs);
    println!("shutdown timeout:         {}s", effective.shutdown_timeout_secs);
    println!("fallback extension:       .{}", effective.fallback_extension);
    println!("chunk size:               {} bytes", effective.transfer.chunk_size_bytes);
    println!("user agent:               {}", effective.transfer.user_agent);
    Ok(())
}
