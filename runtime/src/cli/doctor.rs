// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment readiness check.

use crate::config::SamplerConfig;
use crate::logging;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use p2p_listings::StorageLayout;
use std::path::Path;
use std::process::Command;

/// Check config validity, Chromium availability, storage, and memory.
///
/// Returns 0 when a run could capture both sources, 1 otherwise.
pub async fn run(config: &SamplerConfig) -> Result<i32> {
    println!("P2P Sampler Doctor");
    println!("==================");
    println!();

    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let mut ready = true;

    match config.validate() {
        Ok(()) => println!("[OK] Configuration is valid"),
        Err(e) => {
            println!("[!!] Configuration is invalid: {e:#}");
            ready = false;
        }
    }

    match find_chromium(config.browser.chromium_path.as_deref()) {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => {
            println!(
                "[!!] Chromium NOT found. Set browser.chromium_path or P2P_SAMPLER_CHROMIUM_PATH."
            );
            ready = false;
        }
    }

    match check_storage(&config.storage_root) {
        Ok(()) => {
            println!(
                "[OK] Storage root {} is writable",
                config.storage_root.display()
            );
            let logs_dir = StorageLayout::new(&config.storage_root).logs_dir();
            match logging::init(&config.log_level, &logs_dir) {
                Ok(path) => println!("[OK] Logging to {}", path.display()),
                Err(e) => println!("[!!] Cannot open log file: {e:#}"),
            }
        }
        Err(e) => {
            println!(
                "[!!] Storage root {} is not writable: {e}",
                config.storage_root.display()
            );
            ready = false;
        }
    }

    match get_available_memory_mb() {
        Some(mb) if mb >= 256 => println!("[OK] Available memory: {mb}MB (>= 256MB required)"),
        Some(mb) => println!("[!!] Available memory: {mb}MB (< 256MB, browser may fail)"),
        None => println!("[??] Could not determine available memory"),
    }

    println!("[--] Bybit page:      {}", config.bybit.base_url);
    println!("[--] Binance endpoint: {}", config.binance.endpoint);

    println!();
    if ready {
        println!("Status: READY");
        Ok(0)
    } else {
        println!("Status: NOT READY");
        Ok(1)
    }
}

/// Create the storage layout and prove a file can be written inside it.
fn check_storage(root: &Path) -> Result<()> {
    let layout = StorageLayout::new(root);
    layout.ensure_dirs()?;
    tempfile::NamedTempFile::new_in(layout.json_dir())?;
    Ok(())
}

/// Get available memory in MB (platform-specific).
fn get_available_memory_mb() -> Option<u64> {
    #[cfg(target_os = "macos")]
    {
        let output = Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        let bytes: u64 = s.trim().parse().ok()?;
        Some(bytes / 1_048_576)
    }
    #[cfg(target_os = "linux")]
    {
        let output = Command::new("free").args(["-m"]).output().ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        s.lines()
            .find(|line| line.starts_with("Mem:"))
            .and_then(|line| line.split_whitespace().nth(6))
            .and_then(|available| available.parse().ok())
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}
