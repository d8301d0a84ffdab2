// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations for the p2p-sampler binary.

pub mod doctor;
pub mod history_cmd;
pub mod run_cmd;

use crate::config::SamplerConfig;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct GlobalArgs {
    /// Path to a TOML config file (default: ./p2p-sampler.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Root directory for logs, screenshots and data stores
    #[arg(long, global = true, env = "P2P_SAMPLER_STORAGE_ROOT")]
    pub storage_root: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (e.g. "info", "debug")
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

/// Load the config file and apply the global overrides.
pub fn resolve_config(global: &GlobalArgs) -> Result<SamplerConfig> {
    let mut config = SamplerConfig::load(global.config.as_deref().map(Path::new))?;
    if let Some(root) = &global.storage_root {
        config.storage_root = root.clone();
    }
    if let Some(level) = &global.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}
