// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! `p2p-sampler run`: one sampling pass over both sources.

use crate::acquisition::{BinanceClient, BybitClient};
use crate::config::SamplerConfig;
use crate::logging;
use crate::pipeline::{run_once, RunPlan};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::{NoopRenderer, Renderer};
use anyhow::{Context, Result};
use p2p_listings::{PersistenceSink, StorageLayout, TradeDirection};
use tracing::{info, warn};

/// Per-run overrides of the loaded config.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    /// Notional amount of the Binance fiat used for the derived rate
    #[arg(long)]
    pub reference_amount: Option<f64>,
    /// Fiat currency for the Bybit page (e.g. NGN)
    #[arg(long)]
    pub bybit_fiat: Option<String>,
    /// Fiat currency for the Binance search (e.g. XAF)
    #[arg(long)]
    pub binance_fiat: Option<String>,
    /// Token shared by both sources (e.g. USDT)
    #[arg(long)]
    pub token: Option<String>,
    /// Trade side for both sources (buy or sell)
    #[arg(long)]
    pub direction: Option<TradeDirection>,
    /// Page load attempts for Bybit
    #[arg(long)]
    pub max_attempts: Option<u32>,
    /// Number of Binance advertisements to request
    #[arg(long)]
    pub rows: Option<u32>,
    /// Show the browser window
    #[arg(long)]
    pub headful: bool,
    /// Print the report as JSON instead of the text summary
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn apply(&self, config: &mut SamplerConfig) {
        if let Some(amount) = self.reference_amount {
            config.reference_amount = amount;
        }
        if let Some(fiat) = &self.bybit_fiat {
            config.bybit.fiat = fiat.clone();
        }
        if let Some(fiat) = &self.binance_fiat {
            config.binance.fiat = fiat.clone();
        }
        if let Some(token) = &self.token {
            config.bybit.token = token.clone();
            config.binance.token = token.clone();
        }
        if let Some(direction) = self.direction {
            config.bybit.direction = direction;
            config.binance.direction = direction;
        }
        if let Some(attempts) = self.max_attempts {
            config.bybit.max_attempts = attempts;
        }
        if let Some(rows) = self.rows {
            config.binance.rows = rows;
        }
        if self.headful {
            config.browser.headless = false;
        }
    }
}

/// Run once and return the process exit code.
///
/// Errors returned from here happen before any fetch.
pub async fn run(mut config: SamplerConfig, args: &RunArgs) -> Result<i32> {
    args.apply(&mut config);
    config.validate()?;

    let layout = StorageLayout::new(&config.storage_root);
    layout
        .ensure_dirs()
        .with_context(|| format!("cannot prepare storage root {}", layout.root().display()))?;
    let log_path = logging::init(&config.log_level, &layout.logs_dir())?;
    info!(
        "p2p-sampler v{} starting, logging to {}",
        env!("CARGO_PKG_VERSION"),
        log_path.display()
    );

    let binance = BinanceClient::new(&config.binance).context("failed to build HTTP client")?;
    let bybit = BybitClient::new(&config.bybit, layout.screenshots_dir());
    let sink = PersistenceSink::new(&layout);
    let plan = RunPlan::from_config(&config);

    let renderer: Box<dyn Renderer> = match ChromiumRenderer::launch(&config.browser).await {
        Ok(r) => Box::new(r),
        Err(e) => {
            warn!("browser unavailable, Bybit will be skipped: {e:#}");
            Box::new(NoopRenderer)
        }
    };

    let report = run_once(renderer.as_ref(), &bybit, &binance, &sink, &plan).await;

    if let Err(e) = renderer.shutdown().await {
        warn!("browser shutdown failed: {e:#}");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_summary());
    }

    info!("run finished with status {:?}", report.status());
    Ok(report.exit_code())
}
