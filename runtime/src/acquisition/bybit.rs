// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bybit P2P listings scraped from the browser-rendered trade page.
//!
//! Page loads that time out are retried; any other failure ends the fetch
//! at once. Individual rows that cannot be read are skipped.

use crate::config::BybitSettings;
use crate::renderer::{is_timeout, RenderContext, Renderer};
use anyhow::{Context, Result};
use chrono::Utc;
use p2p_listings::{
    listing_from_row, FetchMetadata, FetchResult, Listing, ListingQuery, RawRow, Source,
    TradeDirection,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Element whose presence means the listings table has rendered.
pub const TABLE_SELECTOR: &str = "tbody";
/// One element per listing row.
pub const ROW_SELECTOR: &str = "tbody tr";

/// Returns every row as an array of its cells' visible text.
const ROW_CELLS_SCRIPT: &str = "Array.from(document.querySelectorAll('tbody tr'))\
    .map(tr => Array.from(tr.querySelectorAll('td')).map(td => td.innerText))";

/// How long to let the table re-render after it first appears.
///
/// The row count is sampled every `interval` until two consecutive samples
/// agree on a non-zero count or `max_wait` passes. This approximates "the
/// page has finished rendering"; it cannot prove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(5),
        }
    }
}

/// Poll the row count until it stops changing. Returns the last count.
pub async fn settle_rows(ctx: &dyn RenderContext, policy: &SettlePolicy) -> Result<usize> {
    let deadline = Instant::now() + policy.max_wait;
    let mut previous: Option<usize> = None;

    loop {
        tokio::time::sleep(policy.interval).await;
        let count = ctx.count_elements(ROW_SELECTOR).await?;

        if count > 0 && previous == Some(count) {
            return Ok(count);
        }
        if Instant::now() >= deadline {
            tracing::debug!(
                "row count did not settle within {:?}, proceeding with {count}",
                policy.max_wait
            );
            return Ok(count);
        }
        previous = Some(count);
    }
}

fn action_type(direction: TradeDirection) -> &'static str {
    match direction {
        TradeDirection::Buy => "1",
        TradeDirection::Sell => "0",
    }
}

/// Listings read from one successfully loaded page.
struct ScrapedPage {
    rows_seen: usize,
    listings: Vec<Listing>,
}

/// Client for the Bybit P2P trade page.
pub struct BybitClient {
    base_url: String,
    page_timeout: Duration,
    retry_delay: Duration,
    settle: SettlePolicy,
    screenshots_dir: PathBuf,
}

impl BybitClient {
    pub fn new(settings: &BybitSettings, screenshots_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            page_timeout: settings.page_timeout(),
            retry_delay: settings.retry_delay(),
            settle: SettlePolicy {
                interval: Duration::from_millis(settings.settle_interval_ms),
                max_wait: Duration::from_millis(settings.settle_max_ms),
            },
            screenshots_dir: screenshots_dir.into(),
        }
    }

    pub fn with_settle_policy(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Listings page URL for a token/fiat/direction.
    pub fn listings_url(&self, query: &ListingQuery) -> Result<String> {
        let url = url::Url::parse_with_params(
            &self.base_url,
            &[
                ("actionType", action_type(query.direction)),
                ("token", query.token.as_str()),
                ("fiat", query.fiat.as_str()),
            ],
        )
        .with_context(|| format!("invalid listings base URL: {}", self.base_url))?;
        Ok(url.to_string())
    }

    /// Scrape listings for `query`, retrying page timeouts up to `max_attempts`.
    pub async fn fetch_listings(
        &self,
        renderer: &dyn Renderer,
        query: &ListingQuery,
        max_attempts: u32,
    ) -> FetchResult {
        let metadata = FetchMetadata::for_query(query, Utc::now());

        let url = match self.listings_url(query) {
            Ok(url) => url,
            Err(e) => return FetchResult::failed(Source::Bybit, metadata, format!("Error: {e:#}")),
        };

        let mut ctx = match renderer.new_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::error!("could not open a browser context: {e:#}");
                return FetchResult::failed(Source::Bybit, metadata, format!("Error: {e:#}"));
            }
        };

        let result = self
            .fetch_with_retries(ctx.as_mut(), &url, max_attempts, metadata)
            .await;

        if let Err(e) = ctx.close().await {
            tracing::warn!("failed to close browser context: {e:#}");
        }
        result
    }

    async fn fetch_with_retries(
        &self,
        ctx: &mut dyn RenderContext,
        url: &str,
        max_attempts: u32,
        mut metadata: FetchMetadata,
    ) -> FetchResult {
        let attempts = max_attempts.max(1);

        for attempt in 1..=attempts {
            tracing::info!("attempt {attempt}/{attempts}: loading {url}");

            match self.scrape_page(ctx, url).await {
                Ok(page) => {
                    metadata.captured_at = Utc::now();
                    metadata.rows_seen = Some(page.rows_seen);
                    let result = FetchResult::succeeded(Source::Bybit, page.listings, metadata);
                    tracing::info!(
                        "Bybit page had {} rows, {} valid listings",
                        page.rows_seen,
                        result.listings().len()
                    );
                    return result;
                }
                Err(e) if is_timeout(&e) => {
                    tracing::error!("timeout waiting for content on attempt {attempt}: {e:#}");
                    if attempt < attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(e) => {
                    tracing::error!("unexpected error: {e:#}");
                    return FetchResult::failed(Source::Bybit, metadata, format!("Error: {e:#}"));
                }
            }
        }

        FetchResult::failed(
            Source::Bybit,
            metadata,
            format!("Timeout error: Page failed to load after {attempts} attempts"),
        )
    }

    fn timeout_ms(&self) -> u64 {
        self.page_timeout.as_millis() as u64
    }

    async fn scrape_page(&self, ctx: &mut dyn RenderContext, url: &str) -> Result<ScrapedPage> {
        let nav = ctx.navigate(url, self.timeout_ms()).await?;
        tracing::debug!("loaded {} in {}ms", nav.final_url, nav.load_time_ms);

        ctx.wait_for_selector(TABLE_SELECTOR, self.timeout_ms()).await?;
        settle_rows(&*ctx, &self.settle).await?;

        self.capture_screenshot(&*ctx).await;

        let raw = ctx
            .execute_js(ROW_CELLS_SCRIPT)
            .await
            .context("failed to read listing rows")?;
        let rows = raw
            .as_array()
            .with_context(|| format!("row extraction returned {raw} instead of an array"))?;

        let captured_at = Utc::now();
        let mut listings = Vec::with_capacity(rows.len());
        for (index, value) in rows.iter().enumerate() {
            let row: RawRow = match serde_json::from_value(value.clone()) {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!("error parsing row {index}: {e}");
                    continue;
                }
            };
            match listing_from_row(&row, captured_at) {
                Ok(Some(listing)) => listings.push(listing),
                Ok(None) => tracing::warn!(
                    "row {index}: no usable price in {:?}",
                    row.cells.get(1).map(String::as_str).unwrap_or_default()
                ),
                Err(e) => tracing::warn!("error parsing row {index}: {e}"),
            }
        }

        Ok(ScrapedPage {
            rows_seen: rows.len(),
            listings,
        })
    }

    /// Best-effort diagnostic screenshot; failures are only logged.
    async fn capture_screenshot(&self, ctx: &dyn RenderContext) {
        let path = screenshot_path(&self.screenshots_dir, Utc::now());
        if let Err(e) = std::fs::create_dir_all(&self.screenshots_dir) {
            tracing::warn!("cannot create {}: {e}", self.screenshots_dir.display());
            return;
        }
        match ctx.screenshot(&path).await {
            Ok(()) => tracing::info!("screenshot saved as {}", path.display()),
            Err(e) => tracing::warn!("screenshot failed: {e:#}"),
        }
    }
}

/// `bybit_page_<timestamp>.png` inside `dir`.
pub fn screenshot_path(dir: &Path, at: chrono::DateTime<Utc>) -> PathBuf {
    dir.join(format!("bybit_page_{}.png", at.format("%Y%m%d_%H%M%S_%3f")))
}
