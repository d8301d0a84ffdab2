// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-based renderer using chromiumoxide.

use super::{NavigationResult, RenderContext, RenderTimeout, Renderer};
use crate::config::BrowserSettings;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Environment variable pointing at a Chromium binary.
pub const CHROMIUM_PATH_ENV: &str = "P2P_SAMPLER_CHROMIUM_PATH";

/// Interval between element presence checks.
const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Configured path
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    // 2. P2P_SAMPLER_CHROMIUM_PATH env
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. ~/.p2p-sampler/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".p2p-sampler/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".p2p-sampler/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".p2p-sampler/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".p2p-sampler/chromium/chrome-linux64/chrome"),
                home.join(".p2p-sampler/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 4. System PATH
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// CDP messages for a script that raced a document replacement.
const NAVIGATION_CHURN: [&str; 2] = [
    "Execution context was destroyed",
    "Cannot find context with specified id",
];

/// Whether an evaluation error only means the document was swapped mid-call.
///
/// Those are retried by the element wait; anything else is a real failure.
pub fn is_navigation_churn(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let message = cause.to_string();
        NAVIGATION_CHURN.iter().any(|m| message.contains(m))
    })
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance configured from `settings`.
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let chrome_path = find_chromium(settings.chromium_path.as_deref()).with_context(|| {
            format!("Chromium not found. Install Chrome or set {CHROMIUM_PATH_ENV}.")
        })?;
        tracing::debug!("launching Chromium at {}", chrome_path.display());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(settings.window_width, settings.window_height)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-extensions")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={}", settings.user_agent));
        builder = if settings.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Drive the CDP connection until the browser goes away.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {e}");
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            tracing::warn!("browser did not close cleanly: {e}");
        }
        let _ = browser.wait().await;
        self.handler.abort();
        tracing::info!("browser session closed");
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;

                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(CdpError::Timeout)) | Err(_) => {
                Err(RenderTimeout::new(format!("navigation to {url}"), timeout_ms).into())
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.count_elements(selector)).await {
                Ok(Ok(count)) if count > 0 => return Ok(()),
                Ok(Ok(_)) | Err(_) => {}
                Ok(Err(e)) if is_navigation_churn(&e) => {
                    tracing::debug!("page changed while waiting for `{selector}`: {e:#}");
                }
                Ok(Err(e)) => {
                    return Err(e.context(format!("failed while waiting for `{selector}`")));
                }
            }

            if Instant::now() >= deadline {
                return Err(
                    RenderTimeout::new(format!("waiting for `{selector}`"), timeout_ms).into(),
                );
            }
            tokio::time::sleep(SELECTOR_POLL.min(remaining)).await;
        }
    }

    async fn count_elements(&self, selector: &str) -> Result<usize> {
        let quoted = serde_json::to_string(selector)?;
        let value = self
            .execute_js(&format!("document.querySelectorAll({quoted}).length"))
            .await?;
        value
            .as_u64()
            .map(|n| n as usize)
            .with_context(|| format!("element count for `{selector}` was not a number: {value}"))
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page
            .save_screenshot(params, path)
            .await
            .with_context(|| format!("failed to save screenshot to {}", path.display()))?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_wait_count_and_screenshot() {
        let renderer = ChromiumRenderer::launch(&BrowserSettings::default())
            .await
            .expect("failed to launch renderer");
        let mut ctx = renderer
            .new_context()
            .await
            .expect("failed to create context");

        let nav = ctx
            .navigate(
                "data:text/html,<table><tbody><tr><td>a</td><td>1,450.00</td></tr></tbody></table>",
                10000,
            )
            .await
            .expect("navigation failed");
        assert!(nav.load_time_ms < 10000);

        ctx.wait_for_selector("tbody", 5000)
            .await
            .expect("tbody never appeared");
        assert_eq!(ctx.count_elements("tbody tr").await.unwrap(), 1);

        let err = ctx.wait_for_selector("thead", 600).await.unwrap_err();
        assert!(crate::renderer::is_timeout(&err));

        let dir = tempfile::tempdir().unwrap();
        let shot = dir.path().join("page.png");
        ctx.screenshot(&shot).await.expect("screenshot failed");
        assert!(shot.exists());

        ctx.close().await.expect("close failed");
        assert_eq!(renderer.active_contexts(), 0);

        renderer.shutdown().await.expect("shutdown failed");
    }

    #[test]
    fn test_navigation_churn_is_recognised_through_context() {
        let churn = anyhow::anyhow!("Execution context was destroyed.").context("JS execution failed");
        assert!(is_navigation_churn(&churn));

        let gone = anyhow::anyhow!("Target closed").context("JS execution failed");
        assert!(!is_navigation_churn(&gone));
    }

    #[test]
    fn test_find_chromium_prefers_existing_explicit_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(find_chromium(Some(file.path())), Some(file.path().to_path_buf()));
    }
}
