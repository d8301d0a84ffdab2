// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scripted in-memory renderer shared by the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use p2p_sampler::acquisition::bybit::SettlePolicy;
use p2p_sampler::acquisition::BybitClient;
use p2p_sampler::config::BybitSettings;
use p2p_sampler::renderer::{NavigationResult, RenderContext, RenderTimeout, Renderer};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What one navigation does.
#[derive(Debug, Clone)]
pub enum Attempt {
    /// Navigation times out.
    Timeout,
    /// Navigation fails with a non-timeout error.
    Fail(String),
    /// Page loads but the listings table never appears in time.
    TableTimeout,
    /// Page loads, then the table wait fails with a non-timeout error.
    TableFail(String),
    /// Page loads with these rows, each a list of cell texts.
    Page(Vec<Vec<String>>),
}

/// How the table wait behaves on the current page.
#[derive(Debug, Clone)]
enum TableWait {
    Ready,
    Timeout,
    Fail(String),
}

/// Build a page from string slices.
pub fn page(rows: &[&[&str]]) -> Attempt {
    Attempt::Page(
        rows.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect(),
    )
}

/// Counters observed across all contexts of one renderer.
#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub contexts_opened: usize,
    pub contexts_closed: usize,
    pub navigations: usize,
    pub screenshots: usize,
    pub urls: Vec<String>,
}

struct Shared {
    script: VecDeque<Attempt>,
    stats: Stats,
}

pub struct ScriptedRenderer {
    shared: Arc<Mutex<Shared>>,
    refuse_contexts: bool,
    fail_screenshots: bool,
}

impl ScriptedRenderer {
    /// Navigations past the end of the script time out.
    pub fn new(script: Vec<Attempt>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                script: script.into(),
                stats: Stats::default(),
            })),
            refuse_contexts: false,
            fail_screenshots: false,
        }
    }

    pub fn refusing_contexts() -> Self {
        Self {
            refuse_contexts: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_failing_screenshots(mut self) -> Self {
        self.fail_screenshots = true;
        self
    }

    pub fn stats(&self) -> Stats {
        self.shared.lock().unwrap().stats.clone()
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        if self.refuse_contexts {
            return Err(anyhow!("browser not available"));
        }
        self.shared.lock().unwrap().stats.contexts_opened += 1;
        Ok(Box::new(ScriptedContext {
            shared: Arc::clone(&self.shared),
            rows: Vec::new(),
            table: TableWait::Ready,
            fail_screenshots: self.fail_screenshots,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        let stats = &self.shared.lock().unwrap().stats;
        stats.contexts_opened - stats.contexts_closed
    }
}

struct ScriptedContext {
    shared: Arc<Mutex<Shared>>,
    rows: Vec<Vec<String>>,
    table: TableWait,
    fail_screenshots: bool,
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let next = {
            let mut shared = self.shared.lock().unwrap();
            shared.stats.navigations += 1;
            shared.stats.urls.push(url.to_string());
            shared.script.pop_front().unwrap_or(Attempt::Timeout)
        };
        let (table, rows) = match next {
            Attempt::Timeout => {
                return Err(RenderTimeout::new(format!("navigation to {url}"), timeout_ms).into())
            }
            Attempt::Fail(message) => return Err(anyhow!(message)),
            Attempt::TableTimeout => (TableWait::Timeout, Vec::new()),
            Attempt::TableFail(message) => (TableWait::Fail(message), Vec::new()),
            Attempt::Page(rows) => (TableWait::Ready, rows),
        };
        self.table = table;
        self.rows = rows;
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 1,
        })
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        match &self.table {
            TableWait::Ready => Ok(()),
            TableWait::Timeout => {
                Err(RenderTimeout::new(format!("waiting for `{selector}`"), timeout_ms).into())
            }
            TableWait::Fail(message) => Err(anyhow!(message.clone())
                .context(format!("failed while waiting for `{selector}`"))),
        }
    }

    async fn count_elements(&self, _selector: &str) -> Result<usize> {
        Ok(self.rows.len())
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.rows)?)
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        if self.fail_screenshots {
            return Err(anyhow!("capture failed"));
        }
        std::fs::write(path, b"\x89PNG")?;
        self.shared.lock().unwrap().stats.screenshots += 1;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.shared.lock().unwrap().stats.contexts_closed += 1;
        Ok(())
    }
}

/// A Bybit client with millisecond-scale waits.
pub fn fast_bybit_client(screenshots_dir: &Path) -> BybitClient {
    BybitClient::new(&BybitSettings::default(), screenshots_dir)
        .with_retry_delay(Duration::from_millis(1))
        .with_settle_policy(SettlePolicy {
            interval: Duration::from_millis(1),
            max_wait: Duration::from_millis(20),
        })
}
