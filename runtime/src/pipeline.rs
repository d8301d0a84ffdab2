// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! One sampling pass: fetch both sources, derive the rate, persist, report.

use crate::acquisition::{BinanceClient, BybitClient};
use crate::config::SamplerConfig;
use crate::renderer::Renderer;
use chrono::{DateTime, Utc};
use p2p_listings::{
    derive_rate, CombinedRecord, DerivedRate, FetchResult, ListingQuery, PersistenceSink,
    SavedPaths,
};
use serde::Serialize;
use std::fmt::Write as _;

/// What to sample in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub bybit_query: ListingQuery,
    pub bybit_max_attempts: u32,
    pub binance_query: ListingQuery,
    pub binance_rows: u32,
    pub reference_amount: f64,
}

impl RunPlan {
    pub fn from_config(config: &SamplerConfig) -> Self {
        Self {
            bybit_query: config.bybit.query(),
            bybit_max_attempts: config.bybit.max_attempts,
            binance_query: config.binance.query(),
            binance_rows: config.binance.rows,
            reference_amount: config.reference_amount,
        }
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Both sources returned listings and the rate was derived.
    Complete,
    /// Some data was captured but a source or the rate is missing.
    Partial,
    /// No source contributed listings.
    Failed,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Complete => 0,
            RunStatus::Partial => 1,
            RunStatus::Failed => 2,
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub captured_at: DateTime<Utc>,
    pub bybit: FetchResult,
    pub binance: FetchResult,
    pub rate: Option<DerivedRate>,
    pub rate_error: Option<String>,
    pub record: CombinedRecord,
    pub saved: SavedPaths,
}

impl RunReport {
    /// Derive the rate and build the combined record from two fetch results.
    pub fn assemble(
        bybit: FetchResult,
        binance: FetchResult,
        reference_amount: f64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        let (bybit, rate, rate_error) =
            match derive_rate(bybit.listings(), binance.listings(), reference_amount) {
                Ok(rate) => {
                    tracing::info!("derived rate {:.4}", rate.rate);
                    (bybit.with_derived_rate(rate.rate), Some(rate), None)
                }
                Err(e) => {
                    tracing::error!("{e}");
                    (bybit, None, Some(e.to_string()))
                }
            };

        let record = CombinedRecord::combine(&bybit, &binance, captured_at);

        Self {
            captured_at,
            bybit,
            binance,
            rate,
            rate_error,
            record,
            saved: SavedPaths::default(),
        }
    }

    pub fn status(&self) -> RunStatus {
        if !self.record.success {
            RunStatus::Failed
        } else if self.bybit.has_listings() && self.binance.has_listings() && self.rate.is_some() {
            RunStatus::Complete
        } else {
            RunStatus::Partial
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.status().exit_code()
    }

    /// Human-readable summary for standard output.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "P2P Listing Sampling Results:");
        let _ = writeln!(out, "Time of sampling: {}", self.captured_at.to_rfc3339());

        for result in [&self.bybit, &self.binance] {
            let name = result.source.name();
            let fiat = &result.metadata.fiat;
            let _ = writeln!(out);
            match (result.cheapest(), result.most_expensive()) {
                (Some(low), Some(high)) if result.success => {
                    let _ = writeln!(out, "{name} Results:");
                    let _ = writeln!(out, "Number of listings: {}", result.listings().len());
                    let _ = writeln!(out, "Lowest {name} price: {} {fiat}", low.price);
                    let _ = writeln!(out, "Highest {name} price: {} {fiat}", high.price);
                }
                _ => {
                    let reason = result
                        .message
                        .as_deref()
                        .unwrap_or("no listings returned");
                    let _ = writeln!(out, "{name} fetch failed or returned no data: {reason}");
                }
            }
        }

        let _ = writeln!(out);
        match (&self.rate, &self.rate_error) {
            (Some(rate), _) => {
                let _ = writeln!(
                    out,
                    "Derived rate: {:.2} {} per {} {} (heuristic, via {})",
                    rate.rate,
                    self.bybit.metadata.fiat,
                    rate.reference_amount,
                    self.binance.metadata.fiat,
                    self.bybit.metadata.token,
                );
            }
            (None, Some(err)) => {
                let _ = writeln!(out, "Rate not derived: {err}");
            }
            (None, None) => {
                let _ = writeln!(out, "Rate not derived");
            }
        }

        let _ = writeln!(out);
        if let Some(path) = &self.saved.tabular {
            let _ = writeln!(out, "Data appended to tabular store: {}", path.display());
        }
        if let Some(path) = &self.saved.structured {
            let _ = writeln!(out, "Data appended to structured store: {}", path.display());
        }
        if self.saved.tabular.is_none() && self.saved.structured.is_none() {
            let _ = writeln!(out, "Data was not saved");
        }

        out
    }
}

/// Run one sequential pass over both sources and persist the result.
pub async fn run_once(
    renderer: &dyn Renderer,
    bybit: &BybitClient,
    binance: &BinanceClient,
    sink: &PersistenceSink,
    plan: &RunPlan,
) -> RunReport {
    let bybit_result = bybit
        .fetch_listings(renderer, &plan.bybit_query, plan.bybit_max_attempts)
        .await;
    let binance_result = binance
        .fetch_listings(&plan.binance_query, plan.binance_rows)
        .await;

    let mut report =
        RunReport::assemble(bybit_result, binance_result, plan.reference_amount, Utc::now());
    report.saved = sink.save(&report.record);
    report
}
