// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! `p2p-sampler history`: recent records from the structured store.

use crate::config::SamplerConfig;
use crate::logging;
use anyhow::{Context, Result};
use p2p_listings::{CombinedRecord, PersistenceSink, Source, StorageLayout};

/// Print the last `limit` records, oldest first.
pub async fn run(config: &SamplerConfig, limit: usize, json: bool) -> Result<()> {
    let layout = StorageLayout::new(&config.storage_root);
    logging::init(&config.log_level, &layout.logs_dir())?;

    let sink = PersistenceSink::new(&layout);
    let records = sink
        .load_records()
        .with_context(|| format!("failed to read {}", sink.structured_path().display()))?;

    let recent = last_n(&records, limit);

    if json {
        println!("{}", serde_json::to_string_pretty(recent)?);
        return Ok(());
    }

    if recent.is_empty() {
        println!("No records in {}", sink.structured_path().display());
        return Ok(());
    }

    println!(
        "Showing {} of {} records from {}",
        recent.len(),
        records.len(),
        sink.structured_path().display()
    );
    for record in recent {
        println!("{}", format_entry(record));
    }
    Ok(())
}

fn last_n(records: &[CombinedRecord], limit: usize) -> &[CombinedRecord] {
    &records[records.len().saturating_sub(limit)..]
}

fn best_price(record: &CombinedRecord, source: Source) -> String {
    let listings = record.listings_for(source);
    match listings.first() {
        Some(best) => format!("{} x{} best {}", source.name(), listings.len(), best.price),
        None => format!("{} x0", source.name()),
    }
}

/// One summary line per record.
pub fn format_entry(record: &CombinedRecord) -> String {
    let rate = record
        .rate
        .map(|r| format!("{r:.2}"))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}  {}  {}  rate {}",
        record.timestamp.to_rfc3339(),
        best_price(record, Source::Bybit),
        best_price(record, Source::Binance),
        rate
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use p2p_listings::Listing;

    fn record(rate: Option<f64>) -> CombinedRecord {
        let ts = Utc.with_ymd_and_hms(2024, 11, 2, 9, 0, 0).unwrap();
        CombinedRecord {
            success: true,
            timestamp: ts,
            bybit: vec![
                Listing::new(1450.0, ts).unwrap(),
                Listing::new(1460.0, ts).unwrap(),
            ],
            binance: Vec::new(),
            rate,
        }
    }

    #[test]
    fn test_format_entry() {
        let line = format_entry(&record(Some(932.4759)));
        assert!(line.starts_with("2024-11-02T09:00:00+00:00"));
        assert!(line.contains("Bybit x2 best 1450"));
        assert!(line.contains("Binance x0"));
        assert!(line.ends_with("rate 932.48"));

        assert!(format_entry(&record(None)).ends_with("rate -"));
    }

    #[test]
    fn test_last_n() {
        let records = vec![record(Some(1.0)), record(Some(2.0)), record(Some(3.0))];
        assert_eq!(last_n(&records, 2)[0].rate, Some(2.0));
        assert_eq!(last_n(&records, 10).len(), 3);
        assert!(last_n(&records, 0).is_empty());
    }

    #[tokio::test]
    async fn test_history_on_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = SamplerConfig {
            storage_root: dir.path().to_path_buf(),
            ..SamplerConfig::default()
        };
        run(&config, 5, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_history_logs_under_storage_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        layout.ensure_dirs().unwrap();
        let sink = PersistenceSink::new(&layout);
        std::fs::write(sink.structured_path(), b"[{\"legacy\": true}]").unwrap();

        let config = SamplerConfig {
            storage_root: dir.path().to_path_buf(),
            ..SamplerConfig::default()
        };
        run(&config, 5, true).await.unwrap();

        let log_files = std::fs::read_dir(layout.logs_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("p2p_sampler_"))
            .count();
        assert_eq!(log_files, 1);
    }
}
