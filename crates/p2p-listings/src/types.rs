//! Core data types for listings, fetch envelopes, and persisted records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Merchant name used when a source does not report one.
pub const UNKNOWN_MERCHANT: &str = "Unknown";

fn unknown_merchant() -> String {
    UNKNOWN_MERCHANT.to_string()
}

/// One advertised offer to buy or sell a token for fiat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Fiat per unit of token. Always finite and positive.
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub available_amount: String,
    #[serde(default)]
    pub payment_methods: String,
    #[serde(default = "unknown_merchant")]
    pub merchant_name: String,
}

impl Listing {
    /// Build a listing, rejecting prices that are not finite and positive.
    pub fn new(price: f64, timestamp: DateTime<Utc>) -> Option<Self> {
        if !price.is_finite() || price <= 0.0 {
            return None;
        }
        Some(Self {
            price,
            timestamp,
            available_amount: String::new(),
            payment_methods: String::new(),
            merchant_name: unknown_merchant(),
        })
    }

    pub fn with_available_amount(mut self, amount: impl Into<String>) -> Self {
        self.available_amount = amount.into();
        self
    }

    pub fn with_payment_methods(mut self, methods: impl Into<String>) -> Self {
        self.payment_methods = methods.into();
        self
    }

    pub fn with_merchant_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.merchant_name = name;
        }
        self
    }
}

/// The exchange a listing was acquired from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Browser-rendered listings page.
    Bybit,
    /// JSON search API.
    Binance,
}

impl Source {
    /// Display name, also used as the tabular `source` column.
    pub fn name(&self) -> &'static str {
        match self {
            Source::Bybit => "Bybit",
            Source::Binance => "Binance",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Buy or sell side of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    #[default]
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn label(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "buy",
            TradeDirection::Sell => "sell",
        }
    }
}

impl std::str::FromStr for TradeDirection {
    type Err = ListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "1" => Ok(TradeDirection::Buy),
            "sell" | "0" => Ok(TradeDirection::Sell),
            other => Err(ListingError::InvalidInput(format!(
                "unknown trade direction: {other}"
            ))),
        }
    }
}

/// The token/fiat pair and side being sampled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingQuery {
    pub token: String,
    pub fiat: String,
    pub direction: TradeDirection,
}

impl ListingQuery {
    pub fn new(token: impl Into<String>, fiat: impl Into<String>, direction: TradeDirection) -> Self {
        Self {
            token: token.into(),
            fiat: fiat.into(),
            direction,
        }
    }
}

/// Source-specific context attached to a fetch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchMetadata {
    pub token: String,
    pub fiat: String,
    pub direction: TradeDirection,
    pub captured_at: DateTime<Utc>,
    /// Rows found on the rendered page, before normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_seen: Option<usize>,
    /// Row count requested from the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_requested: Option<u32>,
    pub listings_found: usize,
}

impl FetchMetadata {
    pub fn for_query(query: &ListingQuery, captured_at: DateTime<Utc>) -> Self {
        Self {
            token: query.token.clone(),
            fiat: query.fiat.clone(),
            direction: query.direction,
            captured_at,
            rows_seen: None,
            rows_requested: None,
            listings_found: 0,
        }
    }
}

/// Outcome of one acquisition call against one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub source: Source,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    listings: Option<Vec<Listing>>,
    pub metadata: FetchMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_rate: Option<f64>,
}

impl FetchResult {
    /// A successful fetch. Listings are sorted ascending by price.
    pub fn succeeded(source: Source, mut listings: Vec<Listing>, mut metadata: FetchMetadata) -> Self {
        crate::normalize::sort_by_price(&mut listings);
        metadata.listings_found = listings.len();
        Self {
            source,
            success: true,
            listings: Some(listings),
            metadata,
            message: None,
            derived_rate: None,
        }
    }

    /// A failed fetch carrying a human-readable reason.
    pub fn failed(source: Source, metadata: FetchMetadata, message: impl Into<String>) -> Self {
        Self {
            source,
            success: false,
            listings: None,
            metadata,
            message: Some(message.into()),
            derived_rate: None,
        }
    }

    /// Attach a derived cross rate to this envelope.
    pub fn with_derived_rate(mut self, rate: f64) -> Self {
        self.derived_rate = Some(rate);
        self
    }

    /// Listings in ascending price order; empty when the fetch failed.
    pub fn listings(&self) -> &[Listing] {
        self.listings.as_deref().unwrap_or(&[])
    }

    /// Whether this source contributed at least one listing.
    pub fn has_listings(&self) -> bool {
        self.success && !self.listings().is_empty()
    }

    pub fn cheapest(&self) -> Option<&Listing> {
        self.listings().first()
    }

    pub fn most_expensive(&self) -> Option<&Listing> {
        self.listings().last()
    }
}

/// A cross-currency rate derived from the cheapest listing of each source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedRate {
    pub rate: f64,
    pub reference_amount: f64,
    pub bybit_price: f64,
    pub binance_price: f64,
}

/// One run's persisted snapshot across both sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRecord {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub bybit: Vec<Listing>,
    #[serde(default)]
    pub binance: Vec<Listing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

impl CombinedRecord {
    /// Combine both sources' results. A failed source contributes an empty sequence.
    pub fn combine(bybit: &FetchResult, binance: &FetchResult, timestamp: DateTime<Utc>) -> Self {
        let bybit_listings = if bybit.has_listings() {
            bybit.listings().to_vec()
        } else {
            Vec::new()
        };
        let binance_listings = if binance.has_listings() {
            binance.listings().to_vec()
        } else {
            Vec::new()
        };

        Self {
            success: !bybit_listings.is_empty() || !binance_listings.is_empty(),
            timestamp,
            bybit: bybit_listings,
            binance: binance_listings,
            rate: bybit.derived_rate,
        }
    }

    pub fn listings_for(&self, source: Source) -> &[Listing] {
        match source {
            Source::Bybit => &self.bybit,
            Source::Binance => &self.binance,
        }
    }
}

/// Errors that can occur in the listing library.
#[derive(thiserror::Error, Debug)]
pub enum ListingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed row: {0}")]
    MalformedRow(String),

    #[error("Insufficient data for rate derivation: {0}")]
    InsufficientData(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience result type.
pub type ListingResult<T> = Result<T, ListingError>;
