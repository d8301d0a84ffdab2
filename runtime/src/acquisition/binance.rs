// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! Binance P2P search API client.
//!
//! The payload is structured, so any record that does not match the
//! expected shape fails the whole fetch instead of being skipped.

use super::http_client::{HttpClient, HttpError, RetryPolicy};
use crate::config::BinanceSettings;
use chrono::{DateTime, Utc};
use p2p_listings::{FetchMetadata, FetchResult, Listing, ListingQuery, Source, TradeDirection};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, ORIGIN};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Search request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest<'a> {
    pub asset: &'a str,
    pub fiat: &'a str,
    pub merchant_check: bool,
    pub page: u32,
    pub pay_types: Vec<String>,
    pub publisher_type: Option<String>,
    pub rows: u32,
    pub trade_type: &'static str,
}

impl<'a> SearchRequest<'a> {
    pub fn new(query: &'a ListingQuery, rows: u32, merchant_check: bool) -> Self {
        Self {
            asset: &query.token,
            fiat: &query.fiat,
            merchant_check,
            page: 1,
            pay_types: Vec::new(),
            publisher_type: None,
            rows,
            trade_type: trade_type(query.direction),
        }
    }
}

fn trade_type(direction: TradeDirection) -> &'static str {
    match direction {
        TradeDirection::Buy => "BUY",
        TradeDirection::Sell => "SELL",
    }
}

/// A JSON value the API sends either as a string or as a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Numeric::Number(n) => Some(*n),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }

    fn into_display(self) -> String {
        match self {
            Numeric::Number(n) => n.to_string(),
            Numeric::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Advertisement {
    adv: AdvDetail,
    #[serde(default)]
    advertiser: Advertiser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvDetail {
    price: Numeric,
    surplus_amount: Numeric,
    trade_methods: Vec<TradeMethod>,
}

#[derive(Debug, Deserialize)]
struct TradeMethod {
    identifier: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Advertiser {
    nick_name: Option<String>,
}

/// Ways a Binance fetch fails.
#[derive(Debug, thiserror::Error)]
pub enum BinanceError {
    #[error("Request failed: {0}")]
    Request(#[from] HttpError),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Malformed advertisement at index {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },
}

/// Parse a search response body into listings (unsorted).
pub fn parse_listings(body: &str, captured_at: DateTime<Utc>) -> Result<Vec<Listing>, BinanceError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| BinanceError::InvalidFormat(format!("body is not JSON: {e}")))?;

    let data = value
        .as_object()
        .ok_or_else(|| BinanceError::InvalidFormat("top level is not an object".to_string()))?
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| BinanceError::InvalidFormat("missing `data` array".to_string()))?;

    data.iter()
        .enumerate()
        .map(|(index, raw)| {
            let malformed = |reason: String| BinanceError::MalformedRecord { index, reason };

            let ad: Advertisement =
                serde_json::from_value(raw.clone()).map_err(|e| malformed(e.to_string()))?;

            let price = ad
                .adv
                .price
                .as_f64()
                .ok_or_else(|| malformed(format!("price is not numeric: {:?}", ad.adv.price)))?;
            let listing = Listing::new(price, captured_at)
                .ok_or_else(|| malformed(format!("price must be positive, got {price}")))?;

            let methods = ad
                .adv
                .trade_methods
                .iter()
                .map(|m| m.identifier.as_str())
                .collect::<Vec<_>>()
                .join(", ");

            let mut listing = listing
                .with_available_amount(ad.adv.surplus_amount.into_display())
                .with_payment_methods(methods);
            if let Some(nick) = ad.advertiser.nick_name {
                listing = listing.with_merchant_name(nick);
            }
            Ok(listing)
        })
        .collect()
}

/// Client for the Binance P2P advertisement search.
pub struct BinanceClient {
    http: HttpClient,
    endpoint: String,
    merchant_check: bool,
}

impl BinanceClient {
    pub fn new(settings: &BinanceSettings) -> Result<Self, BinanceError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(origin) = HeaderValue::from_str(&settings.origin) {
            headers.insert(ORIGIN, origin);
        }

        let retry = RetryPolicy {
            max_retries: settings.max_retries,
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            ..RetryPolicy::default()
        };
        let http = HttpClient::new(
            Duration::from_secs(settings.request_timeout_secs),
            &settings.user_agent,
            headers,
            retry,
        )?;

        Ok(Self {
            http,
            endpoint: settings.endpoint.clone(),
            merchant_check: settings.merchant_check,
        })
    }

    /// Fetch up to `row_limit` advertisements for `query`.
    pub async fn fetch_listings(&self, query: &ListingQuery, row_limit: u32) -> FetchResult {
        let captured_at = Utc::now();
        let mut metadata = FetchMetadata::for_query(query, captured_at);
        metadata.rows_requested = Some(row_limit);

        tracing::info!(
            "fetching {} listings for {}/{}",
            trade_type(query.direction),
            query.token,
            query.fiat
        );

        match self.search(query, row_limit, captured_at).await {
            Ok(listings) => {
                let result = FetchResult::succeeded(Source::Binance, listings, metadata);
                tracing::info!("Binance returned {} listings", result.listings().len());
                result
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!("{message}");
                FetchResult::failed(Source::Binance, metadata, message)
            }
        }
    }

    async fn search(
        &self,
        query: &ListingQuery,
        row_limit: u32,
        captured_at: DateTime<Utc>,
    ) -> Result<Vec<Listing>, BinanceError> {
        let request = SearchRequest::new(query, row_limit, self.merchant_check);
        let response = self.http.post_json(&self.endpoint, &request).await?;
        parse_listings(&response.body, captured_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let query = ListingQuery::new("USDT", "XAF", TradeDirection::Sell);
        let body = serde_json::to_value(SearchRequest::new(&query, 4, true)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "asset": "USDT",
                "fiat": "XAF",
                "merchantCheck": true,
                "page": 1,
                "payTypes": [],
                "publisherType": null,
                "rows": 4,
                "tradeType": "SELL"
            })
        );
    }

    #[test]
    fn test_parse_listings_maps_fields() {
        let body = r#"{"code":"000000","data":[
            {"adv":{"price":"1560.50","surplusAmount":"812.33","tradeMethods":[{"identifier":"MTNMobileMoney"},{"identifier":"OrangeMoney"}]},
             "advertiser":{"nickName":"Kofi"}},
            {"adv":{"price":1555,"surplusAmount":40,"tradeMethods":[]},
             "advertiser":{}}
        ]}"#;
        let listings = parse_listings(body, Utc::now()).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].price, 1560.5);
        assert_eq!(listings[0].available_amount, "812.33");
        assert_eq!(listings[0].payment_methods, "MTNMobileMoney, OrangeMoney");
        assert_eq!(listings[0].merchant_name, "Kofi");
        assert_eq!(listings[1].price, 1555.0);
        assert_eq!(listings[1].merchant_name, p2p_listings::UNKNOWN_MERCHANT);
    }

    #[test]
    fn test_parse_listings_missing_data() {
        let err = parse_listings(r#"{"code":"000000","message":null}"#, Utc::now()).unwrap_err();
        assert!(matches!(err, BinanceError::InvalidFormat(_)));
        assert!(err.to_string().contains("missing `data` array"));

        assert!(matches!(
            parse_listings("[]", Utc::now()),
            Err(BinanceError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_listings("<html>", Utc::now()),
            Err(BinanceError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_listings_one_bad_record_fails_all() {
        let body = r#"{"data":[
            {"adv":{"price":"1555.00","surplusAmount":"10","tradeMethods":[]},"advertiser":{}},
            {"adv":{"price":"n/a","surplusAmount":"10","tradeMethods":[]},"advertiser":{}}
        ]}"#;
        let err = parse_listings(body, Utc::now()).unwrap_err();
        assert!(matches!(err, BinanceError::MalformedRecord { index: 1, .. }));

        let missing_methods = r#"{"data":[{"adv":{"price":"1555","surplusAmount":"1"}}]}"#;
        assert!(matches!(
            parse_listings(missing_methods, Utc::now()),
            Err(BinanceError::MalformedRecord { index: 0, .. })
        ));

        let zero_price =
            r#"{"data":[{"adv":{"price":"0","surplusAmount":"1","tradeMethods":[]}}]}"#;
        assert!(parse_listings(zero_price, Utc::now()).is_err());
    }
}
