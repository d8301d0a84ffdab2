// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! Binance client against a mock search endpoint.

use p2p_listings::{ListingQuery, TradeDirection, UNKNOWN_MERCHANT};
use p2p_sampler::acquisition::BinanceClient;
use p2p_sampler::config::BinanceSettings;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_PATH: &str = "/bapi/c2c/v2/friendly/c2c/adv/search";

fn client(server: &MockServer) -> BinanceClient {
    let settings = BinanceSettings {
        endpoint: format!("{}{SEARCH_PATH}", server.uri()),
        max_retries: 2,
        backoff_base_ms: 1,
        request_timeout_secs: 5,
        ..BinanceSettings::default()
    };
    BinanceClient::new(&settings).unwrap()
}

fn query() -> ListingQuery {
    ListingQuery::new("USDT", "XAF", TradeDirection::Buy)
}

fn advertisement(price: &str, nick: &str) -> serde_json::Value {
    serde_json::json!({
        "adv": {
            "price": price,
            "surplusAmount": "250.00",
            "tradeMethods": [{"identifier": "MTNMobileMoney"}]
        },
        "advertiser": {"nickName": nick}
    })
}

#[tokio::test]
async fn test_search_returns_sorted_listings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "asset": "USDT",
            "fiat": "XAF",
            "tradeType": "BUY",
            "rows": 4,
            "page": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": "000000",
            "data": [
                advertisement("1570.00", "Kofi"),
                advertisement("1555.00", "Awa"),
                advertisement("1561.25", "Yao")
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server).fetch_listings(&query(), 4).await;

    assert!(result.success);
    let prices: Vec<f64> = result.listings().iter().map(|l| l.price).collect();
    assert_eq!(prices, vec![1555.0, 1561.25, 1570.0]);
    assert_eq!(result.cheapest().unwrap().merchant_name, "Awa");
    assert_eq!(result.metadata.rows_requested, Some(4));
    assert_eq!(result.metadata.listings_found, 3);
}

#[tokio::test]
async fn test_unavailable_on_every_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let result = client(&server).fetch_listings(&query(), 4).await;

    assert!(!result.success);
    assert!(result.listings().is_empty());
    assert!(result
        .message
        .as_deref()
        .unwrap()
        .starts_with("Request failed: "));
}

#[tokio::test]
async fn test_malformed_record_fails_whole_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                advertisement("1555.00", "Awa"),
                {"adv": {"surplusAmount": "1", "tradeMethods": []}, "advertiser": {}}
            ]
        })))
        .mount(&server)
        .await;

    let result = client(&server).fetch_listings(&query(), 4).await;

    assert!(!result.success);
    assert!(result.listings().is_empty());
    assert!(result
        .message
        .as_deref()
        .unwrap()
        .contains("Malformed advertisement at index 1"));
}

#[tokio::test]
async fn test_missing_data_is_invalid_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": "000002",
            "message": "illegal parameter"
        })))
        .mount(&server)
        .await;

    let result = client(&server).fetch_listings(&query(), 4).await;

    assert!(!result.success);
    assert!(result
        .message
        .as_deref()
        .unwrap()
        .starts_with("Invalid response format"));
}

#[tokio::test]
async fn test_missing_nickname_defaults_to_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "adv": {"price": 1558, "surplusAmount": 12.5, "tradeMethods": []},
                "advertiser": {"nickName": null}
            }]
        })))
        .mount(&server)
        .await;

    let result = client(&server).fetch_listings(&query(), 1).await;

    assert!(result.success);
    let listing = &result.listings()[0];
    assert_eq!(listing.price, 1558.0);
    assert_eq!(listing.available_amount, "12.5");
    assert_eq!(listing.merchant_name, UNKNOWN_MERCHANT);
    assert_eq!(listing.payment_methods, "");
}
