// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! Listing acquisition from both sources.
//!
//! Bybit listings come from a browser-rendered page and Binance listings
//! from a JSON API. Both clients return the same `FetchResult` envelope.

pub mod binance;
pub mod bybit;
pub mod http_client;

pub use binance::BinanceClient;
pub use bybit::BybitClient;
