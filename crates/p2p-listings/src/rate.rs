//! Heuristic cross-currency rate through a shared token.
//!
//! The rate says roughly how many units of the Bybit fiat are worth the
//! reference amount of the Binance fiat, with both legs quoted against the
//! same token. It is not an authoritative FX rate.

use crate::types::{DerivedRate, Listing, ListingError, ListingResult};

/// Notional amount of the Binance fiat used to form the ratio.
///
/// A fixed notional amount whose intended meaning is unverified.
pub const DEFAULT_REFERENCE_AMOUNT: f64 = 1000.0;

fn cheapest(listings: &[Listing]) -> Option<f64> {
    listings
        .iter()
        .map(|l| l.price)
        .filter(|p| p.is_finite())
        .min_by(|a, b| a.total_cmp(b))
}

/// Derive `(reference_amount / cheapest_binance) * cheapest_bybit`.
pub fn derive_rate(
    bybit: &[Listing],
    binance: &[Listing],
    reference_amount: f64,
) -> ListingResult<DerivedRate> {
    if !reference_amount.is_finite() || reference_amount <= 0.0 {
        return Err(ListingError::InsufficientData(format!(
            "reference amount must be positive, got {reference_amount}"
        )));
    }

    let bybit_price = cheapest(bybit)
        .ok_or_else(|| ListingError::InsufficientData("no Bybit listings".to_string()))?;
    let binance_price = cheapest(binance)
        .ok_or_else(|| ListingError::InsufficientData("no Binance listings".to_string()))?;

    if bybit_price <= 0.0 || binance_price <= 0.0 {
        return Err(ListingError::InsufficientData(format!(
            "cheapest prices must be positive (bybit {bybit_price}, binance {binance_price})"
        )));
    }

    Ok(DerivedRate {
        rate: (reference_amount / binance_price) * bybit_price,
        reference_amount,
        bybit_price,
        binance_price,
    })
}
