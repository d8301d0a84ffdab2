//! Listing normalization: raw page rows and price text into canonical listings.
//!
//! Everything here is total. Bad input degrades to `None` or a row-level
//! error that the caller logs and skips; nothing panics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Listing, ListingError, ListingResult};

/// Zero-based cell positions in a rendered listings row.
const PRICE_CELL: usize = 1;
const AMOUNT_CELL: usize = 2;
const PAYMENT_CELL: usize = 3;
const MERCHANT_CELL: usize = 4;

/// The cell texts of one rendered table row, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow {
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn new<S: Into<String>>(cells: impl IntoIterator<Item = S>) -> Self {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }

    fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(|c| c.trim())
    }
}

/// Best-effort auxiliary fields from a row. All `None` when the layout is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxiliaryFields {
    pub available_amount: Option<String>,
    pub payment_methods: Option<String>,
    pub merchant_name: Option<String>,
}

impl AuxiliaryFields {
    pub fn is_empty(&self) -> bool {
        self.available_amount.is_none()
            && self.payment_methods.is_none()
            && self.merchant_name.is_none()
    }
}

/// Parse a displayed price into a number.
///
/// Only the first line is considered; every character other than ASCII
/// digits and `.` is discarded before parsing.
pub fn clean_price(text: &str) -> Option<f64> {
    if text.trim().is_empty() {
        return None;
    }

    let first_line = text.split('\n').next().unwrap_or_default();
    let residue: String = first_line
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if residue.is_empty() {
        return None;
    }

    residue.parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Extract amount, payment methods, and merchant from the fixed row layout.
pub fn extract_auxiliary_fields(row: &RawRow) -> AuxiliaryFields {
    match (
        row.cell(AMOUNT_CELL),
        row.cell(PAYMENT_CELL),
        row.cell(MERCHANT_CELL),
    ) {
        (Some(amount), Some(payment), Some(merchant)) => AuxiliaryFields {
            available_amount: Some(amount.to_string()),
            payment_methods: Some(payment.to_string()),
            merchant_name: Some(merchant.to_string()),
        },
        _ => AuxiliaryFields::default(),
    }
}

/// Turn a rendered row into a listing.
///
/// Returns `Err` when the price cell is structurally missing and `Ok(None)`
/// when the price is unreadable or not positive.
pub fn listing_from_row(row: &RawRow, captured_at: DateTime<Utc>) -> ListingResult<Option<Listing>> {
    let price_text = row.cell(PRICE_CELL).ok_or_else(|| {
        ListingError::MalformedRow(format!(
            "expected a price cell at column {}, row has {} cells",
            PRICE_CELL + 1,
            row.cells.len()
        ))
    })?;

    let Some(price) = clean_price(price_text) else {
        return Ok(None);
    };
    let Some(mut listing) = Listing::new(price, captured_at) else {
        return Ok(None);
    };

    let aux = extract_auxiliary_fields(row);
    if let Some(amount) = aux.available_amount {
        listing = listing.with_available_amount(amount);
    }
    if let Some(methods) = aux.payment_methods {
        listing = listing.with_payment_methods(methods);
    }
    if let Some(merchant) = aux.merchant_name {
        listing = listing.with_merchant_name(merchant);
    }

    Ok(Some(listing))
}

/// Sort listings ascending by price.
pub fn sort_by_price(listings: &mut [Listing]) {
    listings.sort_by(|a, b| a.price.total_cmp(&b.price));
}
