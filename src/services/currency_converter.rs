//! Direct-edge currency conversion
//!
//! Rates form a directed graph: `from -> to` has its own rate, independent of
//! `to -> from`. The source amount is divided by the rate and rounded with
//! [`format_amount`]. There is no inverse-rate or multi-hop fallback.

use rust_decimal::Decimal;
use tracing::debug;

use crate::cache::ReferenceSnapshot;
use crate::error::{BillingError, BillingResult};
use crate::money::format_amount;

pub struct CurrencyConverter<'a> {
    snapshot: &'a ReferenceSnapshot,
}

impl<'a> CurrencyConverter<'a> {
    pub fn new(snapshot: &'a ReferenceSnapshot) -> Self {
        Self { snapshot }
    }

    /// Converts `amount` between numeric currency codes. Same-currency
    /// conversion only rounds.
    pub fn convert(&self, from: i32, to: i32, amount: Decimal) -> BillingResult<Decimal> {
        if from == to {
            return Ok(format_amount(amount));
        }

        let rate = self.snapshot.currency_rate(from, to)?;
        if rate.rate <= Decimal::ZERO {
            return Err(BillingError::CurrencyRateNotFound { from, to });
        }

        let converted = format_amount(amount / rate.rate);
        debug!(from, to, %amount, rate = %rate.rate, %converted, "Amount converted");
        Ok(converted)
    }

    /// Same as [`convert`](Self::convert) with alphabetic codes
    pub fn convert_a3(&self, from: &str, to: &str, amount: Decimal) -> BillingResult<Decimal> {
        let from = self.snapshot.currency_by_a3(from)?.code_int;
        let to = self.snapshot.currency_by_a3(to)?.code_int;
        self.convert(from, to, amount)
    }
}
