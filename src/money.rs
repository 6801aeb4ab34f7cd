//! Fixed-point monetary helpers.
//!
//! All amounts are `Decimal`s kept at [`AMOUNT_SCALE`] decimal places. Every
//! arithmetic step that produces a stored amount goes through [`format_amount`].

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places kept for monetary amounts.
pub const AMOUNT_SCALE: u32 = 2;

/// Round an amount to the system's monetary precision (half away from zero).
pub fn format_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `percent` per cent of `amount`, rounded.
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    format_amount(amount / Decimal::ONE_HUNDRED * percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn format_amount_rounds_half_away_from_zero() {
        assert_eq!(format_amount(dec!(15.625)), dec!(15.63));
        assert_eq!(format_amount(dec!(15.624)), dec!(15.62));
        assert_eq!(format_amount(dec!(-0.005)), dec!(-0.01));
    }

    #[test]
    fn percent_of_amount() {
        assert_eq!(percent_of(dec!(100), dec!(2.5)), dec!(2.5));
        assert_eq!(percent_of(dec!(33.33), dec!(3)), dec!(1.00));
    }
}
