//! Bank card data validation

use chrono::{Datelike, Utc};

use crate::error::{BillingError, BillingResult};
use crate::payments::types::BankCard;

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

pub struct BankCardValidator<'a> {
    card: &'a BankCard,
    /// Current `(year, month)`; injectable for expiry checks
    today: (i32, u32),
}

impl<'a> BankCardValidator<'a> {
    pub fn new(card: &'a BankCard) -> Self {
        let now = Utc::now();
        Self {
            card,
            today: (now.year(), now.month()),
        }
    }

    pub fn at(card: &'a BankCard, year: i32, month: u32) -> Self {
        Self {
            card,
            today: (year, month),
        }
    }

    /// Checks every field, reporting the first failure in PAN, CVV, month,
    /// year, expiry, holder order
    pub fn validate(&self) -> BillingResult<()> {
        self.validate_pan()?;
        self.validate_cvv()?;
        let month = self.validate_month()?;
        let year = self.validate_year()?;
        self.validate_expire(year, month)?;
        self.validate_holder()
    }

    fn validate_pan(&self) -> BillingResult<()> {
        let pan = &self.card.pan;
        if !(12..=19).contains(&pan.len()) || !is_digits(pan) || !luhn_valid(pan) {
            return Err(BillingError::BankCardPanIsInvalid);
        }
        Ok(())
    }

    fn validate_cvv(&self) -> BillingResult<()> {
        let cvv = &self.card.cvv;
        if !(3..=4).contains(&cvv.len()) || !is_digits(cvv) {
            return Err(BillingError::BankCardCvvIsInvalid);
        }
        Ok(())
    }

    fn validate_month(&self) -> BillingResult<u32> {
        let month = &self.card.month;
        if month.len() != 2 || !is_digits(month) {
            return Err(BillingError::BankCardMonthIsInvalid);
        }
        match month.parse::<u32>() {
            Ok(m) if (1..=12).contains(&m) => Ok(m),
            _ => Err(BillingError::BankCardMonthIsInvalid),
        }
    }

    fn validate_year(&self) -> BillingResult<i32> {
        let year = &self.card.year;
        if !matches!(year.len(), 2 | 4) || !is_digits(year) {
            return Err(BillingError::BankCardYearIsInvalid);
        }
        let parsed = year
            .parse::<i32>()
            .map_err(|_| BillingError::BankCardYearIsInvalid)?;
        Ok(if year.len() == 2 { 2000 + parsed } else { parsed })
    }

    /// A card stays valid through the last day of its expiry month
    fn validate_expire(&self, year: i32, month: u32) -> BillingResult<()> {
        if (year, month) < self.today {
            return Err(BillingError::BankCardIsExpired);
        }
        Ok(())
    }

    fn validate_holder(&self) -> BillingResult<()> {
        if self.card.holder.trim().is_empty() {
            return Err(BillingError::BankCardHolderIsInvalid);
        }
        Ok(())
    }
}

/// Luhn checksum over an all-digit string
pub fn luhn_valid(pan: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in pan.chars().rev().enumerate() {
        let Some(mut digit) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}
