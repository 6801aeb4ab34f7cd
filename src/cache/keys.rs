//! Type-safe reference cache keys

use std::fmt;

/// Directed rate edge `from -> to` (numeric currency codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub from: i32,
    pub to: i32,
}

impl RateKey {
    pub fn new(from: i32, to: i32) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate:{}:{}", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommissionKey {
    pub project_id: String,
    pub payment_method_id: String,
}

impl CommissionKey {
    pub fn new(project_id: impl Into<String>, payment_method_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            payment_method_id: payment_method_id.into(),
        }
    }
}

impl fmt::Display for CommissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "commission:{}:{}",
            self.project_id, self.payment_method_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VatKey {
    pub country: String,
    pub subdivision: Option<String>,
}

impl VatKey {
    pub fn new(country: impl Into<String>, subdivision: Option<String>) -> Self {
        Self {
            country: country.into().to_uppercase(),
            subdivision: subdivision
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty()),
        }
    }
}

impl fmt::Display for VatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subdivision {
            Some(subdivision) => write!(f, "vat:{}:{}", self.country, subdivision),
            None => write!(f, "vat:{}", self.country),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SystemFeesKey {
    pub payment_method_id: String,
    pub region: String,
    pub card_brand: Option<String>,
}

impl SystemFeesKey {
    pub fn new(
        payment_method_id: impl Into<String>,
        region: impl Into<String>,
        card_brand: Option<String>,
    ) -> Self {
        Self {
            payment_method_id: payment_method_id.into(),
            region: region.into().to_uppercase(),
            card_brand: card_brand.map(|b| b.to_uppercase()),
        }
    }
}

impl fmt::Display for SystemFeesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "system_fees:{}:{}:{}",
            self.payment_method_id,
            self.region,
            self.card_brand.as_deref().unwrap_or("*")
        )
    }
}

/// Payment method group alias together with a numeric currency code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodGroupKey {
    pub group_alias: String,
    pub currency: i32,
}

impl MethodGroupKey {
    pub fn new(group_alias: impl Into<String>, currency: i32) -> Self {
        Self {
            group_alias: group_alias.into(),
            currency,
        }
    }
}

impl fmt::Display for MethodGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "payment_method:{}:{}", self.group_alias, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(RateKey::new(643, 840).to_string(), "rate:643:840");
        assert_eq!(
            VatKey::new("us", Some(" ca ".to_string())).to_string(),
            "vat:US:CA"
        );
        assert_eq!(VatKey::new("RU", Some(String::new())).to_string(), "vat:RU");
        assert_eq!(
            SystemFeesKey::new("pm_1", "eu", None).to_string(),
            "system_fees:pm_1:EU:*"
        );
    }
}
