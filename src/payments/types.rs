use crate::models::TerminalCredentials;
use crate::payments::error::GatewayError;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Closed set of payment-system handlers the engine can drive
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HandlerName {
    Cardpay,
}

impl HandlerName {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerName::Cardpay => "cardpay",
        }
    }
}

impl std::fmt::Display for HandlerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HandlerName {
    type Err = GatewayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "cardpay" => Ok(HandlerName::Cardpay),
            _ => Err(GatewayError::HandlerNotFound {
                handler: value.to_string(),
            }),
        }
    }
}

/// Bearer credential pair issued by the gateway for one terminal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayToken {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl GatewayToken {
    /// Builds a token from relative lifetimes in seconds, as returned by the gateway
    pub fn issued_now(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: i64,
        refresh_expires_in: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            access_expires_at: now + Duration::seconds(expires_in),
            refresh_expires_at: now + Duration::seconds(refresh_expires_in),
        }
    }

    pub fn access_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.access_expires_at > now
    }

    pub fn refresh_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at > now
    }
}

/// Card data as entered on the payment form
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BankCard {
    pub pan: String,
    pub holder: String,
    pub cvv: String,
    pub month: String,
    pub year: String,
}

impl BankCard {
    /// Expiration in `MM/YYYY` form
    pub fn expiration(&self) -> String {
        let year = if self.year.len() == 2 {
            format!("20{}", self.year)
        } else {
            self.year.clone()
        };
        format!("{}/{}", self.month, year)
    }

    pub fn masked_pan(&self) -> String {
        let chars: Vec<char> = self.pan.chars().collect();
        let digits = chars.len();
        if digits < 10 {
            return "*".repeat(digits);
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[digits - 4..].iter().collect();
        format!("{}{}{}", head, "*".repeat(digits - 10), tail)
    }
}

impl std::fmt::Debug for BankCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankCard")
            .field("pan", &self.masked_pan())
            .field("month", &self.month)
            .field("year", &self.year)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for BankCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.masked_pan())
    }
}

#[derive(Debug, Clone)]
pub struct PaymentCreateRequest {
    pub order_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    /// Alphabetic currency code
    pub currency: String,
    pub payment_method_external_id: String,
    pub credentials: TerminalCredentials,
    pub payer_email: String,
    pub payer_ip: String,
    pub card: Option<BankCard>,
    pub ewallet_account: Option<String>,
    pub url_success: Option<String>,
    pub url_fail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCreateResponse {
    pub redirect_url: String,
}

#[derive(Debug, Clone)]
pub struct RefundCreateRequest {
    pub refund_id: Uuid,
    pub order_id: Uuid,
    /// Gateway transaction id of the refunded payment
    pub payment_transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub reason: String,
    pub payment_method_external_id: String,
    pub credentials: TerminalCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundCreateResponse {
    pub external_id: String,
}

/// Transaction status reported by the gateway
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStatus {
    New,
    InProgress,
    Authorized,
    Completed,
    Declined,
    Cancelled,
}

impl GatewayStatus {
    /// Intermediate statuses; a later callback carries the final one
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            GatewayStatus::New | GatewayStatus::InProgress | GatewayStatus::Authorized
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Payment,
    Refund,
}

/// Gateway-neutral view of an inbound notification
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCallback {
    pub kind: CallbackKind,
    /// Our order id as echoed back by the gateway
    pub merchant_order_id: String,
    /// Gateway payment transaction id
    pub payment_id: Option<String>,
    /// Gateway refund id, present on refund callbacks
    pub refund_id: Option<String>,
    pub status: GatewayStatus,
    pub amount: Decimal,
    pub currency: String,
    pub decline_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_name_parsing_works() {
        assert_eq!(HandlerName::from_str(" CardPay "), Ok(HandlerName::Cardpay));
        assert_eq!(
            HandlerName::from_str("paypal"),
            Err(GatewayError::HandlerNotFound {
                handler: "paypal".to_string()
            })
        );
    }

    #[test]
    fn token_validity_windows() {
        let token = GatewayToken::issued_now("a", "r", 60, 3600);
        let now = Utc::now();
        assert!(token.access_valid_at(now));
        assert!(!token.access_valid_at(now + Duration::seconds(120)));
        assert!(token.refresh_valid_at(now + Duration::seconds(120)));
    }

    #[test]
    fn bank_card_expiration_and_mask() {
        let card = BankCard {
            pan: "4000000000000002".to_string(),
            holder: "JOHN DOE".to_string(),
            cvv: "123".to_string(),
            month: "02".to_string(),
            year: "29".to_string(),
        };
        assert_eq!(card.expiration(), "02/2029");
        assert_eq!(card.to_string(), "400000******0002");
    }

    #[test]
    fn gateway_status_deserializes_from_wire_names() {
        let status: GatewayStatus = serde_json::from_str("\"IN_PROGRESS\"").unwrap();
        assert_eq!(status, GatewayStatus::InProgress);
        assert!(status.is_temporary());
        assert!(!GatewayStatus::Declined.is_temporary());
    }
}
