//! Unified error handling for the billing engine
//!
//! Two families share one enum: validation errors (deterministic, caller-fixable,
//! never retried) and dependency errors (GeoIP, gateway, storage). Every error
//! carries a stable machine-readable code and a [`ResponseStatus`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::error::{CacheError, ReferenceKind};
use crate::database::error::DatabaseError;
use crate::payments::error::GatewayError;

/// Response status returned next to every error code
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    BadData,
    NotFound,
    SystemError,
}

impl ResponseStatus {
    pub fn http_status_code(&self) -> u16 {
        match self {
            ResponseStatus::Ok => 200,
            ResponseStatus::BadData => 400,
            ResponseStatus::NotFound => 404,
            ResponseStatus::SystemError => 500,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BillingError {
    // Order pipeline
    #[error("request is invalid: {0}")]
    RequestInvalid(String),
    #[error("project with specified identifier not found")]
    ProjectNotFound,
    #[error("project is inactive")]
    ProjectInactive,
    #[error("merchant for project not found")]
    MerchantNotFound,
    #[error("request signature is invalid")]
    SignatureInvalid,
    #[error("payer region is unknown")]
    PayerRegionUnknown,
    #[error("currency not found")]
    CurrencyNotFound,
    #[error("currency is required")]
    CurrencyIsRequired,
    #[error("fixed packages for payer region not found")]
    FixedPackageForRegionNotFound,
    #[error("fixed package with specified price and currency not found")]
    FixedPackageNotFound,
    #[error("order with specified project order id already exists")]
    ProjectOrderIdIsDuplicate,
    #[error("payment method not found")]
    PaymentMethodNotFound,
    #[error("payment method is inactive")]
    PaymentMethodInactive,
    #[error("payment system not found")]
    PaymentSystemNotFound,
    #[error("payment system is inactive")]
    PaymentSystemInactive,
    #[error("payment method is not allowed for project")]
    PaymentMethodNotAllowed,
    #[error("payment method is not compatible with project settings")]
    PaymentMethodIncompatible,
    #[error("amount is lower than the minimum allowed for project")]
    AmountLowerThanMinAllowed,
    #[error("amount is greater than the maximum allowed for project")]
    AmountGreaterThanMaxAllowed,
    #[error("amount is lower than the minimum allowed for payment method")]
    AmountLowerThanMinAllowedPaymentMethod,
    #[error("amount is greater than the maximum allowed for payment method")]
    AmountGreaterThanMaxAllowedPaymentMethod,

    // Reference data
    #[error("currency rate not found: {from} -> {to}")]
    CurrencyRateNotFound { from: i32, to: i32 },
    #[error("commission for project and payment method not found")]
    CommissionNotFound,
    #[error("vat for payer country not found")]
    VatNotFound,
    #[error("country not found")]
    CountryNotFound,
    #[error("system fees not found")]
    SystemFeesNotFound,

    // Payment form
    #[error("order not found")]
    OrderNotFound,
    #[error("order already processed")]
    OrderAlreadyProcessed,
    #[error("payer email is invalid")]
    PaymentEmailInvalid,
    #[error("payer account is invalid")]
    PaymentAccountInvalid,
    #[error("bank card number is invalid")]
    BankCardPanIsInvalid,
    #[error("bank card security code is invalid")]
    BankCardCvvIsInvalid,
    #[error("bank card expiration month is invalid")]
    BankCardMonthIsInvalid,
    #[error("bank card expiration year is invalid")]
    BankCardYearIsInvalid,
    #[error("bank card is expired")]
    BankCardIsExpired,
    #[error("bank card holder is invalid")]
    BankCardHolderIsInvalid,

    // Refunds and callbacks
    #[error("refund amount must be greater than zero")]
    RefundAmountInvalid,
    #[error("refund not allowed for order in current status")]
    RefundNotAllowed,
    #[error("order already refunded")]
    OrderAlreadyRefunded,
    #[error("refund amount exceeds the remaining payment amount")]
    RefundPaymentAmountLess,
    #[error("refund not found")]
    RefundNotFound,
    #[error("handler incorrect")]
    HandlerNotFound,
    #[error("request incorrect")]
    CallbackRequestIncorrect,
    #[error("callback signature is invalid")]
    CallbackSignatureInvalid,
    #[error("request amount or currency is invalid")]
    RequestAmountOrCurrencyIsInvalid,

    // Dependencies
    #[error("gateway authentication failed: {0}")]
    AuthenticateFailed(String),
    #[error("gateway create request failed: {0}")]
    CreateRequestFailed(String),
    #[error("gateway refund request failed: {0}")]
    RefundRequestFailed(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::RequestInvalid(_) => "REQUEST_INVALID",
            BillingError::ProjectNotFound => "PROJECT_NOT_FOUND",
            BillingError::ProjectInactive => "PROJECT_INACTIVE",
            BillingError::MerchantNotFound => "MERCHANT_NOT_FOUND",
            BillingError::SignatureInvalid => "SIGNATURE_INVALID",
            BillingError::PayerRegionUnknown => "PAYER_REGION_UNKNOWN",
            BillingError::CurrencyNotFound => "CURRENCY_NOT_FOUND",
            BillingError::CurrencyIsRequired => "CURRENCY_IS_REQUIRED",
            BillingError::FixedPackageForRegionNotFound => "FIXED_PACKAGE_FOR_REGION_NOT_FOUND",
            BillingError::FixedPackageNotFound => "FIXED_PACKAGE_NOT_FOUND",
            BillingError::ProjectOrderIdIsDuplicate => "PROJECT_ORDER_ID_IS_DUPLICATE",
            BillingError::PaymentMethodNotFound => "PAYMENT_METHOD_NOT_FOUND",
            BillingError::PaymentMethodInactive => "PAYMENT_METHOD_INACTIVE",
            BillingError::PaymentSystemNotFound => "PAYMENT_SYSTEM_NOT_FOUND",
            BillingError::PaymentSystemInactive => "PAYMENT_SYSTEM_INACTIVE",
            BillingError::PaymentMethodNotAllowed => "PAYMENT_METHOD_NOT_ALLOWED",
            BillingError::PaymentMethodIncompatible => "PAYMENT_METHOD_INCOMPATIBLE",
            BillingError::AmountLowerThanMinAllowed => "AMOUNT_LOWER_THAN_MIN_ALLOWED",
            BillingError::AmountGreaterThanMaxAllowed => "AMOUNT_GREATER_THAN_MAX_ALLOWED",
            BillingError::AmountLowerThanMinAllowedPaymentMethod => {
                "AMOUNT_LOWER_THAN_MIN_ALLOWED_PAYMENT_METHOD"
            }
            BillingError::AmountGreaterThanMaxAllowedPaymentMethod => {
                "AMOUNT_GREATER_THAN_MAX_ALLOWED_PAYMENT_METHOD"
            }
            BillingError::CurrencyRateNotFound { .. } => "CURRENCY_RATE_NOT_FOUND",
            BillingError::CommissionNotFound => "COMMISSION_NOT_FOUND",
            BillingError::VatNotFound => "VAT_NOT_FOUND",
            BillingError::CountryNotFound => "COUNTRY_NOT_FOUND",
            BillingError::SystemFeesNotFound => "SYSTEM_FEES_NOT_FOUND",
            BillingError::OrderNotFound => "ORDER_NOT_FOUND",
            BillingError::OrderAlreadyProcessed => "ORDER_ALREADY_PROCESSED",
            BillingError::PaymentEmailInvalid => "PAYMENT_EMAIL_INVALID",
            BillingError::PaymentAccountInvalid => "PAYMENT_ACCOUNT_INVALID",
            BillingError::BankCardPanIsInvalid => "BANK_CARD_PAN_IS_INVALID",
            BillingError::BankCardCvvIsInvalid => "BANK_CARD_CVV_IS_INVALID",
            BillingError::BankCardMonthIsInvalid => "BANK_CARD_MONTH_IS_INVALID",
            BillingError::BankCardYearIsInvalid => "BANK_CARD_YEAR_IS_INVALID",
            BillingError::BankCardIsExpired => "BANK_CARD_IS_EXPIRED",
            BillingError::BankCardHolderIsInvalid => "BANK_CARD_HOLDER_IS_INVALID",
            BillingError::RefundAmountInvalid => "REFUND_AMOUNT_INVALID",
            BillingError::RefundNotAllowed => "REFUND_NOT_ALLOWED",
            BillingError::OrderAlreadyRefunded => "ORDER_ALREADY_REFUNDED",
            BillingError::RefundPaymentAmountLess => "REFUND_PAYMENT_AMOUNT_LESS",
            BillingError::RefundNotFound => "REFUND_NOT_FOUND",
            BillingError::HandlerNotFound => "HANDLER_NOT_FOUND",
            BillingError::CallbackRequestIncorrect => "CALLBACK_REQUEST_INCORRECT",
            BillingError::CallbackSignatureInvalid => "CALLBACK_SIGNATURE_INVALID",
            BillingError::RequestAmountOrCurrencyIsInvalid => {
                "REQUEST_AMOUNT_OR_CURRENCY_IS_INVALID"
            }
            BillingError::AuthenticateFailed(_) => "GATEWAY_AUTHENTICATE_FAILED",
            BillingError::CreateRequestFailed(_) => "GATEWAY_CREATE_REQUEST_FAILED",
            BillingError::RefundRequestFailed(_) => "GATEWAY_REFUND_REQUEST_FAILED",
            BillingError::Storage(_) => "STORAGE_ERROR",
            BillingError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> ResponseStatus {
        match self {
            BillingError::ProjectNotFound
            | BillingError::OrderNotFound
            | BillingError::RefundNotFound
            | BillingError::CurrencyRateNotFound { .. }
            | BillingError::CommissionNotFound
            | BillingError::VatNotFound
            | BillingError::SystemFeesNotFound => ResponseStatus::NotFound,
            BillingError::AuthenticateFailed(_)
            | BillingError::CreateRequestFailed(_)
            | BillingError::RefundRequestFailed(_) => ResponseStatus::BadData,
            BillingError::Storage(_) | BillingError::Internal(_) => ResponseStatus::SystemError,
            _ => ResponseStatus::BadData,
        }
    }

    /// Dependency failures (gateway, storage) as opposed to caller-fixable validation errors
    pub fn is_dependency_error(&self) -> bool {
        matches!(
            self,
            BillingError::AuthenticateFailed(_)
                | BillingError::CreateRequestFailed(_)
                | BillingError::RefundRequestFailed(_)
                | BillingError::Storage(_)
                | BillingError::Internal(_)
        )
    }

    /// Retrying is the caller's decision; only dependency errors are worth it
    pub fn is_retryable(&self) -> bool {
        self.is_dependency_error()
    }
}

impl From<CacheError> for BillingError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NotFound { kind, .. } => match kind {
                ReferenceKind::Currency => BillingError::CurrencyNotFound,
                ReferenceKind::CurrencyRate { from, to } => {
                    BillingError::CurrencyRateNotFound { from, to }
                }
                ReferenceKind::Country => BillingError::CountryNotFound,
                ReferenceKind::PaymentMethod => BillingError::PaymentMethodNotFound,
                ReferenceKind::PaymentSystem => BillingError::PaymentSystemNotFound,
                ReferenceKind::Commission => BillingError::CommissionNotFound,
                ReferenceKind::Vat => BillingError::VatNotFound,
                ReferenceKind::SystemFees => BillingError::SystemFeesNotFound,
                ReferenceKind::Project => BillingError::ProjectNotFound,
                ReferenceKind::Merchant => BillingError::MerchantNotFound,
            },
            CacheError::SourceError(message) => BillingError::Internal(message),
        }
    }
}

impl From<DatabaseError> for BillingError {
    fn from(err: DatabaseError) -> Self {
        BillingError::Storage(err.to_string())
    }
}

impl From<GatewayError> for BillingError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::AuthenticateFailed { message } => BillingError::AuthenticateFailed(message),
            GatewayError::HandlerNotFound { .. } => BillingError::HandlerNotFound,
            GatewayError::RequestIncorrect { .. } => BillingError::CallbackRequestIncorrect,
            GatewayError::SignatureInvalid => BillingError::CallbackSignatureInvalid,
            GatewayError::RefundRequestFailed { message } => BillingError::RefundRequestFailed(message),
            GatewayError::CreateRequestFailed { message } => BillingError::CreateRequestFailed(message),
            other => BillingError::CreateRequestFailed(other.to_string()),
        }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
