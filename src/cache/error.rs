//! Reference cache error types

use std::fmt;

/// Kind of reference record a lookup was made for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Currency,
    CurrencyRate { from: i32, to: i32 },
    Country,
    PaymentMethod,
    PaymentSystem,
    Commission,
    Vat,
    SystemFees,
    Project,
    Merchant,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Currency => write!(f, "currency"),
            ReferenceKind::CurrencyRate { .. } => write!(f, "currency_rate"),
            ReferenceKind::Country => write!(f, "country"),
            ReferenceKind::PaymentMethod => write!(f, "payment_method"),
            ReferenceKind::PaymentSystem => write!(f, "payment_system"),
            ReferenceKind::Commission => write!(f, "commission"),
            ReferenceKind::Vat => write!(f, "vat"),
            ReferenceKind::SystemFees => write!(f, "system_fees"),
            ReferenceKind::Project => write!(f, "project"),
            ReferenceKind::Merchant => write!(f, "merchant"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: ReferenceKind, key: String },

    /// Loading reference data from its source failed
    #[error("reference source error: {0}")]
    SourceError(String),
}

impl CacheError {
    pub fn not_found(kind: ReferenceKind, key: impl fmt::Display) -> Self {
        CacheError::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::SourceError(format!("invalid reference data: {}", err))
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::SourceError(err.to_string())
    }
}

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
