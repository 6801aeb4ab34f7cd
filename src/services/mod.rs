//! Billing business logic and external collaborators

pub mod bank_card;
pub mod billing;
pub mod callback;
pub mod commission;
pub mod currency_converter;
pub mod geo;
pub mod order_processor;
pub mod payment;
pub mod payment_method;
pub mod refund;
pub mod saved_cards;

pub use bank_card::BankCardValidator;
pub use billing::BillingService;
pub use callback::CallbackOutcome;
pub use commission::{CommissionEngine, OrderCommissions};
pub use currency_converter::CurrencyConverter;
pub use geo::{GeoData, GeoLookup, GeoLookupError, HttpGeoLookup, StaticGeoLookup};
pub use order_processor::{OrderCreateRequest, RequestSource};
pub use payment::{PaymentFormMethod, PaymentFormRequest};
pub use refund::RefundCreateRequest;
pub use saved_cards::{NoSavedCards, SavedCard, SavedCardLookup, StaticSavedCards};
