//! Payment-system integrations
//!
//! Handlers implement [`PaymentSystemHandler`] and are looked up by
//! [`HandlerName`] in a [`HandlerRegistry`]. Gateway bearer tokens live in a
//! single [`GatewaySession`] owned by the process and shared by all handlers.

pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod session;
pub mod types;
pub mod utils;

pub use error::{GatewayError, GatewayResult};
pub use factory::HandlerRegistry;
pub use provider::PaymentSystemHandler;
pub use session::{token_key, GatewaySession, TokenAuthority, TokenState};
pub use types::{
    BankCard, CallbackKind, GatewayCallback, GatewayStatus, GatewayToken, HandlerName,
    PaymentCreateRequest, PaymentCreateResponse, RefundCreateRequest, RefundCreateResponse,
};
