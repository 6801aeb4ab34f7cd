//! Payment billing engine.
//!
//! Turns merchant order requests into persisted, fully priced orders, drives the
//! card gateway's authentication/payment/refund protocol and reconciles the
//! gateway's asynchronous callbacks against stored state.
//!
//! - [`services`] holds the order pipeline, currency conversion, commission,
//!   payment and refund processing.
//! - [`payments`] holds the gateway session, handler registry and gateway clients.
//! - [`cache`] and [`database`] are the reference-data and storage layers.

pub mod api;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod money;
pub mod payments;
pub mod services;

pub use error::{BillingError, BillingResult, ResponseStatus};
