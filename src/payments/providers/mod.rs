pub mod cardpay;

pub use cardpay::{CardPayConfig, CardPayHandler};
