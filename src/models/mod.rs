//! Domain documents persisted by the engine and reference records it reads.

pub mod order;
pub mod reference;
pub mod refund;

pub use order::{
    MerchantSnapshot, Order, OrderFee, OrderFeePaymentSystem, OrderFeePsp, OrderPaymentMethod,
    OrderPaymentSystem, OrderStatus, PayerData, ProjectOrder,
};
pub use reference::{
    Commission, Country, Currency, CurrencyRate, FixedPackage, Merchant, PaymentMethod,
    PaymentMethodType, PaymentSystem, Project, ProjectPaymentMethod, SystemFees,
    TerminalCredentials, Vat,
};
pub use refund::{Refund, RefundStatus};
