use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::provider::PaymentSystemHandler;
use crate::payments::providers::{CardPayConfig, CardPayHandler};
use crate::payments::session::GatewaySession;
use crate::payments::types::HandlerName;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Payment-system handlers by name, shared by every request
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerName, Arc<dyn PaymentSystemHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler wired to the shared session
    pub fn with_defaults(
        cardpay: CardPayConfig,
        session: Arc<GatewaySession>,
    ) -> GatewayResult<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(CardPayHandler::new(cardpay, session)?));
        Ok(registry)
    }

    pub fn from_env(session: Arc<GatewaySession>) -> GatewayResult<Self> {
        Self::with_defaults(CardPayConfig::from_env(), session)
    }

    pub fn register(&mut self, handler: Arc<dyn PaymentSystemHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    pub fn get(&self, name: HandlerName) -> GatewayResult<Arc<dyn PaymentSystemHandler>> {
        self.handlers
            .get(&name)
            .cloned()
            .ok_or_else(|| GatewayError::HandlerNotFound {
                handler: name.to_string(),
            })
    }

    /// Lookup by the handler name stored on a payment system or given in a
    /// callback URL; unknown names fail with `HandlerNotFound`
    pub fn get_by_name(&self, name: &str) -> GatewayResult<Arc<dyn PaymentSystemHandler>> {
        self.get(HandlerName::from_str(name)?)
    }

    pub fn list_available_handlers(&self) -> Vec<HandlerName> {
        let mut names: Vec<HandlerName> = self.handlers.keys().copied().collect();
        names.sort_by_key(|n| n.as_str());
        names
    }
}
