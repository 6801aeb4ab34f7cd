//! Saved bank cards collaborator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedCard {
    pub id: String,
    pub masked_pan: String,
    pub expire: String,
}

#[derive(Debug, thiserror::Error)]
#[error("saved card lookup failed: {0}")]
pub struct SavedCardLookupError(pub String);

#[async_trait]
pub trait SavedCardLookup: Send + Sync {
    async fn saved_cards(
        &self,
        project_id: &str,
        customer_token: &str,
    ) -> Result<Vec<SavedCard>, SavedCardLookupError>;
}

/// Used when no card vault is configured
pub struct NoSavedCards;

#[async_trait]
impl SavedCardLookup for NoSavedCards {
    async fn saved_cards(
        &self,
        _project_id: &str,
        _customer_token: &str,
    ) -> Result<Vec<SavedCard>, SavedCardLookupError> {
        Ok(Vec::new())
    }
}

/// In-memory card vault keyed by `(project id, customer token)`
#[derive(Default)]
pub struct StaticSavedCards {
    cards: HashMap<(String, String), Vec<SavedCard>>,
}

impl StaticSavedCards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cards(
        mut self,
        project_id: impl Into<String>,
        customer_token: impl Into<String>,
        cards: Vec<SavedCard>,
    ) -> Self {
        self.cards
            .insert((project_id.into(), customer_token.into()), cards);
        self
    }
}

#[async_trait]
impl SavedCardLookup for StaticSavedCards {
    async fn saved_cards(
        &self,
        project_id: &str,
        customer_token: &str,
    ) -> Result<Vec<SavedCard>, SavedCardLookupError> {
        Ok(self
            .cards
            .get(&(project_id.to_string(), customer_token.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
